use std::path::Path;

use crate::error::{AppError, AppResult, ConfigError};

use super::parse::strip_line_comments;
use super::types::ConfigFile;
use super::validate::{Settings, validate_config};

/// Reads and parses a config file. `.json` and `.jsonc` accept `//` line
/// comments; `.toml` is parsed as TOML. A missing extension is read as JSON.
///
/// # Errors
///
/// Returns an error when the file cannot be read or parsed.
pub fn load_config(path: &Path) -> AppResult<ConfigFile> {
    let content = std::fs::read_to_string(path).map_err(|err| {
        AppError::config(ConfigError::ReadConfig {
            path: path.to_path_buf(),
            source: err,
        })
    })?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => toml::from_str(&content).map_err(|err| {
            AppError::config(ConfigError::ParseToml {
                path: path.to_path_buf(),
                source: err,
            })
        }),
        Some("json" | "jsonc") | None => parse_config_str(&content).map_err(|err| {
            AppError::config(ConfigError::ParseJson {
                path: path.to_path_buf(),
                source: err,
            })
        }),
        Some(ext) => Err(AppError::config(ConfigError::UnsupportedExtension {
            ext: ext.to_owned(),
        })),
    }
}

/// Parses JSON-with-comments config text.
///
/// # Errors
///
/// Returns the JSON error when the text is not a valid config document.
pub fn parse_config_str(content: &str) -> Result<ConfigFile, serde_json::Error> {
    serde_json::from_str(&strip_line_comments(content))
}

/// Loads and validates in one step.
///
/// # Errors
///
/// Returns an error when loading fails or the config is invalid.
pub fn load_settings(path: &Path) -> AppResult<Settings> {
    let file = load_config(path)?;
    Ok(validate_config(file)?)
}
