//! Configuration loading and validation.
mod loader;
mod parse;
pub mod types;
mod validate;


pub use loader::{load_config, load_settings, parse_config_str};
pub use validate::{
    ClientSettings, ServerSettings, Settings, validate_config, validate_task,
    COMPATIBLE_VERSIONS, CONFIG_VERSION,
};
