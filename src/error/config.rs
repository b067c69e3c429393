use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config '{path}': {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML config '{path}': {source}")]
    ParseToml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to parse JSON config '{path}': {source}")]
    ParseJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Unsupported config extension '{ext}'. Use .json, .jsonc or .toml.")]
    UnsupportedExtension { ext: String },
    #[error("Config version is required.")]
    MissingVersion,
    #[error("Incompatible config version '{version}', expected one of {expected}.")]
    IncompatibleVersion { version: String, expected: String },
    #[error("Config must define at least one task.")]
    NoTasks,
    #[error("Task name must not be empty.")]
    EmptyTaskName,
    #[error("Duplicate task name '{name}'.")]
    DuplicateTaskName { name: String },
    #[error("Task '{task}': requests field is required and cannot be empty.")]
    EmptyRequests { task: String },
    #[error("Task '{task}': URL '{url}' must start with http:// or https://.")]
    InvalidUrlScheme { task: String, url: String },
    #[error("Task '{task}': invalid URL '{url}': {source}")]
    InvalidUrl {
        task: String,
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Task '{task}': unsupported HTTP method '{method}'.")]
    UnsupportedMethod { task: String, method: String },
    #[error("Task '{task}': request body is not allowed for {method} '{url}'.")]
    BodyNotAllowed {
        task: String,
        method: String,
        url: String,
    },
    #[error("Task '{task}': invalid header '{name}'.")]
    InvalidHeader { task: String, name: String },
    #[error("Task '{task}': invalid order '{value}', only 'random' is supported.")]
    UnsupportedOrder { task: String, value: String },
    #[error("Invalid task_order '{value}', only 'random' is supported.")]
    UnsupportedTaskOrder { value: String },
    #[error("Task '{task}': unable to parse schedule {field} '{value}'.")]
    InvalidScheduleInstant {
        task: String,
        field: &'static str,
        value: String,
    },
    #[error("Task '{task}': schedule {field} offset must be a finite, non-negative number of seconds.")]
    InvalidScheduleOffset { task: String, field: &'static str },
    #[error("Task '{task}': schedule start must not be after schedule end.")]
    ScheduleStartAfterEnd { task: String },
    #[error("Task '{task}': limits.rps must be a positive number.")]
    InvalidRps { task: String },
    #[error("Task '{task}': limits.coroutines must be >= 1.")]
    InvalidCoroutines { task: String },
    #[error("Task '{task}': timeouts.{field} must be a positive number of seconds.")]
    InvalidTimeout { task: String, field: &'static str },
    #[error("Task '{task}': override_hosts entry '{host}' has invalid IP '{ip}'.")]
    InvalidOverrideIp {
        task: String,
        host: String,
        ip: String,
    },
    #[error("Port must be between 1 and 65535, got {port}.")]
    InvalidPort { port: i64 },
    #[error("Server URL '{url}' must start with http:// or https://.")]
    InvalidServerUrl { url: String },
    #[error("Report interval must be non-negative, got {value}.")]
    NegativeReportInterval { value: i64 },
    #[error("Config '{field}' must be >= 1.")]
    FieldMustBePositive { field: &'static str },
    #[error("Server configuration is required to run server mode.")]
    MissingServerSection,
    #[error("Client configuration is required for distributed mode.")]
    MissingClientSection,
    #[cfg(test)]
    #[error("Test expectation failed: {message}")]
    TestExpectation { message: &'static str },
}
