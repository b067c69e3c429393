use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinationError {
    #[error("Bind error on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error during {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("Request to coordinator {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Coordinator {url} responded with status {status}: {message}")]
    Rejected {
        url: String,
        status: u16,
        message: String,
    },
    #[error("Failed to build coordinator client: {source}")]
    BuildClientFailed {
        #[source]
        source: reqwest::Error,
    },
    #[error("Incompatible remote config version '{version}', expected one of {expected}.")]
    IncompatibleVersion { version: String, expected: String },
    #[error("No task received from coordinator.")]
    NoTasksAssigned,
    #[error("Coordinator sent an invalid task: {message}")]
    InvalidAssignment { message: String },
    #[error("Unknown task '{task}' in report from {client_id}.")]
    UnknownTask { client_id: String, task: String },
    #[error("Unknown client '{client_id}'.")]
    UnknownClient { client_id: String },
    #[error("Gave up on {operation} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        last_error: String,
    },
    #[error("Serialization error during {context}: {source}")]
    Serialize {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("Deserialization error during {context}: {source}")]
    Deserialize {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid latency histogram in report: {message}")]
    InvalidHistogram { message: String },
    #[error("Cannot fold report for task '{task}': {source}")]
    Merge {
        task: String,
        #[source]
        source: super::MetricsError,
    },
    #[cfg(test)]
    #[error("Test expectation failed: {message}")]
    TestExpectation { message: &'static str },
}

impl CoordinationError {
    /// Network failures and server-side errors are worth another attempt;
    /// rejections of the request itself are not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, CoordinationError::Request { .. })
            || matches!(self, CoordinationError::Rejected { status, .. } if *status >= 500)
    }
}
