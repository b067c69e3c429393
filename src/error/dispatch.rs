use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Task '{task}': failed to build HTTP client: {source}")]
    BuildClientFailed {
        task: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Task '{task}': failed to build request template for '{url}': {source}")]
    BuildRequestFailed {
        task: String,
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Task '{task}': invalid header '{name}'.")]
    InvalidHeader { task: String, name: String },
    #[error("Task '{task}': schedule resolves end before start.")]
    ScheduleEndBeforeStart { task: String },
    #[error("Task '{task}': worker {worker} failed: {source}")]
    WorkerFailed {
        task: String,
        worker: usize,
        #[source]
        source: tokio::task::JoinError,
    },
    #[error("Task '{task}': rate limiter closed unexpectedly.")]
    RateLimiterClosed { task: String },
}
