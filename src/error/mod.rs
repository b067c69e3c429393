mod app;
mod config;
mod coordination;
mod dispatch;
mod metrics;

pub use app::{AppError, AppResult};
pub use config::ConfigError;
pub use coordination::CoordinationError;
pub use dispatch::DispatchError;
pub use metrics::MetricsError;
