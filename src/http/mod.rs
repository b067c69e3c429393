//! Request execution engine: rate limiting, schedule gating and the worker
//! pool that drives one task.
mod client;
mod dispatcher;
mod execution;
mod rate;
mod request;
mod schedule;
mod sequence;

#[cfg(test)]
mod tests;

pub use client::{DEFAULT_USER_AGENT, build_client};
pub use dispatcher::Dispatcher;
pub use execution::{RequestOutcome, execute_request};
pub use rate::RateLimiter;
pub use request::{PreparedRequest, prepare_requests};
pub use schedule::ScheduleGate;
pub use sequence::ActivationTurn;
