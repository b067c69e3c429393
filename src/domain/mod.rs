//! Typed, validated task model consumed by the execution engine.
mod order;
mod schedule;
mod task;

#[cfg(test)]
mod tests;

pub use order::{RequestOrder, TaskOrder};
pub use schedule::{Schedule, ScheduleValue};
pub use task::{
    HttpMethod, Limits, Policy, Prefabs, RequestBody, RequestSpec, Task, Timeouts,
    DEFAULT_COROUTINES, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT, DEFAULT_WRITE_TIMEOUT,
};
