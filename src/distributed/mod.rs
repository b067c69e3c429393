//! Distributed mode: a coordinator hands tasks to agents and merges the
//! cumulative reports they push back.
mod agent;
mod aggregator;
mod coordinator;
pub mod protocol;
mod utils;


pub use agent::{
    Assignment, ClientAgent, CoordinatorLink, CycleOutcome, HttpCoordinatorLink, RetryPolicy,
};
pub use aggregator::{AggregateParts, ReportAggregator, TaskAggregate};
pub use coordinator::{
    ClientRegistration, ClientRegistry, ClientState, Coordinator, assign_tasks, bind_listener,
    serve,
};
