//! Outcome accounting: live accumulator, snapshots, merged totals and the
//! latency histogram they share.
mod accumulator;
mod histogram;
mod types;


pub use accumulator::{InflightGuard, ReportAccumulator};
pub use histogram::LatencyHistogram;
pub use types::{
    FailureCounts, LatencySummary, OutcomeClass, ReportCounters, ReportSnapshot, ReportTotals,
};
