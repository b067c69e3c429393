//! JSON bodies exchanged between agents and the coordinator.
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::types::TaskConfig;
use crate::domain::TaskOrder;
use crate::error::{AppResult, CoordinationError};
use crate::metrics::{LatencyHistogram, LatencySummary, ReportCounters, ReportSnapshot};

use super::coordinator::ClientState;
use super::utils::duration_to_ms;

pub const REGISTER_PATH: &str = "/register";
pub const REPORT_PATH: &str = "/report";
pub const HEARTBEAT_PATH: &str = "/heartbeat";
pub const STATUS_PATH: &str = "/status";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub hostname: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub version: String,
    pub client_id: String,
    /// Increments on every registration of the same client.
    pub cycle: u64,
    pub task_order: TaskOrder,
    /// Already in the order this client should activate them.
    pub tasks: Vec<TaskConfig>,
}

/// Cumulative state of one task run on one client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportPayload {
    pub client_id: String,
    pub task_name: String,
    pub cycle: u64,
    pub seq: u64,
    /// Unix milliseconds at snapshot time.
    pub timestamp: u64,
    #[serde(rename = "final", default)]
    pub final_report: bool,
    pub elapsed_ms: u64,
    #[serde(default)]
    pub in_flight: u64,
    #[serde(flatten)]
    pub counters: ReportCounters,
    pub latency: LatencyPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyPayload {
    pub count: u64,
    pub sum_us: u64,
    pub min_us: u64,
    pub max_us: u64,
    pub histogram_b64: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub client_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckResponse {
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub clients: Vec<ClientStatus>,
    pub tasks: Vec<TaskStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientStatus {
    pub client_id: String,
    pub hostname: String,
    pub state: ClientState,
    pub cycle: u64,
    /// RFC 3339 time of the first registration.
    pub registered_at: String,
    pub last_seen_ms_ago: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    pub name: String,
    #[serde(flatten)]
    pub counters: ReportCounters,
    pub contributors: usize,
    pub stale_contributors: usize,
    pub success_rate: f64,
    pub throughput: f64,
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p99_ms: f64,
}

impl AckResponse {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            status: "ok".to_owned(),
        }
    }
}

impl ReportPayload {
    /// # Errors
    ///
    /// Returns an error if the latency histogram cannot be encoded.
    pub fn from_snapshot(
        client_id: &str,
        task_name: &str,
        cycle: u64,
        timestamp: u64,
        snapshot: &ReportSnapshot,
    ) -> AppResult<Self> {
        Ok(Self {
            client_id: client_id.to_owned(),
            task_name: task_name.to_owned(),
            cycle,
            seq: snapshot.seq,
            timestamp,
            final_report: snapshot.final_report,
            elapsed_ms: duration_to_ms(snapshot.elapsed),
            in_flight: snapshot.in_flight,
            counters: snapshot.counters,
            latency: LatencyPayload {
                count: snapshot.latency.count,
                sum_us: snapshot.latency.sum_us,
                min_us: snapshot.latency.min_us,
                max_us: snapshot.latency.max_us,
                histogram_b64: snapshot.latency.histogram.encode_base64()?,
            },
        })
    }

    /// Decode back into a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError::InvalidHistogram`] when the embedded
    /// histogram does not decode or disagrees with `latency.count`.
    pub fn to_snapshot(&self) -> Result<ReportSnapshot, CoordinationError> {
        let histogram = LatencyHistogram::decode_base64(&self.latency.histogram_b64).map_err(
            |err| CoordinationError::InvalidHistogram {
                message: err.to_string(),
            },
        )?;
        if histogram.count() != self.latency.count {
            return Err(CoordinationError::InvalidHistogram {
                message: format!(
                    "histogram holds {} samples, report claims {}",
                    histogram.count(),
                    self.latency.count
                ),
            });
        }
        Ok(ReportSnapshot {
            seq: self.seq,
            elapsed: Duration::from_millis(self.elapsed_ms),
            in_flight: self.in_flight,
            final_report: self.final_report,
            counters: self.counters,
            latency: LatencySummary {
                count: self.latency.count,
                sum_us: self.latency.sum_us,
                min_us: self.latency.min_us,
                max_us: self.latency.max_us,
                histogram,
            },
        })
    }
}
