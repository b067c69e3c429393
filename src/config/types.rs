use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Raw config file as written by the operator. Loosely typed; see
/// [`super::validate_config`] for the typed form.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    pub version: Option<String>,
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
    pub server: Option<ServerConfig>,
    pub client: Option<ClientConfig>,
}

/// One task in config form. This is also the shape the coordinator ships to
/// agents, so it round-trips through serde.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub name: String,
    #[serde(default)]
    pub requests: Vec<RequestConfig>,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub prefabs: PrefabsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestConfig {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<RequestData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestData {
    Text(String),
    Json(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_true")]
    pub reuse_connections: bool,
    #[serde(default = "default_order")]
    pub order: String,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<ScheduleValueConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<ScheduleValueConfig>,
}

/// Either seconds relative to task activation or an absolute timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScheduleValueConfig {
    Offset(f64),
    Instant(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rps: Option<f64>,
    #[serde(default = "default_coroutines")]
    pub coroutines: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect: f64,
    #[serde(default = "default_read_timeout")]
    pub read: f64,
    #[serde(default = "default_write_timeout")]
    pub write: f64,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefabsConfig {
    #[serde(default)]
    pub override_hosts: BTreeMap<String, String>,
    #[serde(default)]
    pub default_headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: i64,
    #[serde(default)]
    pub distributing: DistributingConfig,
    /// Seconds without contact before a client is marked offline.
    pub client_timeout: Option<u64>,
    /// Seconds between aggregate status log lines.
    pub status_log_interval: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributingConfig {
    #[serde(default = "default_order")]
    pub task_order: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub server_url: String,
    pub client_id: Option<String>,
    #[serde(default)]
    pub report: ReportConfig,
    pub heartbeat_interval: Option<u64>,
    pub reconnect_delay: Option<u64>,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_report_interval")]
    pub live_report_interval: i64,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
}

fn default_method() -> String {
    "GET".to_owned()
}

const fn default_true() -> bool {
    true
}

fn default_order() -> String {
    "random".to_owned()
}

const fn default_coroutines() -> i64 {
    64
}

const fn default_connect_timeout() -> f64 {
    5.0
}

const fn default_read_timeout() -> f64 {
    10.0
}

const fn default_write_timeout() -> f64 {
    10.0
}

const fn default_report_interval() -> i64 {
    30
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            reuse_connections: true,
            order: default_order(),
            schedule: ScheduleConfig::default(),
            limits: LimitsConfig::default(),
            timeouts: TimeoutsConfig::default(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            rps: None,
            coroutines: default_coroutines(),
        }
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            connect: default_connect_timeout(),
            read: default_read_timeout(),
            write: default_write_timeout(),
        }
    }
}

impl Default for DistributingConfig {
    fn default() -> Self {
        Self {
            task_order: default_order(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            live_report_interval: default_report_interval(),
        }
    }
}
