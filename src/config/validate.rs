use std::collections::{BTreeMap, HashSet};
use std::net::IpAddr;
use std::num::NonZeroUsize;
use std::time::Duration;

use reqwest::header::{HeaderName, HeaderValue};
use url::Url;

use crate::distributed::RetryPolicy;
use crate::domain::{
    HttpMethod, Limits, Policy, Prefabs, RequestBody, RequestOrder, RequestSpec, Schedule, Task,
    TaskOrder, Timeouts,
};
use crate::error::ConfigError;

use super::parse::{parse_schedule_value, positive_secs};
use super::types::{
    ClientConfig, ConfigFile, PolicyConfig, PrefabsConfig, RequestConfig, RequestData,
    ServerConfig, TaskConfig,
};

pub const CONFIG_VERSION: &str = "0.2";
pub const COMPATIBLE_VERSIONS: &[&str] = &["0.1", "0.2"];

const DEFAULT_CLIENT_TIMEOUT_SECS: u64 = 90;
const DEFAULT_STATUS_LOG_INTERVAL_SECS: u64 = 10;
const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 10;
const DEFAULT_RECONNECT_DELAY_SECS: u64 = 30;
const DEFAULT_RETRY_ATTEMPTS: u32 = 5;
const DEFAULT_RETRY_INITIAL_BACKOFF_MS: u64 = 500;
const DEFAULT_RETRY_MAX_BACKOFF_MS: u64 = 10_000;

/// Fully validated configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub version: String,
    pub tasks: Vec<Task>,
    /// Config form of `tasks`, same order. Shipped to agents as-is.
    pub task_configs: Vec<TaskConfig>,
    pub server: Option<ServerSettings>,
    pub client: Option<ClientSettings>,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub port: u16,
    pub task_order: TaskOrder,
    pub client_timeout: Duration,
    pub status_log_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub server_url: Url,
    pub client_id: Option<String>,
    /// `None` disables periodic reports; the final report is always sent.
    pub live_report_interval: Option<Duration>,
    pub heartbeat_interval: Duration,
    pub reconnect_delay: Duration,
    pub retry: RetryPolicy,
}

impl Settings {
    /// Standalone and server modes need something to run.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoTasks`] when the task list is empty.
    pub fn require_tasks(&self) -> Result<(), ConfigError> {
        if self.tasks.is_empty() {
            return Err(ConfigError::NoTasks);
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::MissingServerSection`] when absent.
    pub fn server(&self) -> Result<&ServerSettings, ConfigError> {
        self.server.as_ref().ok_or(ConfigError::MissingServerSection)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::MissingClientSection`] when absent.
    pub fn client(&self) -> Result<&ClientSettings, ConfigError> {
        self.client.as_ref().ok_or(ConfigError::MissingClientSection)
    }
}

/// Validates a parsed config file into typed settings.
///
/// # Errors
///
/// Returns the first validation failure found.
pub fn validate_config(file: ConfigFile) -> Result<Settings, ConfigError> {
    let version = validate_version(file.version.as_deref())?;

    let mut seen = HashSet::new();
    let mut tasks = Vec::with_capacity(file.tasks.len());
    for task in &file.tasks {
        let validated = validate_task(task)?;
        if !seen.insert(validated.name.clone()) {
            return Err(ConfigError::DuplicateTaskName {
                name: validated.name,
            });
        }
        tasks.push(validated);
    }

    let server = file.server.as_ref().map(validate_server).transpose()?;
    let client = file.client.as_ref().map(validate_client).transpose()?;

    Ok(Settings {
        version,
        tasks,
        task_configs: file.tasks,
        server,
        client,
    })
}

pub(crate) fn validate_version(version: Option<&str>) -> Result<String, ConfigError> {
    let version = version
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::MissingVersion)?;
    if !COMPATIBLE_VERSIONS.contains(&version) {
        return Err(ConfigError::IncompatibleVersion {
            version: version.to_owned(),
            expected: COMPATIBLE_VERSIONS.join(", "),
        });
    }
    Ok(version.to_owned())
}

/// Validates one task in config form.
///
/// # Errors
///
/// Returns a [`ConfigError`] naming the task and the offending field.
pub fn validate_task(config: &TaskConfig) -> Result<Task, ConfigError> {
    let name = config.name.trim();
    if name.is_empty() {
        return Err(ConfigError::EmptyTaskName);
    }

    let requests = config
        .requests
        .iter()
        .map(|request| validate_request(name, request))
        .collect::<Result<Vec<_>, _>>()?;
    let policy = validate_policy(name, &config.policy)?;
    let prefabs = validate_prefabs(name, &config.prefabs)?;

    let mut task = Task::new(name, requests).ok_or_else(|| ConfigError::EmptyRequests {
        task: name.to_owned(),
    })?;
    task.policy = policy;
    task.prefabs = prefabs;
    Ok(task)
}

fn validate_request(task: &str, config: &RequestConfig) -> Result<RequestSpec, ConfigError> {
    let raw_url = config.url.trim();
    if !(raw_url.starts_with("http://") || raw_url.starts_with("https://")) {
        return Err(ConfigError::InvalidUrlScheme {
            task: task.to_owned(),
            url: raw_url.to_owned(),
        });
    }
    let url = Url::parse(raw_url).map_err(|err| ConfigError::InvalidUrl {
        task: task.to_owned(),
        url: raw_url.to_owned(),
        source: err,
    })?;

    let method =
        HttpMethod::parse(&config.method).ok_or_else(|| ConfigError::UnsupportedMethod {
            task: task.to_owned(),
            method: config.method.clone(),
        })?;

    validate_headers(task, &config.headers)?;

    let body = match &config.data {
        None | Some(RequestData::Json(serde_json::Value::Null)) => None,
        Some(_) if !method.allows_body() => {
            return Err(ConfigError::BodyNotAllowed {
                task: task.to_owned(),
                method: method.as_str().to_owned(),
                url: raw_url.to_owned(),
            });
        }
        Some(RequestData::Text(text)) => Some(RequestBody::Text(text.clone())),
        Some(RequestData::Json(value)) => Some(RequestBody::Json(value.to_string())),
    };

    Ok(RequestSpec {
        url,
        method,
        headers: config.headers.clone(),
        body,
    })
}

fn validate_headers(task: &str, headers: &BTreeMap<String, String>) -> Result<(), ConfigError> {
    for (name, value) in headers {
        let valid = HeaderName::from_bytes(name.as_bytes()).is_ok()
            && HeaderValue::from_str(value).is_ok();
        if !valid {
            return Err(ConfigError::InvalidHeader {
                task: task.to_owned(),
                name: name.clone(),
            });
        }
    }
    Ok(())
}

fn validate_policy(task: &str, config: &PolicyConfig) -> Result<Policy, ConfigError> {
    let order = config
        .order
        .parse::<RequestOrder>()
        .map_err(|value| ConfigError::UnsupportedOrder {
            task: task.to_owned(),
            value,
        })?;

    let schedule = Schedule {
        start: config
            .schedule
            .start
            .as_ref()
            .map(|value| parse_schedule_value(task, "start", value))
            .transpose()?,
        end: config
            .schedule
            .end
            .as_ref()
            .map(|value| parse_schedule_value(task, "end", value))
            .transpose()?,
    };
    if !schedule.is_statically_ordered() {
        return Err(ConfigError::ScheduleStartAfterEnd {
            task: task.to_owned(),
        });
    }

    let rps = match config.limits.rps {
        None => None,
        Some(rps) if rps.is_finite() && rps > 0.0 => Some(rps),
        Some(_) => {
            return Err(ConfigError::InvalidRps {
                task: task.to_owned(),
            });
        }
    };
    let coroutines = usize::try_from(config.limits.coroutines)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| ConfigError::InvalidCoroutines {
            task: task.to_owned(),
        })?;

    let timeout = |field: &'static str, value: f64| {
        positive_secs(value).ok_or_else(|| ConfigError::InvalidTimeout {
            task: task.to_owned(),
            field,
        })
    };
    let timeouts = Timeouts {
        connect: timeout("connect", config.timeouts.connect)?,
        read: timeout("read", config.timeouts.read)?,
        write: timeout("write", config.timeouts.write)?,
    };

    Ok(Policy {
        reuse_connections: config.reuse_connections,
        order,
        schedule,
        limits: Limits { rps, coroutines },
        timeouts,
    })
}

fn validate_prefabs(task: &str, config: &PrefabsConfig) -> Result<Prefabs, ConfigError> {
    let mut override_hosts = BTreeMap::new();
    for (host, ip) in &config.override_hosts {
        let parsed = ip
            .trim()
            .parse::<IpAddr>()
            .map_err(|_err| ConfigError::InvalidOverrideIp {
                task: task.to_owned(),
                host: host.clone(),
                ip: ip.clone(),
            })?;
        override_hosts.insert(host.trim().to_ascii_lowercase(), parsed);
    }
    validate_headers(task, &config.default_headers)?;
    Ok(Prefabs {
        override_hosts,
        default_headers: config.default_headers.clone(),
    })
}

fn validate_server(config: &ServerConfig) -> Result<ServerSettings, ConfigError> {
    let port = u16::try_from(config.port)
        .ok()
        .filter(|port| *port != 0)
        .ok_or(ConfigError::InvalidPort { port: config.port })?;
    let task_order = config
        .distributing
        .task_order
        .parse::<TaskOrder>()
        .map_err(|value| ConfigError::UnsupportedTaskOrder { value })?;
    Ok(ServerSettings {
        port,
        task_order,
        client_timeout: positive_secs_field(
            "server.client_timeout",
            config.client_timeout,
            DEFAULT_CLIENT_TIMEOUT_SECS,
        )?,
        status_log_interval: positive_secs_field(
            "server.status_log_interval",
            config.status_log_interval,
            DEFAULT_STATUS_LOG_INTERVAL_SECS,
        )?,
    })
}

fn validate_client(config: &ClientConfig) -> Result<ClientSettings, ConfigError> {
    let raw_url = config.server_url.trim();
    if !(raw_url.starts_with("http://") || raw_url.starts_with("https://")) {
        return Err(ConfigError::InvalidServerUrl {
            url: raw_url.to_owned(),
        });
    }
    let server_url = Url::parse(raw_url).map_err(|_err| ConfigError::InvalidServerUrl {
        url: raw_url.to_owned(),
    })?;

    let interval = config.report.live_report_interval;
    let live_report_interval = match u64::try_from(interval) {
        Ok(0) => None,
        Ok(secs) => Some(Duration::from_secs(secs)),
        Err(_) => return Err(ConfigError::NegativeReportInterval { value: interval }),
    };

    let max_attempts = config.retry.max_attempts.unwrap_or(DEFAULT_RETRY_ATTEMPTS);
    if max_attempts == 0 {
        return Err(ConfigError::FieldMustBePositive {
            field: "client.retry.max_attempts",
        });
    }
    let initial_backoff = Duration::from_millis(
        config
            .retry
            .initial_backoff_ms
            .unwrap_or(DEFAULT_RETRY_INITIAL_BACKOFF_MS),
    );
    let max_backoff = Duration::from_millis(
        config
            .retry
            .max_backoff_ms
            .unwrap_or(DEFAULT_RETRY_MAX_BACKOFF_MS),
    );

    Ok(ClientSettings {
        server_url,
        client_id: config
            .client_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_owned),
        live_report_interval,
        heartbeat_interval: positive_secs_field(
            "client.heartbeat_interval",
            config.heartbeat_interval,
            DEFAULT_HEARTBEAT_INTERVAL_SECS,
        )?,
        reconnect_delay: positive_secs_field(
            "client.reconnect_delay",
            config.reconnect_delay,
            DEFAULT_RECONNECT_DELAY_SECS,
        )?,
        retry: RetryPolicy::new(max_attempts, initial_backoff, max_backoff),
    })
}

fn positive_secs_field(
    field: &'static str,
    value: Option<u64>,
    default: u64,
) -> Result<Duration, ConfigError> {
    match value.unwrap_or(default) {
        0 => Err(ConfigError::FieldMustBePositive { field }),
        secs => Ok(Duration::from_secs(secs)),
    }
}
