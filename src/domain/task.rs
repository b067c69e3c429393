use std::collections::BTreeMap;
use std::net::IpAddr;
use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use super::{RequestOrder, Schedule};

pub const DEFAULT_COROUTINES: usize = 64;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    /// Case-insensitive parse of a method name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "PATCH" => Some(HttpMethod::Patch),
            "DELETE" => Some(HttpMethod::Delete),
            "HEAD" => Some(HttpMethod::Head),
            "OPTIONS" => Some(HttpMethod::Options),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }

    /// Only POST, PUT and PATCH carry a body.
    #[must_use]
    pub const fn allows_body(self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }

    #[must_use]
    pub fn to_reqwest(self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Options => reqwest::Method::OPTIONS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Text(String),
    /// Serialized JSON; sent with `Content-Type: application/json` unless a
    /// header already sets one.
    Json(String),
}

impl RequestBody {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            RequestBody::Text(text) | RequestBody::Json(text) => text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSpec {
    pub url: Url,
    pub method: HttpMethod,
    pub headers: BTreeMap<String, String>,
    pub body: Option<RequestBody>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    pub rps: Option<f64>,
    pub coroutines: NonZeroUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub read: Duration,
    pub write: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    pub reuse_connections: bool,
    pub order: RequestOrder,
    pub schedule: Schedule,
    pub limits: Limits,
    pub timeouts: Timeouts,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prefabs {
    pub override_hosts: BTreeMap<String, IpAddr>,
    pub default_headers: BTreeMap<String, String>,
}

/// A named unit of load. Immutable once validated; `requests` is never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub name: String,
    pub requests: Vec<RequestSpec>,
    pub policy: Policy,
    pub prefabs: Prefabs,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            rps: None,
            coroutines: NonZeroUsize::new(DEFAULT_COROUTINES).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: DEFAULT_CONNECT_TIMEOUT,
            read: DEFAULT_READ_TIMEOUT,
            write: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            reuse_connections: true,
            order: RequestOrder::Random,
            schedule: Schedule::default(),
            limits: Limits::default(),
            timeouts: Timeouts::default(),
        }
    }
}

impl Timeouts {
    /// Upper bound for one request end to end.
    #[must_use]
    pub fn total(&self) -> Duration {
        self.connect
            .saturating_add(self.write)
            .saturating_add(self.read)
    }
}

impl Task {
    /// Build a task with default policy and prefabs. Returns `None` when
    /// `requests` is empty.
    #[must_use]
    pub fn new(name: impl Into<String>, requests: Vec<RequestSpec>) -> Option<Self> {
        if requests.is_empty() {
            return None;
        }
        Some(Self {
            name: name.into(),
            requests,
            policy: Policy::default(),
            prefabs: Prefabs::default(),
        })
    }

    #[must_use]
    pub const fn coroutines(&self) -> usize {
        self.policy.limits.coroutines.get()
    }
}

impl RequestSpec {
    #[must_use]
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: HttpMethod::Get,
            headers: BTreeMap::new(),
            body: None,
        }
    }
}
