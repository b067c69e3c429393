use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Strategy for picking the next request of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestOrder {
    /// Uniform choice with replacement.
    #[default]
    Random,
}

/// Strategy for sequencing the tasks handed to one client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskOrder {
    /// Independent shuffle per client.
    #[default]
    Random,
}

impl RequestOrder {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            RequestOrder::Random => "random",
        }
    }
}

impl TaskOrder {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TaskOrder::Random => "random",
        }
    }
}

impl FromStr for RequestOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "random" => Ok(RequestOrder::Random),
            other => Err(other.to_owned()),
        }
    }
}

impl FromStr for TaskOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "random" => Ok(TaskOrder::Random),
            other => Err(other.to_owned()),
        }
    }
}

impl fmt::Display for RequestOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for TaskOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
