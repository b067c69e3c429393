use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::MetricsError;

use super::LatencyHistogram;

/// How one request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeClass {
    Success,
    Http4xx,
    Http5xx,
    /// Any other non-2xx status (1xx, 3xx, nonstandard codes).
    HttpOther,
    Timeout,
    ConnectTimeout,
    /// Connection refused, DNS failure, TLS error, reset.
    Transport,
}

impl OutcomeClass {
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            200..=299 => OutcomeClass::Success,
            400..=499 => OutcomeClass::Http4xx,
            500..=599 => OutcomeClass::Http5xx,
            _ => OutcomeClass::HttpOther,
        }
    }

    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, OutcomeClass::Success)
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            OutcomeClass::Success => "success",
            OutcomeClass::Http4xx => "http_4xx",
            OutcomeClass::Http5xx => "http_5xx",
            OutcomeClass::HttpOther => "http_other",
            OutcomeClass::Timeout => "timeout",
            OutcomeClass::ConnectTimeout => "connect_timeout",
            OutcomeClass::Transport => "transport",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureCounts {
    #[serde(default)]
    pub http_4xx: u64,
    #[serde(default)]
    pub http_5xx: u64,
    #[serde(default)]
    pub http_other: u64,
    #[serde(default)]
    pub timeout: u64,
    #[serde(default)]
    pub connect_timeout: u64,
    #[serde(default)]
    pub transport: u64,
}

impl FailureCounts {
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.http_4xx
            .saturating_add(self.http_5xx)
            .saturating_add(self.http_other)
            .saturating_add(self.timeout)
            .saturating_add(self.connect_timeout)
            .saturating_add(self.transport)
    }

    /// Count one failure. Successes are ignored.
    pub fn record(&mut self, class: OutcomeClass) {
        let slot = match class {
            OutcomeClass::Success => return,
            OutcomeClass::Http4xx => &mut self.http_4xx,
            OutcomeClass::Http5xx => &mut self.http_5xx,
            OutcomeClass::HttpOther => &mut self.http_other,
            OutcomeClass::Timeout => &mut self.timeout,
            OutcomeClass::ConnectTimeout => &mut self.connect_timeout,
            OutcomeClass::Transport => &mut self.transport,
        };
        *slot = slot.saturating_add(1);
    }

    pub fn merge(&mut self, other: &FailureCounts) {
        self.http_4xx = self.http_4xx.saturating_add(other.http_4xx);
        self.http_5xx = self.http_5xx.saturating_add(other.http_5xx);
        self.http_other = self.http_other.saturating_add(other.http_other);
        self.timeout = self.timeout.saturating_add(other.timeout);
        self.connect_timeout = self.connect_timeout.saturating_add(other.connect_timeout);
        self.transport = self.transport.saturating_add(other.transport);
    }

    /// Labelled non-zero buckets, in display order.
    #[must_use]
    pub fn breakdown(&self) -> Vec<(&'static str, u64)> {
        [
            (OutcomeClass::Http4xx, self.http_4xx),
            (OutcomeClass::Http5xx, self.http_5xx),
            (OutcomeClass::HttpOther, self.http_other),
            (OutcomeClass::Timeout, self.timeout),
            (OutcomeClass::ConnectTimeout, self.connect_timeout),
            (OutcomeClass::Transport, self.transport),
        ]
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .map(|(class, count)| (class.label(), count))
        .collect()
    }
}

/// Monotonic counters for one task run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportCounters {
    pub sent: u64,
    pub succeeded: u64,
    pub failed: FailureCounts,
    #[serde(default)]
    pub bytes_received: u64,
}

impl ReportCounters {
    #[must_use]
    pub const fn failed_total(&self) -> u64 {
        self.failed.total()
    }

    #[must_use]
    pub const fn completed(&self) -> u64 {
        self.succeeded.saturating_add(self.failed.total())
    }

    pub fn merge(&mut self, other: &ReportCounters) {
        self.sent = self.sent.saturating_add(other.sent);
        self.succeeded = self.succeeded.saturating_add(other.succeeded);
        self.failed.merge(&other.failed);
        self.bytes_received = self.bytes_received.saturating_add(other.bytes_received);
    }
}

/// Count, sum, extremes and full distribution of request latency.
#[derive(Debug, Clone, PartialEq)]
pub struct LatencySummary {
    pub count: u64,
    pub sum_us: u64,
    pub min_us: u64,
    pub max_us: u64,
    pub histogram: LatencyHistogram,
}

impl LatencySummary {
    /// # Errors
    ///
    /// Returns an error if the histogram cannot be created.
    pub fn new() -> Result<Self, MetricsError> {
        Ok(Self {
            count: 0,
            sum_us: 0,
            min_us: 0,
            max_us: 0,
            histogram: LatencyHistogram::new()?,
        })
    }

    /// # Errors
    ///
    /// Returns an error if the histogram rejects the value.
    pub fn record(&mut self, latency: Duration) -> Result<(), MetricsError> {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.histogram.record(micros)?;
        self.min_us = if self.count == 0 {
            micros
        } else {
            self.min_us.min(micros)
        };
        self.max_us = self.max_us.max(micros);
        self.sum_us = self.sum_us.saturating_add(micros);
        self.count = self.count.saturating_add(1);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the histograms cannot be combined.
    pub fn merge(&mut self, other: &LatencySummary) -> Result<(), MetricsError> {
        if other.count == 0 {
            return Ok(());
        }
        self.histogram.merge(&other.histogram)?;
        self.min_us = if self.count == 0 {
            other.min_us
        } else {
            self.min_us.min(other.min_us)
        };
        self.max_us = self.max_us.max(other.max_us);
        self.sum_us = self.sum_us.saturating_add(other.sum_us);
        self.count = self.count.saturating_add(other.count);
        Ok(())
    }

    #[must_use]
    pub fn mean_ms(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        micros_to_ms(self.sum_us) / self.count as f64
    }

    /// (p50, p90, p99) in milliseconds.
    #[must_use]
    pub fn percentiles_ms(&self) -> (f64, f64, f64) {
        let (p50, p90, p99) = self.histogram.percentiles();
        (micros_to_ms(p50), micros_to_ms(p90), micros_to_ms(p99))
    }

    #[must_use]
    pub fn min_ms(&self) -> f64 {
        micros_to_ms(self.min_us)
    }

    #[must_use]
    pub fn max_ms(&self) -> f64 {
        micros_to_ms(self.max_us)
    }
}

/// Point-in-time copy of a dispatcher's accumulator.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSnapshot {
    /// Increases by one per snapshot of the same run.
    pub seq: u64,
    pub elapsed: Duration,
    pub in_flight: u64,
    pub final_report: bool,
    pub counters: ReportCounters,
    pub latency: LatencySummary,
}

/// Merged view of any number of reports for one task.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportTotals {
    pub counters: ReportCounters,
    pub latency: LatencySummary,
    /// Longest elapsed time among the merged reports.
    pub elapsed: Duration,
}

impl ReportTotals {
    /// # Errors
    ///
    /// Returns an error if the histogram cannot be created.
    pub fn new() -> Result<Self, MetricsError> {
        Ok(Self {
            counters: ReportCounters::default(),
            latency: LatencySummary::new()?,
            elapsed: Duration::ZERO,
        })
    }

    /// Sum counters, combine latency, keep the longest elapsed. Commutative
    /// and associative.
    ///
    /// # Errors
    ///
    /// Returns an error if the histograms cannot be combined.
    pub fn merge(
        &mut self,
        counters: &ReportCounters,
        latency: &LatencySummary,
        elapsed: Duration,
    ) -> Result<(), MetricsError> {
        self.counters.merge(counters);
        self.latency.merge(latency)?;
        self.elapsed = self.elapsed.max(elapsed);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the histograms cannot be combined.
    pub fn merge_snapshot(&mut self, snapshot: &ReportSnapshot) -> Result<(), MetricsError> {
        self.merge(&snapshot.counters, &snapshot.latency, snapshot.elapsed)
    }

    #[must_use]
    pub fn success_rate(&self) -> f64 {
        let completed = self.counters.completed();
        if completed == 0 {
            return 0.0;
        }
        self.counters.succeeded as f64 * 100.0 / completed as f64
    }

    /// Completed requests per second over `elapsed`.
    #[must_use]
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.counters.completed() as f64 / secs
    }
}

fn micros_to_ms(micros: u64) -> f64 {
    micros as f64 / 1_000.0
}
