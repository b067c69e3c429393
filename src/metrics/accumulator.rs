use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::MetricsError;

use super::types::{LatencySummary, OutcomeClass, ReportCounters, ReportSnapshot};

/// Live outcome counters for one dispatcher run.
///
/// Starting a request only touches atomics. Completions and snapshots share
/// one short critical section, so a snapshot always satisfies
/// `sent == succeeded + failed + in_flight`.
#[derive(Debug)]
pub struct ReportAccumulator {
    sent: AtomicU64,
    in_flight: AtomicU64,
    peak_in_flight: AtomicU64,
    seq: AtomicU64,
    completed: Mutex<Completed>,
}

#[derive(Debug)]
struct Completed {
    started_at: Instant,
    counters: ReportCounters,
    latency: LatencySummary,
}

/// Marks one request as in flight until dropped.
#[derive(Debug)]
pub struct InflightGuard<'acc> {
    counter: &'acc AtomicU64,
}

impl ReportAccumulator {
    /// # Errors
    ///
    /// Returns an error if the latency histogram cannot be created.
    pub fn new() -> Result<Self, MetricsError> {
        Ok(Self {
            sent: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
            peak_in_flight: AtomicU64::new(0),
            seq: AtomicU64::new(0),
            completed: Mutex::new(Completed {
                started_at: Instant::now(),
                counters: ReportCounters::default(),
                latency: LatencySummary::new()?,
            }),
        })
    }

    /// Count a request as sent and hold it in flight until the guard drops.
    pub fn begin(&self) -> InflightGuard<'_> {
        self.sent.fetch_add(1, Ordering::Relaxed);
        let now = self.in_flight.fetch_add(1, Ordering::Relaxed).saturating_add(1);
        self.peak_in_flight.fetch_max(now, Ordering::Relaxed);
        InflightGuard {
            counter: &self.in_flight,
        }
    }

    /// Record the outcome of a request previously started with [`begin`].
    ///
    /// [`begin`]: ReportAccumulator::begin
    pub fn record(&self, class: OutcomeClass, latency: Duration, bytes: u64) {
        let mut completed = self.lock();
        if class.is_success() {
            completed.counters.succeeded = completed.counters.succeeded.saturating_add(1);
        } else {
            completed.counters.failed.record(class);
        }
        completed.counters.bytes_received =
            completed.counters.bytes_received.saturating_add(bytes);
        if let Err(err) = completed.latency.record(latency) {
            tracing::debug!("Dropping latency sample: {}", err);
        }
    }

    /// Consistent copy of everything recorded so far. Each call gets the
    /// next sequence number.
    pub fn snapshot(&self, final_report: bool) -> ReportSnapshot {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed).saturating_add(1);
        let (mut counters, latency, elapsed) = {
            let completed = self.lock();
            (
                completed.counters,
                completed.latency.clone(),
                completed.started_at.elapsed(),
            )
        };
        let sent = self.sent.load(Ordering::Relaxed);
        counters.sent = sent.max(counters.completed());
        ReportSnapshot {
            seq,
            elapsed,
            in_flight: counters.sent.saturating_sub(counters.completed()),
            final_report,
            counters,
            latency,
        }
    }

    /// Measure elapsed time from now on. Called when the task activates.
    pub fn restart_clock(&self) {
        self.lock().started_at = Instant::now();
    }

    #[must_use]
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Highest number of simultaneously in-flight requests seen.
    #[must_use]
    pub fn peak_in_flight(&self) -> u64 {
        self.peak_in_flight.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, Completed> {
        self.completed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        loop {
            let current = self.counter.load(Ordering::Relaxed);
            let Some(next) = current.checked_sub(1) else {
                break;
            };
            if self
                .counter
                .compare_exchange(current, next, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
    }
}
