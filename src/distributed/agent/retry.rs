use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::error::CoordinationError;

/// Exponential backoff with jitter and a bounded number of attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    /// `max_attempts` below one is raised to one.
    #[must_use]
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff: max_backoff.max(initial_backoff),
        }
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Upper bound of the delay after failed attempt number `attempt`
    /// (1-based): doubles from the initial backoff up to the cap.
    #[must_use]
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_backoff
            .saturating_mul(1_u32 << exponent)
            .min(self.max_backoff)
    }

    /// Delay after failed attempt number `attempt`, drawn uniformly from the
    /// upper half of [`backoff_ceiling`](Self::backoff_ceiling).
    pub fn backoff<R>(&self, attempt: u32, rng: &mut R) -> Duration
    where
        R: Rng + ?Sized,
    {
        let ceiling = self.backoff_ceiling(attempt);
        let floor = ceiling.checked_div(2).unwrap_or_default();
        floor.saturating_add(rng.gen_range(Duration::ZERO..=floor))
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error,
    /// or runs out of attempts.
    ///
    /// # Errors
    ///
    /// Returns the non-retryable error as is, or
    /// [`CoordinationError::RetriesExhausted`] carrying the last failure.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &'static str,
        mut attempt_fn: F,
    ) -> Result<T, CoordinationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CoordinationError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt = attempt.saturating_add(1);
            let err = match attempt_fn().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => err,
            };
            if attempt >= self.max_attempts {
                return Err(CoordinationError::RetriesExhausted {
                    operation,
                    attempts: attempt,
                    last_error: err.to_string(),
                });
            }
            let delay = self.backoff(attempt, &mut rand::thread_rng());
            warn!(
                "{} failed (attempt {}/{}): {}; retrying in {}ms",
                operation,
                attempt,
                self.max_attempts,
                err,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }
    }
}
