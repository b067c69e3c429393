use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval};

const MIN_REFILL_TICK: Duration = Duration::from_millis(1);
const MAX_REFILL_TICK: Duration = Duration::from_millis(50);

/// Token bucket shared by the workers of one dispatcher.
///
/// A refill task tops the semaphore up so that after `t` seconds exactly
/// `floor(t * rps) + 1` permits have been issued. Tokens that would push
/// the bucket past `burst` are discarded, which bounds catch-up bursts after
/// a stall. Waiters are served in FIFO order and each permit wakes a single
/// worker.
#[derive(Debug)]
pub struct RateLimiter {
    permits: Arc<Semaphore>,
    refill: JoinHandle<()>,
}

impl RateLimiter {
    /// Starts issuing permits immediately. Must be called inside a tokio
    /// runtime.
    #[must_use]
    pub fn new(rps: f64, burst: usize) -> Self {
        let permits = Arc::new(Semaphore::new(0));
        let refill = tokio::spawn(refill_loop(permits.clone(), rps, burst.max(1)));
        Self { permits, refill }
    }

    /// Waits for one permit. Returns `false` when the limiter is closed.
    pub async fn acquire(&self) -> bool {
        match self.permits.acquire().await {
            Ok(permit) => {
                permit.forget();
                true
            }
            Err(_closed) => false,
        }
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.refill.abort();
        self.permits.close();
    }
}

pub(crate) fn refill_tick(rps: f64) -> Duration {
    Duration::try_from_secs_f64(rps.recip())
        .unwrap_or(MAX_REFILL_TICK)
        .clamp(MIN_REFILL_TICK, MAX_REFILL_TICK)
}

/// Permits owed after `elapsed`, counting the one issued at start.
pub(crate) fn permits_due(rps: f64, elapsed: Duration) -> u64 {
    let due = (elapsed.as_secs_f64() * rps).floor();
    if due.is_finite() && due >= 0.0 {
        (due as u64).saturating_add(1)
    } else {
        u64::MAX
    }
}

async fn refill_loop(permits: Arc<Semaphore>, rps: f64, burst: usize) {
    let started = Instant::now();
    permits.add_permits(1);
    let mut issued: u64 = 1;

    let mut tick = interval(refill_tick(rps));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tick.tick().await;
    loop {
        tick.tick().await;
        if permits.is_closed() {
            break;
        }
        let due = permits_due(rps, started.elapsed());
        let owed = due.saturating_sub(issued);
        issued = due;
        if owed == 0 {
            continue;
        }
        let room = burst.saturating_sub(permits.available_permits());
        let grant = usize::try_from(owed).unwrap_or(usize::MAX).min(room);
        if grant > 0 {
            permits.add_permits(grant);
        }
    }
}
