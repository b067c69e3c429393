use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub(crate) fn current_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

pub(crate) fn duration_to_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

pub(crate) fn local_hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "unknown".to_owned())
}

/// Liveness is checked at half the timeout, but never more often than
/// every 200ms unless the timeout itself is shorter.
pub(crate) fn resolve_liveness_check_interval(timeout: Duration) -> Duration {
    let timeout_ms = timeout.as_millis();
    let mut interval_ms = timeout_ms.saturating_div(2);
    if interval_ms < 200 {
        interval_ms = timeout_ms.max(1);
    }
    Duration::from_millis(u64::try_from(interval_ms).unwrap_or(1))
}
