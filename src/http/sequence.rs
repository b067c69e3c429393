use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::domain::{Schedule, ScheduleValue};
use crate::shutdown::{ShutdownReceiver, is_shutdown, wait_for_shutdown};

/// When one task of an ordered list may be activated, and how it tells its
/// successor that its window has closed.
///
/// A turn opens once the previous task's window closes. A task with an
/// absolute start also opens at that wall-clock time, so absolute windows
/// that overlap still run side by side. Dropping a turn closes it.
#[derive(Debug)]
pub struct ActivationTurn {
    after: Option<watch::Receiver<bool>>,
    fixed_start: Option<DateTime<Utc>>,
    closed: watch::Sender<bool>,
}

impl ActivationTurn {
    /// A turn that opens at once and has no successor.
    #[must_use]
    pub fn immediate() -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            after: None,
            fixed_start: None,
            closed,
        }
    }

    /// One turn per schedule, chained in the given order.
    pub fn in_order<'schedule, I>(schedules: I) -> Vec<Self>
    where
        I: IntoIterator<Item = &'schedule Schedule>,
    {
        let mut previous: Option<watch::Receiver<bool>> = None;
        schedules
            .into_iter()
            .map(|schedule| {
                let (closed, next) = watch::channel(false);
                let fixed_start = match schedule.start {
                    Some(ScheduleValue::Absolute(at)) => Some(at),
                    Some(ScheduleValue::Relative(_)) | None => None,
                };
                Self {
                    after: previous.replace(next),
                    fixed_start,
                    closed,
                }
            })
            .collect()
    }

    /// Waits for the turn to open. Returns `false` when shutdown came first.
    pub async fn wait(&mut self, shutdown_rx: &mut ShutdownReceiver) -> bool {
        let Some(previous) = self.after.as_mut() else {
            return !is_shutdown(shutdown_rx);
        };
        let fixed_start = self.fixed_start;
        let previous_closed = async {
            // A dropped sender counts as closed.
            let _closed = previous.wait_for(|closed| *closed).await.is_ok();
        };
        let start_reached = async {
            match fixed_start {
                Some(at) => {
                    if let Ok(ahead) = at.signed_duration_since(Utc::now()).to_std() {
                        tokio::time::sleep(ahead).await;
                    }
                }
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            () = previous_closed => {}
            () = start_reached => {}
            () = wait_for_shutdown(shutdown_rx) => return false,
        }
        !is_shutdown(shutdown_rx)
    }

    /// Lets the next task activate. Idempotent.
    pub fn close(&self) {
        self.closed.send_replace(true);
    }
}

impl Drop for ActivationTurn {
    fn drop(&mut self) {
        self.close();
    }
}
