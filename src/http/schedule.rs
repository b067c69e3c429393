use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::domain::{Schedule, ScheduleValue};
use crate::error::DispatchError;

/// A task's activation window, resolved once at activation.
///
/// Both ends are held as monotonic instants. An end too far in the future
/// to represent is treated as absent.
#[derive(Debug, Clone)]
pub struct ScheduleGate {
    start: Option<Boundary>,
    end: Option<Boundary>,
}

#[derive(Debug, Clone, Copy)]
struct Boundary {
    wall: DateTime<Utc>,
    at: Option<Instant>,
}

impl ScheduleGate {
    /// Resolve against "now".
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ScheduleEndBeforeStart`] when the resolved
    /// end precedes the resolved start.
    pub fn activate(task: &str, schedule: &Schedule) -> Result<Self, DispatchError> {
        Self::resolve(task, schedule, Utc::now(), Instant::now())
    }

    /// Resolve relative values as offsets from `activated_wall`, which must
    /// correspond to `activated_at` on the monotonic clock.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ScheduleEndBeforeStart`] when the resolved
    /// end precedes the resolved start.
    pub fn resolve(
        task: &str,
        schedule: &Schedule,
        activated_wall: DateTime<Utc>,
        activated_at: Instant,
    ) -> Result<Self, DispatchError> {
        let boundary = |value: ScheduleValue| {
            let wall = value.resolve(activated_wall);
            let at = match value {
                ScheduleValue::Relative(offset) => activated_at.checked_add(offset),
                ScheduleValue::Absolute(_) => match (wall - activated_wall).to_std() {
                    Ok(ahead) => activated_at.checked_add(ahead),
                    Err(_negative) => {
                        let behind = (activated_wall - wall).to_std().unwrap_or(Duration::MAX);
                        Some(activated_at.checked_sub(behind).unwrap_or(activated_at))
                    }
                },
            };
            Boundary { wall, at }
        };

        let start = schedule.start.map(boundary);
        let end = schedule.end.map(boundary);
        if let (Some(start), Some(end)) = (start, end)
            && end.wall < start.wall
        {
            return Err(DispatchError::ScheduleEndBeforeStart {
                task: task.to_owned(),
            });
        }
        Ok(Self { start, end })
    }

    /// Sleeps until the start instant; returns at once when there is none or
    /// it has passed.
    pub async fn await_start(&self) {
        match self.start {
            None => {}
            Some(Boundary { at: Some(at), .. }) => tokio::time::sleep_until(at).await,
            Some(Boundary { at: None, .. }) => std::future::pending::<()>().await,
        }
    }

    /// True once the end instant has passed. Never true without an end.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.end_instant()
            .is_some_and(|end| Instant::now() >= end)
    }

    /// Resolves when the window closes; pending forever without an end.
    pub async fn expired(&self) {
        match self.end_instant() {
            Some(end) => tokio::time::sleep_until(end).await,
            None => std::future::pending::<()>().await,
        }
    }

    #[must_use]
    pub fn start_wall(&self) -> Option<DateTime<Utc>> {
        self.start.map(|boundary| boundary.wall)
    }

    #[must_use]
    pub fn end_wall(&self) -> Option<DateTime<Utc>> {
        self.end.map(|boundary| boundary.wall)
    }

    fn end_instant(&self) -> Option<Instant> {
        self.end.and_then(|boundary| boundary.at)
    }
}
