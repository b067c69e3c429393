use std::time::Duration;

use chrono::{DateTime, Utc};

/// One end of a schedule window.
///
/// Relative values are offsets from the moment the task is activated and
/// are turned into absolute instants exactly once, by
/// [`crate::http::ScheduleGate::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleValue {
    Absolute(DateTime<Utc>),
    Relative(Duration),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Schedule {
    pub start: Option<ScheduleValue>,
    pub end: Option<ScheduleValue>,
}

impl ScheduleValue {
    /// Resolve against an activation wall-clock instant.
    #[must_use]
    pub fn resolve(self, activated_at: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            ScheduleValue::Absolute(at) => at,
            ScheduleValue::Relative(offset) => chrono::Duration::from_std(offset)
                .ok()
                .and_then(|offset| activated_at.checked_add_signed(offset))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }
}

impl Schedule {
    /// Whether start and end are known to be ordered without an activation
    /// instant. Mixed absolute/relative windows can only be checked once
    /// resolved.
    #[must_use]
    pub fn is_statically_ordered(&self) -> bool {
        match (self.start, self.end) {
            (Some(ScheduleValue::Relative(start)), Some(ScheduleValue::Relative(end))) => {
                start <= end
            }
            (Some(ScheduleValue::Absolute(start)), Some(ScheduleValue::Absolute(end))) => {
                start <= end
            }
            (Some(ScheduleValue::Absolute(_)), Some(ScheduleValue::Relative(_)))
            | (Some(ScheduleValue::Relative(_)), Some(ScheduleValue::Absolute(_)))
            | (None, _)
            | (_, None) => true,
        }
    }
}
