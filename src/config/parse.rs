use std::time::Duration;

use chrono::{DateTime, Local, NaiveDateTime, Utc};

use crate::domain::ScheduleValue;
use crate::error::ConfigError;

use super::types::ScheduleValueConfig;

/// Removes `//` line comments that sit outside JSON string literals.
pub(crate) fn strip_line_comments(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_string {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        if ch == '/' && chars.peek() == Some(&'/') {
            for skipped in chars.by_ref() {
                if skipped == '\n' {
                    out.push('\n');
                    break;
                }
            }
            continue;
        }

        if ch == '"' {
            in_string = true;
        }
        out.push(ch);
    }

    out
}

/// Finite, strictly positive seconds.
pub(crate) fn positive_secs(value: f64) -> Option<Duration> {
    if !value.is_finite() || value <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(value).ok()
}

pub(crate) fn parse_schedule_value(
    task: &str,
    field: &'static str,
    value: &ScheduleValueConfig,
) -> Result<ScheduleValue, ConfigError> {
    match value {
        ScheduleValueConfig::Offset(secs) => {
            if !secs.is_finite() || *secs < 0.0 {
                return Err(ConfigError::InvalidScheduleOffset {
                    task: task.to_owned(),
                    field,
                });
            }
            Duration::try_from_secs_f64(*secs)
                .map(ScheduleValue::Relative)
                .map_err(|_err| ConfigError::InvalidScheduleOffset {
                    task: task.to_owned(),
                    field,
                })
        }
        ScheduleValueConfig::Instant(raw) => parse_instant(raw)
            .map(ScheduleValue::Absolute)
            .ok_or_else(|| ConfigError::InvalidScheduleInstant {
                task: task.to_owned(),
                field,
                value: raw.clone(),
            }),
    }
}

/// RFC 3339 with offset, or a naive `YYYY-MM-DDTHH:MM:SS[.f]` taken as
/// local time.
fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .and_then(|naive| naive.and_local_timezone(Local).single())
        .map(|local| local.with_timezone(&Utc))
}
