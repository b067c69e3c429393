use std::time::Duration;

use chrono::{TimeZone, Utc};

use super::{HttpMethod, RequestOrder, RequestSpec, Schedule, ScheduleValue, Task, TaskOrder};

#[test]
fn method_parse_is_case_insensitive() {
    assert_eq!(HttpMethod::parse("get"), Some(HttpMethod::Get));
    assert_eq!(HttpMethod::parse(" Patch "), Some(HttpMethod::Patch));
    assert_eq!(HttpMethod::parse("TRACE"), None);
}

#[test]
fn only_post_put_patch_allow_body() {
    let with_body: Vec<HttpMethod> = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Patch,
        HttpMethod::Delete,
        HttpMethod::Head,
        HttpMethod::Options,
    ]
    .into_iter()
    .filter(|method| method.allows_body())
    .collect();
    assert_eq!(
        with_body,
        vec![HttpMethod::Post, HttpMethod::Put, HttpMethod::Patch]
    );
}

#[test]
fn task_requires_requests() -> Result<(), String> {
    if Task::new("empty", Vec::new()).is_some() {
        return Err("empty task should be rejected".to_owned());
    }
    let url = url::Url::parse("http://localhost/").map_err(|err| err.to_string())?;
    let task = Task::new("one", vec![RequestSpec::get(url)])
        .ok_or_else(|| "task with one request should build".to_owned())?;
    assert_eq!(task.coroutines(), 64);
    assert!(task.policy.reuse_connections);
    Ok(())
}

#[test]
fn relative_schedule_values_anchor_on_activation() -> Result<(), String> {
    let activated = Utc
        .with_ymd_and_hms(2025, 1, 1, 10, 0, 0)
        .single()
        .ok_or_else(|| "valid timestamp".to_owned())?;
    let start = ScheduleValue::Relative(Duration::from_secs(2)).resolve(activated);
    let end = ScheduleValue::Relative(Duration::from_secs(5)).resolve(activated);
    assert_eq!((start - activated).num_seconds(), 2);
    assert_eq!((end - activated).num_seconds(), 5);

    let absolute = ScheduleValue::Absolute(activated).resolve(end);
    assert_eq!(absolute, activated);
    Ok(())
}

#[test]
fn static_ordering_checks_only_comparable_values() -> Result<(), String> {
    let at = Utc
        .with_ymd_and_hms(2025, 1, 1, 10, 0, 0)
        .single()
        .ok_or_else(|| "valid timestamp".to_owned())?;
    let reversed = Schedule {
        start: Some(ScheduleValue::Relative(Duration::from_secs(5))),
        end: Some(ScheduleValue::Relative(Duration::from_secs(1))),
    };
    assert!(!reversed.is_statically_ordered());

    let mixed = Schedule {
        start: Some(ScheduleValue::Absolute(at)),
        end: Some(ScheduleValue::Relative(Duration::from_secs(1))),
    };
    assert!(mixed.is_statically_ordered());
    assert!(Schedule::default().is_statically_ordered());
    Ok(())
}

#[test]
fn orders_parse_only_random() {
    assert_eq!("random".parse::<RequestOrder>(), Ok(RequestOrder::Random));
    assert_eq!("random".parse::<TaskOrder>(), Ok(TaskOrder::Random));
    assert_eq!(
        "round_robin".parse::<TaskOrder>(),
        Err("round_robin".to_owned())
    );
}
