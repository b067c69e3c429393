use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;
use reqwest::header::CONTENT_TYPE;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::dispatcher::pick_request;
use super::execution::execute_request;
use super::rate::{permits_due, refill_tick};
use super::request::{effective_headers, prepare_request};
use super::{ActivationTurn, Dispatcher, RateLimiter, ScheduleGate, build_client};
use crate::domain::{
    HttpMethod, RequestBody, RequestOrder, RequestSpec, Schedule, ScheduleValue, Task, Timeouts,
};
use crate::error::{AppError, DispatchError};
use crate::metrics::OutcomeClass;
use crate::shutdown::{request_shutdown, shutdown_channel};

fn run_async_test<F>(future: F) -> Result<(), String>
where
    F: Future<Output = Result<(), String>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .map_err(|err| format!("Failed to build runtime: {}", err))?;
    runtime.block_on(future)
}

/// Arrival offsets and concurrency seen by [`spawn_server`].
#[derive(Default)]
struct ServerLog {
    arrivals: Mutex<Vec<Duration>>,
    active: AtomicU64,
    peak: AtomicU64,
}

/// HTTP server answering every request with `200 OK` after `delay`. Returns
/// the base URL.
async fn spawn_server(delay: Duration, log: Arc<ServerLog>) -> Result<String, String> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|err| format!("bind failed: {}", err))?;
    let addr = listener
        .local_addr()
        .map_err(|err| format!("local_addr failed: {}", err))?;
    let opened = Instant::now();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let log = Arc::clone(&log);
            tokio::spawn(async move {
                let mut buffer = vec![0_u8; 4096];
                let mut read = 0_usize;
                loop {
                    let Some(window) = buffer.get_mut(read..) else {
                        return;
                    };
                    match stream.read(window).await {
                        Ok(0) | Err(_) => return,
                        Ok(count) => read = read.saturating_add(count),
                    }
                    if buffer
                        .get(..read)
                        .is_some_and(|head| head.windows(4).any(|w| w == b"\r\n\r\n"))
                    {
                        break;
                    }
                }
                log.arrivals.lock().await.push(opened.elapsed());
                let now = log.active.fetch_add(1, Ordering::SeqCst).saturating_add(1);
                log.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                log.active.fetch_sub(1, Ordering::SeqCst);
                drop(
                    stream
                        .write_all(
                            b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nOK",
                        )
                        .await,
                );
                drop(stream.shutdown().await);
            });
        }
    });
    Ok(format!("http://{}", addr))
}

fn task_for(base: &str, coroutines: usize) -> Result<Task, String> {
    let url = url::Url::parse(&format!("{}/load", base)).map_err(|err| err.to_string())?;
    let mut task = Task::new("unit", vec![RequestSpec::get(url)])
        .ok_or_else(|| "task should build".to_owned())?;
    task.policy.limits.coroutines =
        NonZeroUsize::new(coroutines).ok_or_else(|| "coroutines must be positive".to_owned())?;
    task.policy.timeouts = Timeouts {
        connect: Duration::from_secs(2),
        read: Duration::from_secs(2),
        write: Duration::from_secs(2),
    };
    Ok(task)
}

#[test]
fn permits_due_counts_the_initial_permit() {
    assert_eq!(permits_due(100.0, Duration::ZERO), 1);
    assert_eq!(permits_due(100.0, Duration::from_millis(2_005)), 201);
    assert_eq!(permits_due(0.5, Duration::from_secs(3)), 2);
    assert_eq!(refill_tick(100.0), Duration::from_millis(10));
    assert_eq!(refill_tick(0.2), Duration::from_millis(50));
    assert_eq!(refill_tick(1_000_000.0), Duration::from_millis(1));
}

#[test]
fn rate_limiter_converges_to_target() -> Result<(), String> {
    run_async_test(async {
        let limiter = Arc::new(RateLimiter::new(100.0, 16));
        let granted = Arc::new(AtomicU64::new(0));
        let run_for = Duration::from_secs(2);
        let deadline = Instant::now() + run_for;

        let mut workers = Vec::new();
        for _ in 0..8 {
            let limiter = Arc::clone(&limiter);
            let granted = Arc::clone(&granted);
            workers.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        () = tokio::time::sleep_until(deadline) => break,
                        acquired = limiter.acquire() => {
                            if !acquired {
                                break;
                            }
                            granted.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                }
            }));
        }
        for worker in workers {
            worker.await.map_err(|err| err.to_string())?;
        }

        let total = granted.load(Ordering::SeqCst);
        if !(191..=211).contains(&total) {
            return Err(format!("expected ~201 permits, got {}", total));
        }
        Ok(())
    })
}

#[test]
fn uniform_selection_over_requests() -> Result<(), String> {
    let items = ["a", "b", "c", "d"];
    let mut rng = StdRng::seed_from_u64(7);
    let mut counts = BTreeMap::new();
    for _ in 0..40_000 {
        let picked = pick_request(&items, RequestOrder::Random, &mut rng)
            .ok_or_else(|| "non-empty slice must yield a pick".to_owned())?;
        *counts.entry(*picked).or_insert(0_u32) += 1;
    }
    for item in items {
        let count = counts.get(item).copied().unwrap_or(0);
        if !(9_500..=10_500).contains(&count) {
            return Err(format!("{} picked {} times", item, count));
        }
    }
    let empty: [&str; 0] = [];
    if pick_request(&empty, RequestOrder::Random, &mut rng).is_some() {
        return Err("empty slice must yield nothing".to_owned());
    }
    Ok(())
}

#[test]
fn request_headers_win_over_defaults() -> Result<(), String> {
    let defaults = BTreeMap::from([
        ("User-Agent".to_owned(), "default".to_owned()),
        ("X-Env".to_owned(), "prod".to_owned()),
    ]);
    let overrides = BTreeMap::from([("user-agent".to_owned(), "custom".to_owned())]);
    let headers = effective_headers("t", &defaults, &overrides).map_err(|err| err.to_string())?;
    assert_eq!(headers.len(), 2);
    assert_eq!(
        headers.get("User-Agent").and_then(|v| v.to_str().ok()),
        Some("custom")
    );
    assert_eq!(headers.get("x-env").and_then(|v| v.to_str().ok()), Some("prod"));

    let bad = BTreeMap::from([("bad header".to_owned(), "x".to_owned())]);
    match effective_headers("t", &bad, &BTreeMap::new()) {
        Err(DispatchError::InvalidHeader { name, .. }) => assert_eq!(name, "bad header"),
        other => return Err(format!("unexpected result {:?}", other)),
    }
    Ok(())
}

#[test]
fn json_bodies_get_content_type_unless_set() -> Result<(), String> {
    let url = url::Url::parse("http://localhost/items").map_err(|err| err.to_string())?;
    let mut spec = RequestSpec::get(url);
    spec.method = HttpMethod::Post;
    spec.body = Some(RequestBody::Json("{\"a\":1}".to_owned()));

    let prepared = prepare_request("t", &BTreeMap::new(), &spec).map_err(|err| err.to_string())?;
    assert_eq!(
        prepared.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()),
        Some("application/json")
    );
    assert_eq!(prepared.body.as_deref(), Some("{\"a\":1}"));

    spec.headers
        .insert("Content-Type".to_owned(), "text/plain".to_owned());
    let prepared = prepare_request("t", &BTreeMap::new(), &spec).map_err(|err| err.to_string())?;
    assert_eq!(
        prepared.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()),
        Some("text/plain")
    );

    spec.method = HttpMethod::Get;
    let prepared = prepare_request("t", &BTreeMap::new(), &spec).map_err(|err| err.to_string())?;
    assert!(prepared.body.is_none());
    Ok(())
}

#[test]
fn schedule_gate_waits_and_expires() -> Result<(), String> {
    run_async_test(async {
        let schedule = Schedule {
            start: Some(ScheduleValue::Relative(Duration::from_millis(200))),
            end: Some(ScheduleValue::Relative(Duration::from_millis(500))),
        };
        let activated = Instant::now();
        let gate = ScheduleGate::resolve("t", &schedule, Utc::now(), activated)
            .map_err(|err| err.to_string())?;

        assert!(!gate.is_expired());
        gate.await_start().await;
        if activated.elapsed() < Duration::from_millis(200) {
            return Err("await_start returned early".to_owned());
        }
        assert!(!gate.is_expired());
        gate.expired().await;
        assert!(gate.is_expired());
        if activated.elapsed() < Duration::from_millis(500) {
            return Err("gate expired early".to_owned());
        }
        Ok(())
    })
}

#[test]
fn schedule_gate_without_bounds_never_expires() -> Result<(), String> {
    run_async_test(async {
        let gate = ScheduleGate::activate("t", &Schedule::default()).map_err(|err| err.to_string())?;
        tokio::time::timeout(Duration::from_millis(50), gate.await_start())
            .await
            .map_err(|_elapsed| "await_start should return immediately".to_owned())?;
        assert!(!gate.is_expired());
        if tokio::time::timeout(Duration::from_millis(50), gate.expired())
            .await
            .is_ok()
        {
            return Err("gate without end must not expire".to_owned());
        }
        Ok(())
    })
}

#[test]
fn mixed_schedule_rejects_end_before_start() -> Result<(), String> {
    let now = Utc::now();
    let schedule = Schedule {
        start: Some(ScheduleValue::Relative(Duration::from_secs(60))),
        end: Some(ScheduleValue::Absolute(now)),
    };
    match ScheduleGate::resolve("late", &schedule, now, Instant::now()) {
        Err(DispatchError::ScheduleEndBeforeStart { task }) => {
            assert_eq!(task, "late");
            Ok(())
        }
        other => Err(format!("unexpected result {:?}", other.map(|_gate| ()))),
    }
}

#[test]
fn dispatcher_respects_schedule_window() -> Result<(), String> {
    run_async_test(async {
        let log = Arc::new(ServerLog::default());
        let server_opened = Instant::now();
        let base = spawn_server(Duration::from_millis(100), Arc::clone(&log)).await?;

        let mut task = task_for(&base, 2)?;
        task.policy.schedule = Schedule {
            start: Some(ScheduleValue::Relative(Duration::from_millis(400))),
            end: Some(ScheduleValue::Relative(Duration::from_millis(1_000))),
        };
        let dispatcher = Dispatcher::new(Arc::new(task)).map_err(|err| err.to_string())?;
        let (_shutdown_tx, shutdown_rx) = shutdown_channel();
        let activated = server_opened.elapsed();
        let snapshot = dispatcher
            .run(shutdown_rx)
            .await
            .map_err(|err| err.to_string())?;

        let arrivals = log.arrivals.lock().await.clone();
        let first = arrivals
            .iter()
            .min()
            .copied()
            .ok_or_else(|| "no requests arrived".to_owned())?;
        let last = arrivals.iter().max().copied().unwrap_or(first);
        if first < activated + Duration::from_millis(400) {
            return Err(format!("request arrived before start: {:?}", first));
        }
        if last > activated + Duration::from_millis(1_150) {
            return Err(format!("request started after end: {:?}", last));
        }
        assert_eq!(snapshot.in_flight, 0);
        assert_eq!(snapshot.counters.sent, snapshot.counters.succeeded);
        assert_eq!(snapshot.counters.sent, arrivals.len() as u64);
        assert!(snapshot.final_report);
        Ok(())
    })
}

#[test]
fn dispatcher_never_exceeds_coroutines() -> Result<(), String> {
    run_async_test(async {
        let log = Arc::new(ServerLog::default());
        let base = spawn_server(Duration::from_millis(40), Arc::clone(&log)).await?;

        let mut task = task_for(&base, 3)?;
        task.policy.schedule.end = Some(ScheduleValue::Relative(Duration::from_millis(600)));
        let dispatcher = Dispatcher::new(Arc::new(task)).map_err(|err| err.to_string())?;
        let accumulator = dispatcher.accumulator();
        let (_shutdown_tx, shutdown_rx) = shutdown_channel();
        let snapshot = dispatcher
            .run(shutdown_rx)
            .await
            .map_err(|err| err.to_string())?;

        assert!(snapshot.counters.sent >= 3);
        assert!(accumulator.peak_in_flight() <= 3);
        assert!(log.peak.load(Ordering::SeqCst) <= 3);
        Ok(())
    })
}

#[test]
fn dispatcher_runs_until_cancelled() -> Result<(), String> {
    run_async_test(async {
        let log = Arc::new(ServerLog::default());
        let base = spawn_server(Duration::ZERO, Arc::clone(&log)).await?;

        let mut task = task_for(&base, 2)?;
        task.policy.limits.rps = Some(50.0);
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(task)).map_err(|err| err.to_string())?);
        let (shutdown_tx, shutdown_rx) = shutdown_channel();
        let running = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.run(shutdown_rx).await })
        };

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        if running.is_finished() {
            return Err("dispatcher stopped without cancellation".to_owned());
        }
        request_shutdown(&shutdown_tx);
        let snapshot = tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .map_err(|_elapsed| "dispatcher ignored shutdown".to_owned())?
            .map_err(|err| err.to_string())?
            .map_err(|err: AppError| err.to_string())?;

        let completed = snapshot.counters.completed();
        if !(40..=60).contains(&completed) {
            return Err(format!("expected ~51 requests at 50 rps, got {}", completed));
        }
        Ok(())
    })
}

#[test]
fn failures_are_classified() -> Result<(), String> {
    run_async_test(async {
        let closed = {
            let listener = TcpListener::bind("127.0.0.1:0")
                .await
                .map_err(|err| err.to_string())?;
            listener.local_addr().map_err(|err| err.to_string())?
        };
        let task = task_for(&format!("http://{}", closed), 1)?;
        let client = build_client(&task).map_err(|err| err.to_string())?;
        let prepared = super::prepare_requests(&task).map_err(|err| err.to_string())?;
        let request = prepared
            .first()
            .ok_or_else(|| "missing request".to_owned())?;
        let refused = execute_request(&client, request).await;
        assert_eq!(refused.class, OutcomeClass::Transport);

        let log = Arc::new(ServerLog::default());
        let slow = spawn_server(Duration::from_secs(5), log).await?;
        let mut task = task_for(&slow, 1)?;
        task.policy.timeouts = Timeouts {
            connect: Duration::from_millis(200),
            read: Duration::from_millis(200),
            write: Duration::from_millis(200),
        };
        let client = build_client(&task).map_err(|err| err.to_string())?;
        let prepared = super::prepare_requests(&task).map_err(|err| err.to_string())?;
        let request = prepared
            .first()
            .ok_or_else(|| "missing request".to_owned())?;
        let timed_out = execute_request(&client, request).await;
        assert_eq!(timed_out.class, OutcomeClass::Timeout);
        Ok(())
    })
}

/// Runs `tasks` through ordered turns and returns their final snapshots.
async fn run_in_order(
    tasks: Vec<Task>,
    shutdown_rx: &crate::shutdown::ShutdownReceiver,
) -> Result<Vec<crate::metrics::ReportSnapshot>, String> {
    let turns = ActivationTurn::in_order(tasks.iter().map(|task| &task.policy.schedule));
    let dispatchers = tasks
        .into_iter()
        .map(|task| Dispatcher::new(Arc::new(task)))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| err.to_string())?;
    let runs = dispatchers
        .iter()
        .zip(turns)
        .map(|(dispatcher, turn)| dispatcher.run_in_turn(turn, shutdown_rx.clone()));
    futures_util::future::join_all(runs)
        .await
        .into_iter()
        .map(|result| result.map_err(|err| err.to_string()))
        .collect()
}

#[test]
fn next_task_activates_when_previous_window_closes() -> Result<(), String> {
    run_async_test(async {
        let first_log = Arc::new(ServerLog::default());
        let second_log = Arc::new(ServerLog::default());
        let first_base = spawn_server(Duration::from_millis(20), Arc::clone(&first_log)).await?;
        let second_base = spawn_server(Duration::from_millis(20), Arc::clone(&second_log)).await?;

        let mut first = task_for(&first_base, 2)?;
        first.policy.schedule.end = Some(ScheduleValue::Relative(Duration::from_millis(500)));
        let mut second = task_for(&second_base, 2)?;
        second.policy.schedule.end = Some(ScheduleValue::Relative(Duration::from_millis(300)));

        let (_shutdown_tx, shutdown_rx) = shutdown_channel();
        let snapshots = run_in_order(vec![first, second], &shutdown_rx).await?;

        let second_first = second_log
            .arrivals
            .lock()
            .await
            .iter()
            .min()
            .copied()
            .ok_or_else(|| "second task sent nothing".to_owned())?;
        if second_first < Duration::from_millis(500) {
            return Err(format!(
                "second task started {:?} after its server opened, before the first window closed",
                second_first
            ));
        }
        if first_log.arrivals.lock().await.is_empty() {
            return Err("first task sent nothing".to_owned());
        }
        if snapshots.iter().any(|snapshot| snapshot.counters.sent == 0) {
            return Err("every task should have run".to_owned());
        }
        Ok(())
    })
}

#[test]
fn absolute_start_activates_without_waiting_for_previous() -> Result<(), String> {
    run_async_test(async {
        let first_log = Arc::new(ServerLog::default());
        let second_log = Arc::new(ServerLog::default());
        let first_base = spawn_server(Duration::from_millis(20), Arc::clone(&first_log)).await?;
        let second_base = spawn_server(Duration::from_millis(20), Arc::clone(&second_log)).await?;

        let mut first = task_for(&first_base, 2)?;
        first.policy.schedule.end = Some(ScheduleValue::Relative(Duration::from_millis(1_000)));
        let mut second = task_for(&second_base, 2)?;
        let now = Utc::now();
        let end = now
            .checked_add_signed(chrono::Duration::milliseconds(400))
            .ok_or_else(|| "time overflow".to_owned())?;
        second.policy.schedule = Schedule {
            start: Some(ScheduleValue::Absolute(now)),
            end: Some(ScheduleValue::Absolute(end)),
        };

        let (_shutdown_tx, shutdown_rx) = shutdown_channel();
        run_in_order(vec![first, second], &shutdown_rx).await?;

        let second_first = second_log
            .arrivals
            .lock()
            .await
            .iter()
            .min()
            .copied()
            .ok_or_else(|| "second task sent nothing".to_owned())?;
        if second_first >= Duration::from_millis(1_000) {
            return Err(format!(
                "overlapping absolute window waited for the previous task: {:?}",
                second_first
            ));
        }
        Ok(())
    })
}

#[test]
fn shutdown_skips_tasks_still_waiting_for_their_turn() -> Result<(), String> {
    run_async_test(async {
        let first_log = Arc::new(ServerLog::default());
        let second_log = Arc::new(ServerLog::default());
        let first_base = spawn_server(Duration::ZERO, Arc::clone(&first_log)).await?;
        let second_base = spawn_server(Duration::ZERO, Arc::clone(&second_log)).await?;

        let mut first = task_for(&first_base, 1)?;
        first.policy.limits.rps = Some(20.0);
        let second = task_for(&second_base, 1)?;

        let (shutdown_tx, shutdown_rx) = shutdown_channel();
        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            request_shutdown(&shutdown_tx);
        });
        let snapshots = tokio::time::timeout(
            Duration::from_secs(5),
            run_in_order(vec![first, second], &shutdown_rx),
        )
        .await
        .map_err(|_elapsed| "ordered run ignored shutdown".to_owned())??;
        stopper.await.map_err(|err| err.to_string())?;

        match snapshots.as_slice() {
            [ran, skipped] if ran.counters.sent > 0 && skipped.counters.sent == 0 => {}
            other => {
                return Err(format!(
                    "unexpected sent counts {:?}",
                    other.iter().map(|s| s.counters.sent).collect::<Vec<_>>()
                ));
            }
        }
        if !second_log.arrivals.lock().await.is_empty() {
            return Err("skipped task reached its target".to_owned());
        }
        Ok(())
    })
}

/// Connections accepted and requests answered by [`spawn_keep_alive_server`].
#[derive(Default)]
struct ConnectionLog {
    connections: AtomicU64,
    requests: AtomicU64,
}

/// HTTP/1.1 server that keeps connections open between requests. Returns
/// the base URL.
async fn spawn_keep_alive_server(log: Arc<ConnectionLog>) -> Result<String, String> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|err| format!("bind failed: {}", err))?;
    let addr = listener
        .local_addr()
        .map_err(|err| format!("local_addr failed: {}", err))?;
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            log.connections.fetch_add(1, Ordering::SeqCst);
            let log = Arc::clone(&log);
            tokio::spawn(async move {
                let mut pending: Vec<u8> = Vec::new();
                let mut chunk = [0_u8; 4096];
                loop {
                    match stream.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(count) => pending.extend_from_slice(chunk.get(..count).unwrap_or_default()),
                    }
                    while let Some(end) = pending.windows(4).position(|w| w == b"\r\n\r\n") {
                        pending.drain(..end.saturating_add(4));
                        log.requests.fetch_add(1, Ordering::SeqCst);
                        if stream
                            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nOK")
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                }
            });
        }
    });
    Ok(format!("http://{}", addr))
}

async fn run_windowed(task: Task) -> Result<crate::metrics::ReportSnapshot, String> {
    let dispatcher = Dispatcher::new(Arc::new(task)).map_err(|err| err.to_string())?;
    let (_shutdown_tx, shutdown_rx) = shutdown_channel();
    dispatcher
        .run(shutdown_rx)
        .await
        .map_err(|err| err.to_string())
}

#[test]
fn override_hosts_route_unresolvable_names() -> Result<(), String> {
    run_async_test(async {
        let log = Arc::new(ServerLog::default());
        let base = spawn_server(Duration::ZERO, Arc::clone(&log)).await?;
        let port = url::Url::parse(&base)
            .map_err(|err| err.to_string())?
            .port()
            .ok_or_else(|| "server URL has no port".to_owned())?;

        let mut task = task_for(&format!("http://dreq-target.invalid:{}", port), 2)?;
        task.policy.limits.rps = Some(20.0);
        task.policy.schedule.end = Some(ScheduleValue::Relative(Duration::from_millis(400)));

        let client = build_client(&task).map_err(|err| err.to_string())?;
        let prepared = super::prepare_requests(&task).map_err(|err| err.to_string())?;
        let request = prepared
            .first()
            .ok_or_else(|| "missing request".to_owned())?;
        let unresolved = execute_request(&client, request).await;
        assert!(!unresolved.class.is_success());

        task.prefabs
            .override_hosts
            .insert("dreq-target.invalid".to_owned(), IpAddr::V4(Ipv4Addr::LOCALHOST));
        let snapshot = run_windowed(task).await?;
        if snapshot.counters.sent == 0 || snapshot.counters.succeeded != snapshot.counters.sent {
            return Err(format!("overridden host not reached: {:?}", snapshot.counters));
        }
        assert_eq!(log.arrivals.lock().await.len() as u64, snapshot.counters.sent);
        Ok(())
    })
}

#[test]
fn disabled_reuse_opens_a_connection_per_request() -> Result<(), String> {
    run_async_test(async {
        let log = Arc::new(ConnectionLog::default());
        let base = spawn_keep_alive_server(Arc::clone(&log)).await?;
        let mut task = task_for(&base, 2)?;
        task.policy.reuse_connections = false;
        task.policy.limits.rps = Some(40.0);
        task.policy.schedule.end = Some(ScheduleValue::Relative(Duration::from_millis(500)));

        let snapshot = run_windowed(task).await?;
        let connections = log.connections.load(Ordering::SeqCst);
        let requests = log.requests.load(Ordering::SeqCst);
        if requests < 5 || requests != snapshot.counters.succeeded {
            return Err(format!(
                "expected the server to answer every request, got {} of {}",
                requests, snapshot.counters.succeeded
            ));
        }
        if connections != requests {
            return Err(format!(
                "expected one connection per request, got {} for {}",
                connections, requests
            ));
        }
        Ok(())
    })
}

#[test]
fn reused_connections_stay_within_worker_count() -> Result<(), String> {
    run_async_test(async {
        let log = Arc::new(ConnectionLog::default());
        let base = spawn_keep_alive_server(Arc::clone(&log)).await?;
        let mut task = task_for(&base, 2)?;
        task.policy.reuse_connections = true;
        task.policy.limits.rps = Some(40.0);
        task.policy.schedule.end = Some(ScheduleValue::Relative(Duration::from_millis(500)));

        let snapshot = run_windowed(task).await?;
        let connections = log.connections.load(Ordering::SeqCst);
        let requests = log.requests.load(Ordering::SeqCst);
        if requests < 5 || requests != snapshot.counters.succeeded {
            return Err(format!(
                "expected the server to answer every request, got {} of {}",
                requests, snapshot.counters.succeeded
            ));
        }
        if connections == 0 || connections > 2 {
            return Err(format!(
                "expected at most 2 pooled connections, got {} for {} requests",
                connections, requests
            ));
        }
        Ok(())
    })
}
