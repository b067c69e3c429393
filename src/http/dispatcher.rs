use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use reqwest::Client;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::domain::{RequestOrder, Task};
use crate::error::{AppResult, DispatchError};
use crate::metrics::{ReportAccumulator, ReportSnapshot};
use crate::shutdown::{ShutdownReceiver, is_shutdown, wait_for_shutdown};

use super::client::build_client;
use super::execution::execute_request;
use super::rate::RateLimiter;
use super::request::{PreparedRequest, prepare_requests};
use super::schedule::ScheduleGate;
use super::sequence::ActivationTurn;

/// Runs one task on a fixed pool of `coroutines` workers for the length of
/// its schedule window, or until shutdown.
#[derive(Debug)]
pub struct Dispatcher {
    task: Arc<Task>,
    accumulator: Arc<ReportAccumulator>,
}

struct WorkerContext {
    client: Client,
    requests: Vec<PreparedRequest>,
    order: RequestOrder,
    gate: ScheduleGate,
    limiter: Option<RateLimiter>,
    accumulator: Arc<ReportAccumulator>,
}

impl Dispatcher {
    /// # Errors
    ///
    /// Returns an error if the accumulator cannot be created.
    pub fn new(task: Arc<Task>) -> AppResult<Self> {
        Ok(Self {
            task,
            accumulator: Arc::new(ReportAccumulator::new()?),
        })
    }

    #[must_use]
    pub fn task(&self) -> &Task {
        &self.task
    }

    /// Live counters; safe to snapshot while the dispatcher runs.
    #[must_use]
    pub fn accumulator(&self) -> Arc<ReportAccumulator> {
        Arc::clone(&self.accumulator)
    }

    /// Activates the task now and runs it to completion. Returns the final
    /// snapshot.
    ///
    /// In-flight requests always finish; shutdown and window expiry only
    /// stop new iterations.
    ///
    /// # Errors
    ///
    /// Returns a [`DispatchError`] when the schedule, HTTP client or request
    /// templates cannot be set up. No request has been sent in that case.
    pub async fn run(&self, shutdown_rx: ShutdownReceiver) -> AppResult<ReportSnapshot> {
        self.run_in_turn(ActivationTurn::immediate(), shutdown_rx)
            .await
    }

    /// Like [`run`](Self::run), but activates only once `turn` opens. The
    /// turn closes as soon as the window ends or the run stops.
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run).
    pub async fn run_in_turn(
        &self,
        mut turn: ActivationTurn,
        mut shutdown_rx: ShutdownReceiver,
    ) -> AppResult<ReportSnapshot> {
        let task = &self.task;
        if !turn.wait(&mut shutdown_rx).await {
            info!("Task '{}' cancelled before activation", task.name);
            return Ok(self.accumulator.snapshot(true));
        }
        debug!("Task '{}' activated", task.name);
        self.accumulator.restart_clock();
        let gate = ScheduleGate::activate(&task.name, &task.policy.schedule)?;
        let client = build_client(task)?;
        let requests = prepare_requests(task)?;

        if let Some(start) = gate.start_wall() {
            info!("Task '{}' waiting for start at {}", task.name, start);
        }
        tokio::select! {
            () = gate.await_start() => {}
            () = wait_for_shutdown(&mut shutdown_rx) => {
                info!("Task '{}' cancelled before start", task.name);
                return Ok(self.accumulator.snapshot(true));
            }
        }

        let coroutines = task.coroutines();
        let limiter = task
            .policy
            .limits
            .rps
            .map(|rps| RateLimiter::new(rps, coroutines));
        info!(
            "Task '{}' started: {} workers, rps {}, window end {}",
            task.name,
            coroutines,
            task.policy
                .limits
                .rps
                .map_or_else(|| "unlimited".to_owned(), |rps| rps.to_string()),
            gate.end_wall()
                .map_or_else(|| "none".to_owned(), |end| end.to_rfc3339()),
        );

        let context = Arc::new(WorkerContext {
            client,
            requests,
            order: task.policy.order,
            gate,
            limiter,
            accumulator: Arc::clone(&self.accumulator),
        });

        let started = Instant::now();
        let mut handles = Vec::with_capacity(coroutines);
        for _ in 0..coroutines {
            handles.push(tokio::spawn(worker_loop(
                Arc::clone(&context),
                shutdown_rx.clone(),
                StdRng::from_entropy(),
            )));
        }

        let workers = join_workers(&task.name, handles);
        tokio::pin!(workers);
        tokio::select! {
            () = &mut workers => {}
            () = context.gate.expired() => {
                turn.close();
                workers.await;
            }
        }
        drop(context);
        drop(turn);

        let snapshot = self.accumulator.snapshot(true);
        info!(
            "Task '{}' finished after {:.1}s: {} sent",
            task.name,
            started.elapsed().as_secs_f64(),
            snapshot.counters.sent
        );
        Ok(snapshot)
    }
}

async fn join_workers(task: &str, handles: Vec<JoinHandle<()>>) {
    for (worker, handle) in handles.into_iter().enumerate() {
        if let Err(err) = handle.await {
            error!(
                "{}",
                DispatchError::WorkerFailed {
                    task: task.to_owned(),
                    worker,
                    source: err,
                }
            );
        }
    }
}

async fn worker_loop(context: Arc<WorkerContext>, mut shutdown_rx: ShutdownReceiver, mut rng: StdRng) {
    loop {
        if is_shutdown(&shutdown_rx) || context.gate.is_expired() {
            break;
        }

        if let Some(limiter) = context.limiter.as_ref() {
            let acquired = tokio::select! {
                () = wait_for_shutdown(&mut shutdown_rx) => false,
                () = context.gate.expired() => false,
                acquired = limiter.acquire() => acquired,
            };
            if !acquired || is_shutdown(&shutdown_rx) || context.gate.is_expired() {
                break;
            }
        }

        let Some(request) = pick_request(&context.requests, context.order, &mut rng) else {
            break;
        };

        let in_flight = context.accumulator.begin();
        let started = Instant::now();
        let outcome = execute_request(&context.client, request).await;
        context
            .accumulator
            .record(outcome.class, started.elapsed(), outcome.response_bytes);
        drop(in_flight);
    }
    debug!("Worker stopped");
}

/// Next request per the order policy.
pub(crate) fn pick_request<'items, T, R>(
    items: &'items [T],
    order: RequestOrder,
    rng: &mut R,
) -> Option<&'items T>
where
    R: rand::Rng + ?Sized,
{
    match order {
        RequestOrder::Random => items.choose(rng),
    }
}
