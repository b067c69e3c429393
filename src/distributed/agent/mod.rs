//! Client side of distributed mode.
mod link;
mod retry;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::{CONFIG_VERSION, ClientSettings, validate_task};
use crate::domain::Task;
use crate::error::{AppResult, CoordinationError};
use crate::http::{ActivationTurn, Dispatcher};
use crate::metrics::{ReportAccumulator, ReportSnapshot};
use crate::shutdown::{ShutdownReceiver, is_shutdown, wait_for_shutdown};

use super::protocol::{RegisterRequest, ReportPayload};
use super::utils::{current_time_ms, local_hostname};

pub use link::{CoordinatorLink, HttpCoordinatorLink};
pub use retry::RetryPolicy;

/// Tasks handed out by one successful registration.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub client_id: String,
    pub cycle: u64,
    pub tasks: Vec<Task>,
}

/// Result of every task in one cycle, in assignment order.
#[derive(Debug)]
pub struct CycleOutcome {
    pub client_id: String,
    pub cycle: u64,
    pub results: Vec<(String, AppResult<ReportSnapshot>)>,
}

/// Registers with a coordinator, runs what it is given and reports back.
#[derive(Debug)]
pub struct ClientAgent<L> {
    link: Arc<L>,
    settings: ClientSettings,
    hostname: String,
    client_id: Mutex<Option<String>>,
}

impl<L> ClientAgent<L>
where
    L: CoordinatorLink + 'static,
{
    #[must_use]
    pub fn new(link: L, settings: ClientSettings) -> Self {
        let client_id = Mutex::new(settings.client_id.clone());
        Self {
            link: Arc::new(link),
            settings,
            hostname: local_hostname(),
            client_id,
        }
    }

    /// Registers, retrying with backoff, and validates the assignment.
    ///
    /// # Errors
    ///
    /// Returns a [`CoordinationError`] once retries are exhausted, or when
    /// the coordinator sends an incompatible or invalid assignment.
    pub async fn register(&self) -> AppResult<Assignment> {
        let request = RegisterRequest {
            client_id: self.known_client_id(),
            hostname: self.hostname.clone(),
            version: CONFIG_VERSION.to_owned(),
        };
        info!("Registering with coordinator {}", self.settings.server_url);
        let response = self
            .settings
            .retry
            .run("register", || self.link.register(&request))
            .await?;

        if crate::config::COMPATIBLE_VERSIONS
            .iter()
            .all(|version| *version != response.version.trim())
        {
            return Err(CoordinationError::IncompatibleVersion {
                version: response.version,
                expected: crate::config::COMPATIBLE_VERSIONS.join(", "),
            }
            .into());
        }
        if response.tasks.is_empty() {
            return Err(CoordinationError::NoTasksAssigned.into());
        }
        let tasks = response
            .tasks
            .iter()
            .map(|config| {
                validate_task(config).map_err(|err| CoordinationError::InvalidAssignment {
                    message: err.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        *self
            .client_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(response.client_id.clone());
        info!(
            "Registered as '{}' (cycle {}), {} task(s) in {} order",
            response.client_id,
            response.cycle,
            tasks.len(),
            response.task_order
        );
        Ok(Assignment {
            client_id: response.client_id,
            cycle: response.cycle,
            tasks,
        })
    }

    /// One full cycle: register, run the assigned tasks in assignment order
    /// and push their final reports. Each task is activated when the previous
    /// one's window closes.
    ///
    /// # Errors
    ///
    /// Returns an error when registration fails. Task failures are carried
    /// in the outcome instead.
    pub async fn run_cycle(&self, shutdown_rx: &ShutdownReceiver) -> AppResult<CycleOutcome> {
        let mut cancel_rx = shutdown_rx.clone();
        let assignment = tokio::select! {
            registered = self.register() => registered?,
            () = wait_for_shutdown(&mut cancel_rx) => {
                return Ok(CycleOutcome {
                    client_id: self.known_client_id().unwrap_or_default(),
                    cycle: 0,
                    results: Vec::new(),
                });
            }
        };

        let heartbeat = tokio::spawn(heartbeat_loop(
            Arc::clone(&self.link),
            assignment.client_id.clone(),
            self.settings.heartbeat_interval,
        ));

        let turns = ActivationTurn::in_order(
            assignment
                .tasks
                .iter()
                .map(|task| &task.policy.schedule),
        );
        let runs = assignment.tasks.iter().cloned().zip(turns).map(|(task, turn)| {
            let name = task.name.clone();
            let shutdown_rx = shutdown_rx.clone();
            let assignment = &assignment;
            async move {
                let result = self.run_task(assignment, task, turn, shutdown_rx).await;
                (name, result)
            }
        });
        let results = join_all(runs).await;
        heartbeat.abort();

        Ok(CycleOutcome {
            client_id: assignment.client_id,
            cycle: assignment.cycle,
            results,
        })
    }

    /// Runs cycles until shutdown, waiting `reconnect_delay` between them.
    /// `on_cycle` sees every finished cycle.
    ///
    /// # Errors
    ///
    /// Returns non-recoverable errors; coordination and dispatch failures
    /// are logged and the loop continues.
    pub async fn run<F>(&self, mut shutdown_rx: ShutdownReceiver, mut on_cycle: F) -> AppResult<()>
    where
        F: FnMut(&CycleOutcome),
    {
        loop {
            if is_shutdown(&shutdown_rx) {
                return Ok(());
            }
            match self.run_cycle(&shutdown_rx).await {
                Ok(outcome) => on_cycle(&outcome),
                Err(err) if err.is_recoverable() => warn!("Cannot get new tasks: {}", err),
                Err(err) => return Err(err),
            }
            if is_shutdown(&shutdown_rx) {
                return Ok(());
            }
            info!(
                "Waiting {}s to reconnect to coordinator",
                self.settings.reconnect_delay.as_secs()
            );
            tokio::select! {
                () = tokio::time::sleep(self.settings.reconnect_delay) => {}
                () = wait_for_shutdown(&mut shutdown_rx) => return Ok(()),
            }
        }
    }

    async fn run_task(
        &self,
        assignment: &Assignment,
        task: Task,
        turn: ActivationTurn,
        shutdown_rx: ShutdownReceiver,
    ) -> AppResult<ReportSnapshot> {
        let name = task.name.clone();
        let dispatcher = Dispatcher::new(Arc::new(task))?;
        let accumulator = dispatcher.accumulator();
        let run = dispatcher.run_in_turn(turn, shutdown_rx);
        tokio::pin!(run);

        let result = match self.settings.live_report_interval {
            Some(every) => {
                let mut tick = tokio::time::interval(every);
                tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
                tick.tick().await;
                loop {
                    tokio::select! {
                        result = &mut run => break result,
                        _ = tick.tick() => {
                            self.push_live(assignment, &name, &accumulator).await;
                        }
                    }
                }
            }
            None => run.await,
        };

        match result {
            Ok(snapshot) => {
                self.push_final(assignment, &name, &snapshot).await;
                Ok(snapshot)
            }
            Err(err) => {
                error!("Task '{}' aborted: {}", name, err);
                self.push_final(assignment, &name, &accumulator.snapshot(true))
                    .await;
                Err(err)
            }
        }
    }

    /// One attempt; the next tick carries newer totals anyway.
    async fn push_live(
        &self,
        assignment: &Assignment,
        task: &str,
        accumulator: &ReportAccumulator,
    ) {
        let snapshot = accumulator.snapshot(false);
        let report = match payload(assignment, task, &snapshot) {
            Ok(report) => report,
            Err(err) => {
                warn!("Skipping live report for '{}': {}", task, err);
                return;
            }
        };
        match self.link.push_report(&report).await {
            Ok(()) => debug!("Live report {} for '{}' delivered", snapshot.seq, task),
            Err(err) => warn!("Live report for '{}' not delivered: {}", task, err),
        }
    }

    async fn push_final(&self, assignment: &Assignment, task: &str, snapshot: &ReportSnapshot) {
        let report = match payload(assignment, task, snapshot) {
            Ok(report) => report,
            Err(err) => {
                error!("Cannot encode final report for '{}': {}", task, err);
                return;
            }
        };
        match self
            .settings
            .retry
            .run("final report", || self.link.push_report(&report))
            .await
        {
            Ok(()) => info!("Final report for '{}' delivered", task),
            Err(err) => error!("Final report for '{}' lost: {}", task, err),
        }
    }

    fn known_client_id(&self) -> Option<String> {
        self.client_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn payload(assignment: &Assignment, task: &str, snapshot: &ReportSnapshot) -> AppResult<ReportPayload> {
    ReportPayload::from_snapshot(
        &assignment.client_id,
        task,
        assignment.cycle,
        current_time_ms(),
        snapshot,
    )
}

async fn heartbeat_loop<L>(link: Arc<L>, client_id: String, every: Duration)
where
    L: CoordinatorLink,
{
    let mut tick = tokio::time::interval(every);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tick.tick().await;
    loop {
        tick.tick().await;
        if let Err(err) = link.heartbeat(&client_id).await {
            debug!("Heartbeat failed: {}", err);
        }
    }
}

