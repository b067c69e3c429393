//! Server side of distributed mode: client registry, task assignment and
//! report intake.
mod http;
mod registry;
mod server;

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{error, info, warn};

use crate::config::types::TaskConfig;
use crate::config::{COMPATIBLE_VERSIONS, CONFIG_VERSION, ServerSettings, Settings};
use crate::domain::TaskOrder;
use crate::error::{AppResult, CoordinationError, MetricsError};

use super::aggregator::{AggregateParts, ReportAggregator, TaskAggregate};
use super::protocol::{
    ClientStatus, RegisterRequest, RegisterResponse, ReportPayload, StatusResponse, TaskStatus,
};
use super::utils::duration_to_ms;

pub use registry::{ClientRegistration, ClientRegistry, ClientState};
pub use server::{bind_listener, serve};

/// Owns the client registry and the aggregate report state. Both sit behind
/// short-lived locks that are never held across I/O.
#[derive(Debug)]
pub struct Coordinator {
    tasks: Vec<TaskConfig>,
    task_order: TaskOrder,
    state: Mutex<CoordinatorState>,
}

#[derive(Debug)]
struct CoordinatorState {
    registry: ClientRegistry,
    aggregator: ReportAggregator,
}

impl Coordinator {
    #[must_use]
    pub fn new(tasks: Vec<TaskConfig>, task_order: TaskOrder, client_timeout: Duration) -> Self {
        let aggregator = ReportAggregator::new(tasks.iter().map(|task| task.name.trim().to_owned()));
        Self {
            tasks,
            task_order,
            state: Mutex::new(CoordinatorState {
                registry: ClientRegistry::new(client_timeout),
                aggregator,
            }),
        }
    }

    /// Builds a coordinator from validated settings.
    ///
    /// # Errors
    ///
    /// Returns an error when there are no tasks or no server section.
    pub fn from_settings(settings: &Settings) -> AppResult<(Self, ServerSettings)> {
        settings.require_tasks()?;
        let server = settings.server()?.clone();
        Ok((
            Self::new(
                settings.task_configs.clone(),
                server.task_order,
                server.client_timeout,
            ),
            server,
        ))
    }

    /// Registers a client and hands it every task, ordered for that client.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError::IncompatibleVersion`] when the client
    /// speaks an unknown config version.
    pub fn register(
        &self,
        request: &RegisterRequest,
    ) -> Result<RegisterResponse, CoordinationError> {
        if !COMPATIBLE_VERSIONS.contains(&request.version.trim()) {
            return Err(CoordinationError::IncompatibleVersion {
                version: request.version.clone(),
                expected: COMPATIBLE_VERSIONS.join(", "),
            });
        }

        let tasks = assign_tasks(&self.tasks, self.task_order, &mut rand::thread_rng());
        let (client_id, cycle) = {
            let mut state = self.lock();
            let registration =
                state
                    .registry
                    .register(request.client_id.as_deref(), &request.hostname, Instant::now());
            (registration.client_id.clone(), registration.cycle)
        };
        info!(
            "Client '{}' ({}) registered, cycle {}, tasks: {}",
            client_id,
            request.hostname,
            cycle,
            tasks
                .iter()
                .map(|task| task.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(RegisterResponse {
            version: CONFIG_VERSION.to_owned(),
            client_id,
            cycle,
            task_order: self.task_order,
            tasks,
        })
    }

    /// Stores a report and refreshes the sender's liveness. Returns whether
    /// the report advanced the stored state.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown clients or tasks and for reports whose
    /// histogram does not decode.
    pub fn accept_report(&self, report: &ReportPayload) -> Result<bool, CoordinationError> {
        let snapshot = report.to_snapshot()?;
        let mut state = self.lock();
        let revived = state.registry.touch(&report.client_id, Instant::now())?;
        if revived {
            info!("Client '{}' is back online", report.client_id);
        }
        state
            .aggregator
            .apply(&report.client_id, &report.task_name, report.cycle, snapshot)
    }

    /// # Errors
    ///
    /// Returns [`CoordinationError::UnknownClient`] for unregistered ids.
    pub fn heartbeat(&self, client_id: &str) -> Result<(), CoordinationError> {
        let revived = self.lock().registry.touch(client_id, Instant::now())?;
        if revived {
            info!("Client '{}' is back online", client_id);
        }
        Ok(())
    }

    /// Marks silent clients offline and freezes their contributions.
    pub fn sweep(&self) -> Vec<String> {
        self.sweep_at(Instant::now())
    }

    pub(crate) fn sweep_at(&self, now: Instant) -> Vec<String> {
        let mut state = self.lock();
        let offline = state.registry.sweep(now);
        for client_id in &offline {
            match state.aggregator.mark_stale(client_id) {
                Ok(()) => warn!("Client '{}' went offline; keeping its last report", client_id),
                Err(err) => error!(
                    "Client '{}' went offline; cannot keep its report: {}",
                    client_id, err
                ),
            }
        }
        offline
    }

    /// # Errors
    ///
    /// Returns an error if latency histograms cannot be merged.
    pub fn aggregates(&self) -> Result<Vec<TaskAggregate>, MetricsError> {
        let parts = self.lock().aggregator.parts();
        parts.into_iter().map(AggregateParts::merge).collect()
    }

    /// Operator view of clients and per-task totals. Reports are merged
    /// after the lock is released.
    ///
    /// # Errors
    ///
    /// Returns an error if latency histograms cannot be merged.
    pub fn status(&self) -> Result<StatusResponse, MetricsError> {
        let now = Instant::now();
        let (clients, parts) = {
            let state = self.lock();
            let clients = state
                .registry
                .clients()
                .into_iter()
                .map(|client| ClientStatus {
                    client_id: client.client_id.clone(),
                    hostname: client.hostname.clone(),
                    state: client.state,
                    cycle: client.cycle,
                    registered_at: client.registered_at.to_rfc3339(),
                    last_seen_ms_ago: duration_to_ms(
                        now.saturating_duration_since(client.last_seen),
                    ),
                })
                .collect::<Vec<_>>();
            (clients, state.aggregator.parts())
        };

        let tasks = parts
            .into_iter()
            .map(|part| {
                let aggregate = part.merge()?;
                let (p50_ms, p90_ms, p99_ms) = aggregate.totals.latency.percentiles_ms();
                Ok(TaskStatus {
                    success_rate: aggregate.totals.success_rate(),
                    throughput: aggregate.totals.throughput(),
                    mean_ms: aggregate.totals.latency.mean_ms(),
                    p50_ms,
                    p90_ms,
                    p99_ms,
                    counters: aggregate.totals.counters,
                    contributors: aggregate.contributors,
                    stale_contributors: aggregate.stale_contributors,
                    name: aggregate.name,
                })
            })
            .collect::<Result<Vec<_>, MetricsError>>()?;
        Ok(StatusResponse { clients, tasks })
    }

    #[must_use]
    pub fn connected_clients(&self) -> usize {
        self.lock().registry.connected()
    }

    #[must_use]
    pub fn task_names(&self) -> Vec<String> {
        self.tasks.iter().map(|task| task.name.trim().to_owned()).collect()
    }

    fn lock(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Every task exactly once, in the order the policy gives this client.
pub fn assign_tasks<R>(tasks: &[TaskConfig], order: TaskOrder, rng: &mut R) -> Vec<TaskConfig>
where
    R: Rng + ?Sized,
{
    let mut assigned = tasks.to_vec();
    match order {
        TaskOrder::Random => assigned.shuffle(rng),
    }
    assigned
}
