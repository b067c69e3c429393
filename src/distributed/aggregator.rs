use std::collections::BTreeMap;

use crate::error::{CoordinationError, MetricsError};
use crate::metrics::{ReportSnapshot, ReportTotals};

/// Per-task totals built from cumulative reports.
///
/// While a (client, cycle) run is live only its highest-`seq` report is
/// held, so duplicate and reordered deliveries are harmless. Once the run
/// is over, either through its final report or because the client went
/// offline, its report is folded into the task's baseline totals and
/// dropped. Memory stays bounded by the number of live runs.
#[derive(Debug, Default)]
pub struct ReportAggregator {
    tasks: BTreeMap<String, TaskReports>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ContributionKey {
    client_id: String,
    cycle: u64,
}

#[derive(Debug, Clone, Default)]
struct TaskReports {
    baseline: Option<ReportTotals>,
    live: BTreeMap<ContributionKey, ReportSnapshot>,
    /// Highest folded cycle per client; reports up to it are ignored.
    folded_through: BTreeMap<String, u64>,
    finished: usize,
    stale: usize,
}

/// Copy of one task's aggregation state, cheap to take under a lock and
/// merged afterwards.
#[derive(Debug, Clone)]
pub struct AggregateParts {
    name: String,
    baseline: Option<ReportTotals>,
    live: Vec<ReportSnapshot>,
    finished: usize,
    stale: usize,
}

/// Merged totals for one task plus how many reports fed them.
#[derive(Debug, Clone)]
pub struct TaskAggregate {
    pub name: String,
    pub totals: ReportTotals,
    pub contributors: usize,
    pub stale_contributors: usize,
}

impl ReportAggregator {
    pub fn new<I, S>(task_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tasks: task_names
                .into_iter()
                .map(|name| (name.into(), TaskReports::default()))
                .collect(),
        }
    }

    /// Keeps `snapshot` if it is newer than what is held for the key. A
    /// final report is folded into the baseline right away. Returns whether
    /// the report was used.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError::UnknownTask`] for a task that is not
    /// part of this run, and [`CoordinationError::Merge`] when the report
    /// cannot be folded.
    pub fn apply(
        &mut self,
        client_id: &str,
        task: &str,
        cycle: u64,
        snapshot: ReportSnapshot,
    ) -> Result<bool, CoordinationError> {
        let reports = self
            .tasks
            .get_mut(task)
            .ok_or_else(|| CoordinationError::UnknownTask {
                client_id: client_id.to_owned(),
                task: task.to_owned(),
            })?;
        if reports
            .folded_through
            .get(client_id)
            .is_some_and(|folded| cycle <= *folded)
        {
            return Ok(false);
        }
        let key = ContributionKey {
            client_id: client_id.to_owned(),
            cycle,
        };
        if reports
            .live
            .get(&key)
            .is_some_and(|held| held.seq >= snapshot.seq)
        {
            return Ok(false);
        }

        let final_report = snapshot.final_report;
        reports.live.insert(key, snapshot);
        if final_report {
            reports
                .retire(client_id, cycle)
                .map_err(|source| CoordinationError::Merge {
                    task: task.to_owned(),
                    source,
                })?;
        }
        Ok(true)
    }

    /// Folds every live report of a client that went offline into the
    /// baseline, where it counts as stale.
    ///
    /// # Errors
    ///
    /// Returns an error if latency histograms cannot be merged.
    pub fn mark_stale(&mut self, client_id: &str) -> Result<(), MetricsError> {
        for reports in self.tasks.values_mut() {
            let latest = reports
                .live
                .keys()
                .filter(|key| key.client_id == client_id)
                .map(|key| key.cycle)
                .max();
            if let Some(cycle) = latest {
                reports.retire(client_id, cycle)?;
            }
        }
        Ok(())
    }

    /// Copies of every task's state in task-name order.
    #[must_use]
    pub fn parts(&self) -> Vec<AggregateParts> {
        self.tasks
            .iter()
            .map(|(name, reports)| reports.parts(name))
            .collect()
    }

    /// Totals per task in task-name order.
    ///
    /// # Errors
    ///
    /// Returns an error if latency histograms cannot be merged.
    pub fn aggregates(&self) -> Result<Vec<TaskAggregate>, MetricsError> {
        self.parts().into_iter().map(AggregateParts::merge).collect()
    }

    /// Totals for one task, if it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if latency histograms cannot be merged.
    pub fn totals(&self, task: &str) -> Result<Option<ReportTotals>, MetricsError> {
        self.tasks
            .get(task)
            .map(|reports| reports.parts(task).merge().map(|aggregate| aggregate.totals))
            .transpose()
    }

    /// Reports still held individually, across all tasks.
    #[must_use]
    pub fn live_reports(&self) -> usize {
        self.tasks.values().map(|reports| reports.live.len()).sum()
    }
}

impl TaskReports {
    /// Folds the client's live reports up to `cycle` into the baseline.
    /// Older cycles without a final report count as stale.
    fn retire(&mut self, client_id: &str, cycle: u64) -> Result<(), MetricsError> {
        let range = ContributionKey {
            client_id: client_id.to_owned(),
            cycle: 0,
        }..=ContributionKey {
            client_id: client_id.to_owned(),
            cycle,
        };
        let keys: Vec<ContributionKey> =
            self.live.range(range).map(|(key, _)| key.clone()).collect();
        for key in keys {
            if let Some(snapshot) = self.live.get(&key) {
                if self.baseline.is_none() {
                    self.baseline = Some(ReportTotals::new()?);
                }
                if let Some(baseline) = self.baseline.as_mut() {
                    baseline.merge_snapshot(snapshot)?;
                }
                if snapshot.final_report {
                    self.finished = self.finished.saturating_add(1);
                } else {
                    self.stale = self.stale.saturating_add(1);
                }
                self.live.remove(&key);
            }
        }
        let folded = self
            .folded_through
            .entry(client_id.to_owned())
            .or_insert(cycle);
        *folded = (*folded).max(cycle);
        Ok(())
    }

    fn parts(&self, name: &str) -> AggregateParts {
        AggregateParts {
            name: name.to_owned(),
            baseline: self.baseline.clone(),
            live: self.live.values().cloned().collect(),
            finished: self.finished,
            stale: self.stale,
        }
    }
}

impl AggregateParts {
    /// # Errors
    ///
    /// Returns an error if latency histograms cannot be merged.
    pub fn merge(self) -> Result<TaskAggregate, MetricsError> {
        let mut totals = match self.baseline {
            Some(baseline) => baseline,
            None => ReportTotals::new()?,
        };
        for snapshot in &self.live {
            totals.merge_snapshot(snapshot)?;
        }
        Ok(TaskAggregate {
            name: self.name,
            totals,
            contributors: self
                .finished
                .saturating_add(self.stale)
                .saturating_add(self.live.len()),
            stale_contributors: self.stale,
        })
    }
}
