use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{error, info, warn};

use crate::domain::Task;
use crate::error::AppResult;
use crate::http::{ActivationTurn, Dispatcher};
use crate::metrics::ReportSnapshot;
use crate::shutdown::{ShutdownReceiver, request_shutdown, shutdown_channel};

use super::progress::spawn_live_display;

/// Name of a task and how its run ended.
pub type TaskResult = (String, AppResult<ReportSnapshot>);

/// Runs the tasks on this machine in configuration order. Each task is
/// activated when the previous one's window closes; one failing task does not
/// stop the others.
pub async fn run_standalone(
    tasks: Vec<Task>,
    no_color: bool,
    shutdown_rx: &ShutdownReceiver,
) -> Vec<TaskResult> {
    info!("Running {} task(s) locally", tasks.len());

    let turns = ActivationTurn::in_order(tasks.iter().map(|task| &task.policy.schedule));
    let prepared: Vec<(String, AppResult<Dispatcher>)> = tasks
        .into_iter()
        .map(|task| {
            let name = task.name.clone();
            (name, Dispatcher::new(Arc::new(task)))
        })
        .collect();

    let panels = prepared
        .iter()
        .filter_map(|(name, dispatcher)| {
            dispatcher
                .as_ref()
                .ok()
                .map(|dispatcher| (name.clone(), dispatcher.accumulator()))
        })
        .collect();
    let (display_tx, display_rx) = shutdown_channel();
    let display = spawn_live_display(panels, no_color, display_rx);

    let runs = prepared.into_iter().zip(turns).map(|((name, dispatcher), turn)| {
        let shutdown_rx = shutdown_rx.clone();
        async move {
            let result = match dispatcher {
                Ok(dispatcher) => dispatcher.run_in_turn(turn, shutdown_rx).await,
                Err(err) => Err(err),
            };
            if let Err(err) = &result {
                error!("Task '{}' failed: {}", name, err);
            }
            (name, result)
        }
    });
    let results = join_all(runs).await;

    request_shutdown(&display_tx);
    if let Err(err) = display.await {
        warn!("Live display ended abnormally: {}", err);
    }
    info!("All tasks completed");
    results
}
