use std::sync::Arc;

use clap::{CommandFactory, FromArgMatches};
use tracing::{error, info, warn};

use crate::app::{print_results, run_standalone};
use crate::args::{DreqArgs, RunMode};
use crate::config::{Settings, load_settings};
use crate::distributed::{ClientAgent, Coordinator, HttpCoordinatorLink, bind_listener, serve};
use crate::error::AppResult;
use crate::shutdown::{ShutdownReceiver, request_shutdown, shutdown_channel};
use crate::shutdown_handlers::setup_signal_shutdown_handler;

/// Parses the command line, loads the config and runs the selected mode.
///
/// # Errors
///
/// Returns configuration errors before anything starts, and errors that end
/// the selected mode.
pub fn run() -> AppResult<()> {
    let matches = DreqArgs::command().get_matches();
    let args = DreqArgs::from_arg_matches(&matches)?;

    crate::logger::init_logging(args.verbose, args.no_color);

    let settings = match load_settings(&args.config) {
        Ok(settings) => settings,
        Err(err) => {
            error!("Configuration error: {}", err);
            return Err(err);
        }
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run_async(args, settings))
}

async fn run_async(args: DreqArgs, settings: Settings) -> AppResult<()> {
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let signal_handle = setup_signal_shutdown_handler(&shutdown_tx);

    let result = match args.mode() {
        RunMode::Server => run_server(&settings, shutdown_rx).await,
        RunMode::Client => run_client(&settings, shutdown_rx).await,
        RunMode::Standalone => run_offline(settings, args.no_color, &shutdown_rx).await,
    };

    request_shutdown(&shutdown_tx);
    if let Err(err) = signal_handle.await {
        warn!("Signal handler ended abnormally: {}", err);
    }
    result
}

async fn run_offline(
    settings: Settings,
    no_color: bool,
    shutdown_rx: &ShutdownReceiver,
) -> AppResult<()> {
    settings.require_tasks()?;
    info!("Running in standalone mode");
    let results = run_standalone(settings.tasks, no_color, shutdown_rx).await;
    print_results(&results);
    Ok(())
}

async fn run_server(settings: &Settings, shutdown_rx: ShutdownReceiver) -> AppResult<()> {
    let (coordinator, server) = Coordinator::from_settings(settings)?;
    info!("Running in server mode on port {}", server.port);
    let listener = bind_listener(server.port).await?;
    serve(Arc::new(coordinator), listener, &server, shutdown_rx).await
}

async fn run_client(settings: &Settings, shutdown_rx: ShutdownReceiver) -> AppResult<()> {
    let client = settings.client()?.clone();
    info!("Running in client mode against {}", client.server_url);
    let link = HttpCoordinatorLink::new(client.server_url.clone())?;
    let agent = ClientAgent::new(link, client);
    agent
        .run(shutdown_rx, |outcome| {
            info!(
                "Cycle {} finished as '{}'",
                outcome.cycle, outcome.client_id
            );
            print_results(&outcome.results);
        })
        .await
}
