use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::config::ServerSettings;
use crate::distributed::protocol::{
    AckResponse, HEARTBEAT_PATH, HeartbeatRequest, REGISTER_PATH, REPORT_PATH, RegisterRequest,
    ReportPayload, STATUS_PATH,
};
use crate::distributed::utils::resolve_liveness_check_interval;
use crate::error::{AppResult, CoordinationError};
use crate::shutdown::{ShutdownReceiver, wait_for_shutdown};

use super::Coordinator;
use super::http::{
    HttpError, HttpRequest, read_http_request, write_error_response, write_json_response,
};

/// Binds the coordinator port on all interfaces.
///
/// # Errors
///
/// Returns [`CoordinationError::Bind`] when the port is unavailable.
pub async fn bind_listener(port: u16) -> Result<TcpListener, CoordinationError> {
    let addr = format!("0.0.0.0:{}", port);
    TcpListener::bind(&addr)
        .await
        .map_err(|err| CoordinationError::Bind { addr, source: err })
}

/// Serves the coordination API until shutdown, sweeping client liveness and
/// logging aggregate totals in the background.
///
/// # Errors
///
/// Returns an error if accepting connections fails.
pub async fn serve(
    coordinator: Arc<Coordinator>,
    listener: TcpListener,
    settings: &ServerSettings,
    mut shutdown_rx: ShutdownReceiver,
) -> AppResult<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(
            "Coordinator listening on {} with {} task(s)",
            addr,
            coordinator.task_names().len()
        );
    }

    let sweeper = tokio::spawn(sweep_loop(
        Arc::clone(&coordinator),
        resolve_liveness_check_interval(settings.client_timeout),
    ));
    let status_logger = tokio::spawn(status_log_loop(
        Arc::clone(&coordinator),
        settings.status_log_interval,
    ));

    let result = loop {
        tokio::select! {
            () = wait_for_shutdown(&mut shutdown_rx) => break Ok(()),
            accepted = listener.accept() => {
                match accepted {
                    Ok((socket, peer)) => {
                        debug!("Connection from {}", peer);
                        let coordinator = Arc::clone(&coordinator);
                        tokio::spawn(async move {
                            handle_connection(socket, &coordinator).await;
                        });
                    }
                    Err(err) => {
                        break Err(CoordinationError::Io {
                            context: "accept coordinator connection",
                            source: err,
                        });
                    }
                }
            }
        }
    };

    sweeper.abort();
    status_logger.abort();
    log_status(&coordinator);
    info!("Coordinator stopped");
    Ok(result?)
}

async fn sweep_loop(coordinator: Arc<Coordinator>, every: Duration) {
    let mut tick = tokio::time::interval(every);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tick.tick().await;
        coordinator.sweep();
    }
}

async fn status_log_loop(coordinator: Arc<Coordinator>, every: Duration) {
    let mut tick = tokio::time::interval(every);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tick.tick().await;
    loop {
        tick.tick().await;
        log_status(&coordinator);
    }
}

fn log_status(coordinator: &Coordinator) {
    let aggregates = match coordinator.aggregates() {
        Ok(aggregates) => aggregates,
        Err(err) => {
            error!("Failed to aggregate reports: {}", err);
            return;
        }
    };
    info!("{} client(s) connected", coordinator.connected_clients());
    for aggregate in aggregates {
        let totals = &aggregate.totals;
        let (p50, _, p99) = totals.latency.percentiles_ms();
        info!(
            "Task '{}': sent {}, succeeded {}, failed {} ({:.1}% success), p50 {:.1}ms, p99 {:.1}ms, {} report(s), {} stale",
            aggregate.name,
            totals.counters.sent,
            totals.counters.succeeded,
            totals.counters.failed_total(),
            totals.success_rate(),
            p50,
            p99,
            aggregate.contributors,
            aggregate.stale_contributors
        );
    }
}

async fn handle_connection(mut socket: TcpStream, coordinator: &Coordinator) {
    let result = match read_http_request(&mut socket).await {
        Ok(request) => route(&mut socket, coordinator, &request).await,
        Err(err) => Err(err),
    };
    if let Err(err) = result {
        debug!("Request rejected with {}: {}", err.status, err.message);
        if write_error_response(&mut socket, err.status, &err.message)
            .await
            .is_err()
        {
            // Peer went away before the error could be written.
        }
    }
}

async fn route(
    socket: &mut TcpStream,
    coordinator: &Coordinator,
    request: &HttpRequest,
) -> Result<(), HttpError> {
    let written = match (request.method.as_str(), request.path.as_str()) {
        ("POST", REGISTER_PATH) => {
            let body: RegisterRequest = parse_body(&request.body, "register request")?;
            let response = coordinator.register(&body)?;
            write_json_response(socket, 200, &response).await
        }
        ("POST", REPORT_PATH) => {
            let body: ReportPayload = parse_body(&request.body, "report")?;
            coordinator.accept_report(&body)?;
            write_json_response(socket, 200, &AckResponse::ok()).await
        }
        ("POST", HEARTBEAT_PATH) => {
            let body: HeartbeatRequest = parse_body(&request.body, "heartbeat")?;
            coordinator.heartbeat(&body.client_id)?;
            write_json_response(socket, 200, &AckResponse::ok()).await
        }
        ("GET", STATUS_PATH) => {
            let status = coordinator
                .status()
                .map_err(|err| HttpError::new(500, err.to_string()))?;
            write_json_response(socket, 200, &status).await
        }
        (_, REGISTER_PATH | REPORT_PATH | HEARTBEAT_PATH | STATUS_PATH) => {
            return Err(HttpError::new(405, "Method not allowed"));
        }
        _ => return Err(HttpError::new(404, "Not found")),
    };
    if let Err(err) = written {
        debug!("Failed to write response: {}", err);
    }
    Ok(())
}

fn parse_body<T>(body: &[u8], context: &'static str) -> Result<T, HttpError>
where
    T: DeserializeOwned,
{
    serde_json::from_slice(body)
        .map_err(|err| HttpError::from(CoordinationError::Deserialize { context, source: err }))
}
