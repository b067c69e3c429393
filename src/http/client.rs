use std::net::SocketAddr;
use std::time::Duration;

use reqwest::{Client, redirect};

use crate::domain::Task;
use crate::error::DispatchError;

pub const DEFAULT_USER_AGENT: &str = concat!("dreq/", env!("CARGO_PKG_VERSION"));

/// One client per dispatcher, shared by all of its workers.
///
/// With `reuse_connections` off no connection is returned to the pool, so
/// every request opens a fresh connection and repeats any TLS handshake.
///
/// # Errors
///
/// Returns [`DispatchError::BuildClientFailed`] when the TLS backend or
/// resolver cannot be initialised.
pub fn build_client(task: &Task) -> Result<Client, DispatchError> {
    let timeouts = &task.policy.timeouts;
    let mut client_builder = Client::builder()
        .user_agent(DEFAULT_USER_AGENT)
        .connect_timeout(timeouts.connect)
        .read_timeout(timeouts.read)
        .timeout(timeouts.total())
        .redirect(redirect::Policy::none());

    if task.policy.reuse_connections {
        client_builder = client_builder.pool_max_idle_per_host(task.coroutines());
    } else {
        client_builder = client_builder
            .pool_max_idle_per_host(0)
            .pool_idle_timeout(Some(Duration::from_secs(0)));
    }

    for (host, ip) in &task.prefabs.override_hosts {
        client_builder = client_builder.resolve(host, SocketAddr::new(*ip, 0));
    }

    client_builder
        .build()
        .map_err(|err| DispatchError::BuildClientFailed {
            task: task.name.clone(),
            source: err,
        })
}
