use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoordinationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientState {
    Connected,
    Offline,
}

#[derive(Debug, Clone)]
pub struct ClientRegistration {
    pub client_id: String,
    pub hostname: String,
    pub state: ClientState,
    pub cycle: u64,
    pub last_seen: Instant,
    pub registered_at: DateTime<Utc>,
}

/// Every client that ever registered during this run, keyed by id.
#[derive(Debug)]
pub struct ClientRegistry {
    clients: HashMap<String, ClientRegistration>,
    timeout: Duration,
    next_anonymous: u64,
}

impl ClientRegistry {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            timeout,
            next_anonymous: 0,
        }
    }

    /// Registers or re-registers a client. A returning client gets the next
    /// cycle number; a client without an id gets a generated one.
    pub fn register(
        &mut self,
        client_id: Option<&str>,
        hostname: &str,
        now: Instant,
    ) -> &ClientRegistration {
        let client_id = match client_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => id.to_owned(),
            None => self.generate_id(hostname),
        };
        let entry = self
            .clients
            .entry(client_id.clone())
            .and_modify(|existing| {
                existing.cycle = existing.cycle.saturating_add(1);
                existing.state = ClientState::Connected;
                existing.last_seen = now;
                hostname.clone_into(&mut existing.hostname);
            })
            .or_insert_with(|| ClientRegistration {
                client_id,
                hostname: hostname.to_owned(),
                state: ClientState::Connected,
                cycle: 1,
                last_seen: now,
                registered_at: Utc::now(),
            });
        &*entry
    }

    /// Records contact from a known client, reviving it if it was offline.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError::UnknownClient`] for an id that never
    /// registered.
    pub fn touch(&mut self, client_id: &str, now: Instant) -> Result<bool, CoordinationError> {
        let registration =
            self.clients
                .get_mut(client_id)
                .ok_or_else(|| CoordinationError::UnknownClient {
                    client_id: client_id.to_owned(),
                })?;
        registration.last_seen = now;
        let revived = registration.state == ClientState::Offline;
        registration.state = ClientState::Connected;
        Ok(revived)
    }

    /// Marks clients silent for longer than the timeout as offline and
    /// returns their ids.
    pub fn sweep(&mut self, now: Instant) -> Vec<String> {
        let timeout = self.timeout;
        self.clients
            .values_mut()
            .filter(|client| {
                client.state == ClientState::Connected
                    && now.saturating_duration_since(client.last_seen) > timeout
            })
            .map(|client| {
                client.state = ClientState::Offline;
                client.client_id.clone()
            })
            .collect()
    }

    #[must_use]
    pub fn get(&self, client_id: &str) -> Option<&ClientRegistration> {
        self.clients.get(client_id)
    }

    /// Clients sorted by id.
    #[must_use]
    pub fn clients(&self) -> Vec<&ClientRegistration> {
        let mut clients: Vec<_> = self.clients.values().collect();
        clients.sort_by(|left, right| left.client_id.cmp(&right.client_id));
        clients
    }

    #[must_use]
    pub fn connected(&self) -> usize {
        self.clients
            .values()
            .filter(|client| client.state == ClientState::Connected)
            .count()
    }

    fn generate_id(&mut self, hostname: &str) -> String {
        loop {
            self.next_anonymous = self.next_anonymous.saturating_add(1);
            let candidate = format!("{}-{}", hostname, self.next_anonymous);
            if !self.clients.contains_key(&candidate) {
                return candidate;
            }
        }
    }
}
