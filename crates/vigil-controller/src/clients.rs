use std::collections::BTreeMap;
use std::net::SocketAddr;

use vigil_core::{
    ClientId, ClientStatus, Liveness, ProcessState, RunState, SupervisorHealth, Timestamp,
};

use crate::config::ExpectedClient;

/// Controller-side view of one edge node.
#[derive(Debug, Clone)]
pub struct ClientState {
    pub client_id: ClientId,
    pub address: SocketAddr,
    pub last_heartbeat: Option<Timestamp>,
    pub liveness: Liveness,
    pub run_state: RunState,
    /// Time of the last start/stop command issued to this client.
    pub last_command: Option<Timestamp>,
    pub process_hint: Option<ProcessState>,
    pub health: Option<SupervisorHealth>,
    pub connected: bool,
}

impl ClientState {
    #[must_use]
    pub fn new(client_id: ClientId, address: SocketAddr) -> Self {
        Self {
            client_id,
            address,
            last_heartbeat: None,
            liveness: Liveness::Offline,
            run_state: RunState::Stopped,
            last_command: None,
            process_hint: None,
            health: None,
            connected: false,
        }
    }

    #[must_use]
    pub fn status(&self, now: Timestamp) -> ClientStatus {
        ClientStatus {
            client_id: self.client_id.clone(),
            liveness: self.liveness,
            run_state: self.run_state,
            heartbeat_age_ms: self
                .last_heartbeat
                .map(|t| u64::try_from(now.saturating_duration_since(t).as_millis()).unwrap_or(u64::MAX)),
            process_state: self.process_hint,
            connected: self.connected,
        }
    }
}

/// Arena of client states keyed by id. The set of clients is fixed at
/// startup; messages from ids outside it are not admitted.
#[derive(Debug, Default)]
pub struct ClientTable {
    clients: BTreeMap<ClientId, ClientState>,
}

impl ClientTable {
    #[must_use]
    pub fn new(expected: &[ExpectedClient]) -> Self {
        let clients = expected
            .iter()
            .map(|c| (c.id.clone(), ClientState::new(c.id.clone(), c.address)))
            .collect();
        Self { clients }
    }

    #[must_use]
    pub fn get(&self, id: &ClientId) -> Option<&ClientState> {
        self.clients.get(id)
    }

    pub fn get_mut(&mut self, id: &ClientId) -> Option<&mut ClientState> {
        self.clients.get_mut(id)
    }

    #[must_use]
    pub fn contains(&self, id: &ClientId) -> bool {
        self.clients.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &ClientId> {
        self.clients.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClientState> {
        self.clients.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ClientState> {
        self.clients.values_mut()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    #[must_use]
    pub fn statuses(&self, now: Timestamp) -> Vec<ClientStatus> {
        self.clients.values().map(|c| c.status(now)).collect()
    }
}
