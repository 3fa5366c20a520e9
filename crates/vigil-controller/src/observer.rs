use std::net::SocketAddr;

use tokio::sync::broadcast;
use vigil_core::{
    Action, ClientId, ClosedRecord, CounterSnapshot, Decision, Liveness, PeerRole, RecordId,
    RunState, Timestamp,
};

use crate::correlation::DropReason;

/// State changes published by the controller. Dashboards and alerting
/// subscribe to these; nothing downstream can mutate controller state.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    RecordOpened {
        id: RecordId,
        trigger_time: Timestamp,
        deadline: Timestamp,
    },
    RecordClosed(ClosedRecord),
    ResultAccepted {
        record: RecordId,
        client_id: ClientId,
    },
    ResultDropped {
        client_id: ClientId,
        reason: ResultDropKind,
    },
    DuplicateTrigger {
        id: RecordId,
    },
    LivenessChanged {
        client_id: ClientId,
        from: Liveness,
        to: Liveness,
    },
    RunStateChanged {
        client_id: ClientId,
        from: RunState,
        to: RunState,
    },
    CommandIssued {
        client_id: ClientId,
        action: Action,
        delivered: bool,
    },
    ClientCrashed {
        client_id: ClientId,
        reason: String,
    },
    ClientConnected {
        client_id: ClientId,
        role: PeerRole,
        addr: SocketAddr,
    },
    ClientDisconnected {
        client_id: ClientId,
        role: PeerRole,
    },
    Telemetry {
        client_id: ClientId,
        kind: String,
        bytes: usize,
    },
    StoreDegraded {
        record: RecordId,
        attempts: u32,
    },
    StoreRecovered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultDropKind {
    Duplicate(RecordId),
    Unattributable(DropReason),
    UnknownClient,
    /// Confidence outside `0.0..=1.0` or not a number.
    Malformed,
}

/// Running totals since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub triggers: u64,
    pub duplicate_triggers: u64,
    pub decided_pass: u64,
    pub decided_eject: u64,
    pub expired_eject: u64,
    pub results_accepted: u64,
    pub results_duplicate: u64,
    pub results_unattributable: u64,
    pub results_late: u64,
    pub results_malformed: u64,
    pub unknown_client_messages: u64,
}

impl Counters {
    pub fn record_closed(&mut self, record: &ClosedRecord) {
        match (record.is_timeout(), record.decision) {
            (true, _) => self.expired_eject += 1,
            (false, Decision::Pass) => self.decided_pass += 1,
            (false, Decision::Eject) => self.decided_eject += 1,
        }
    }

    #[must_use]
    pub const fn snapshot(&self, store_failures: u64) -> CounterSnapshot {
        CounterSnapshot {
            triggers: self.triggers,
            duplicate_triggers: self.duplicate_triggers,
            decided_pass: self.decided_pass,
            decided_eject: self.decided_eject,
            expired_eject: self.expired_eject,
            results_accepted: self.results_accepted,
            results_duplicate: self.results_duplicate,
            results_unattributable: self.results_unattributable,
            results_late: self.results_late,
            results_malformed: self.results_malformed,
            unknown_client_messages: self.unknown_client_messages,
            store_failures,
        }
    }
}

/// Fan-out of controller events. Publishing never blocks; slow subscribers
/// lose the oldest events.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ControllerEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: ControllerEvent) {
        let _ = self.tx.send(event);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Logs every event until the bus closes or shutdown is signalled.
pub async fn log_events(
    mut events: broadcast::Receiver<ControllerEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => log_event(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event logger lagged behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = shutdown_rx.recv() => break,
        }
    }
}

fn log_event(event: &ControllerEvent) {
    match event {
        ControllerEvent::RecordOpened {
            id,
            trigger_time,
            deadline,
        } => tracing::debug!(record = %id, %trigger_time, %deadline, "Record opened"),
        ControllerEvent::RecordClosed(record) => tracing::info!(
            record = %record.id,
            state = %record.state,
            decision = %record.decision,
            results = record.results.len(),
            expected = record.expected_clients.len(),
            closed_time = %record.closed_time,
            "Record closed"
        ),
        ControllerEvent::ResultAccepted { record, client_id } => {
            tracing::debug!(record = %record, %client_id, "Result accepted");
        }
        ControllerEvent::ResultDropped { client_id, reason } => {
            tracing::warn!(%client_id, ?reason, "Result dropped");
        }
        ControllerEvent::DuplicateTrigger { id } => {
            tracing::warn!(record = %id, "Duplicate trigger rejected");
        }
        ControllerEvent::LivenessChanged {
            client_id,
            from,
            to,
        } => match to {
            Liveness::Online => tracing::info!(%client_id, %from, %to, "Client liveness changed"),
            Liveness::Stale | Liveness::Offline => {
                tracing::warn!(%client_id, %from, %to, "Client liveness changed");
            }
        },
        ControllerEvent::RunStateChanged {
            client_id,
            from,
            to,
        } => tracing::info!(%client_id, %from, %to, "Client run state changed"),
        ControllerEvent::CommandIssued {
            client_id,
            action,
            delivered,
        } => tracing::info!(%client_id, %action, delivered, "Command issued"),
        ControllerEvent::ClientCrashed { client_id, reason } => {
            tracing::error!(%client_id, %reason, "Inference process crashed");
        }
        ControllerEvent::ClientConnected {
            client_id,
            role,
            addr,
        } => tracing::info!(%client_id, %role, %addr, "Client connected"),
        ControllerEvent::ClientDisconnected { client_id, role } => {
            tracing::warn!(%client_id, %role, "Client disconnected");
        }
        ControllerEvent::Telemetry {
            client_id,
            kind,
            bytes,
        } => tracing::trace!(%client_id, %kind, bytes, "Telemetry"),
        ControllerEvent::StoreDegraded { record, attempts } => {
            tracing::error!(record = %record, attempts, "Record store degraded");
        }
        ControllerEvent::StoreRecovered => tracing::info!("Record store recovered"),
    }
}
