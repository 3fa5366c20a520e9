use std::net::SocketAddr;

use vigil_core::{
    Action, ClientId, ClosedRecord, Command, Decision, DispatchError, InspectionResult, Liveness,
    PeerRole, ProcessState, RecordId, RecordState, ResultPayload, StatusSnapshot,
    SupervisorHealth, Timestamp, TrackerError, TriggerPayload,
};

use crate::clients::ClientTable;
use crate::config::ControllerConfig;
use crate::correlation::{Attribution, CorrelationPolicy, DropReason, OldestOpenFirst};
use crate::decision::{ConfidenceThresholds, decide_complete, decide_timeout};
use crate::dispatcher::{CommandDispatcher, Dispatch, RunStateTransition};
use crate::liveness::{LivenessMonitor, LivenessTransition};
use crate::observer::{ControllerEvent, Counters, ResultDropKind};
use crate::store::StoreHealth;
use crate::tracker::{BottleTracker, InsertOutcome};

/// Side effects produced while handling one input. The caller routes
/// commands, persists closed records and publishes events.
#[derive(Debug, Default)]
pub struct Effects {
    pub commands: Vec<Command>,
    pub closed: Vec<ClosedRecord>,
    pub events: Vec<ControllerEvent>,
}

impl Effects {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.closed.is_empty() && self.events.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultOutcome {
    Accepted {
        record: RecordId,
        /// Set when this result completed the record.
        decided: Option<Decision>,
    },
    Dropped(ResultDropKind),
}

/// Single-threaded core of the controller.
///
/// Every method takes the current time explicitly and never blocks or
/// sleeps, so the whole decision pipeline can be driven from tests with
/// hand-picked timestamps. The caller must run [`expire_due`] with the same
/// `now` before any other input, which gives the deadline precedence over a
/// result arriving at the same instant.
///
/// [`expire_due`]: ControllerEngine::expire_due
#[derive(Debug)]
pub struct ControllerEngine {
    tracker: BottleTracker,
    clients: ClientTable,
    correlation: Box<dyn CorrelationPolicy>,
    dispatcher: CommandDispatcher,
    liveness: LivenessMonitor,
    thresholds: ConfidenceThresholds,
    counters: Counters,
    effects: Effects,
}

impl ControllerEngine {
    #[must_use]
    pub fn new(config: &ControllerConfig) -> Self {
        Self::with_correlation(config, Box::new(OldestOpenFirst))
    }

    #[must_use]
    pub fn with_correlation(
        config: &ControllerConfig,
        correlation: Box<dyn CorrelationPolicy>,
    ) -> Self {
        Self {
            tracker: BottleTracker::new(
                config.geometry,
                config.client_ids(),
                config.closed_history,
            ),
            clients: ClientTable::new(&config.clients),
            correlation,
            dispatcher: CommandDispatcher::new(config.liveness.offline),
            liveness: LivenessMonitor::new(config.liveness),
            thresholds: config.thresholds.clone(),
            counters: Counters::default(),
            effects: Effects::default(),
        }
    }

    pub fn take_effects(&mut self) -> Effects {
        std::mem::take(&mut self.effects)
    }

    #[must_use]
    pub const fn tracker(&self) -> &BottleTracker {
        &self.tracker
    }

    #[must_use]
    pub const fn clients(&self) -> &ClientTable {
        &self.clients
    }

    #[must_use]
    pub const fn counters(&self) -> &Counters {
        &self.counters
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.tracker.next_deadline()
    }

    /// Opens a record. A missing trigger time is stamped with `now`.
    pub fn on_trigger(
        &mut self,
        trigger: TriggerPayload,
        now: Timestamp,
    ) -> Result<(RecordId, Timestamp), TrackerError> {
        let trigger_time = trigger.trigger_time.unwrap_or(now);
        match self.tracker.open(trigger_time, trigger.record_id) {
            Ok(record) => {
                let (id, deadline) = (record.id(), record.deadline());
                self.counters.triggers += 1;
                self.effects.events.push(ControllerEvent::RecordOpened {
                    id,
                    trigger_time,
                    deadline,
                });
                Ok((id, deadline))
            }
            Err(e) => {
                if let TrackerError::DuplicateTrigger(id) = e {
                    self.counters.duplicate_triggers += 1;
                    self.effects
                        .events
                        .push(ControllerEvent::DuplicateTrigger { id });
                }
                Err(e)
            }
        }
    }

    /// Attributes a result and closes the record if it is now complete.
    /// Dropped results never mutate any record.
    pub fn on_result(
        &mut self,
        client_id: &ClientId,
        payload: ResultPayload,
        now: Timestamp,
    ) -> ResultOutcome {
        if !self.clients.contains(client_id) {
            self.counters.unknown_client_messages += 1;
            return self.drop_result(client_id, ResultDropKind::UnknownClient);
        }
        if !(0.0..=1.0).contains(&payload.confidence) {
            self.counters.results_malformed += 1;
            return self.drop_result(client_id, ResultDropKind::Malformed);
        }

        let mut result = InspectionResult::new(
            client_id.clone(),
            payload.classification,
            payload.confidence,
            now,
        );
        result.captured_time = payload.captured_time;
        result.record_ref = payload.record_ref;

        let attribution = {
            let open = self.tracker.open_records();
            self.correlation.attribute(&result, &open)
        };

        let id = match attribution {
            Attribution::Record(id) => id,
            Attribution::Duplicate(id) => {
                self.counters.results_duplicate += 1;
                return self.drop_result(client_id, ResultDropKind::Duplicate(id));
            }
            Attribution::Unattributable(reason) => {
                return self.drop_unattributable(client_id, reason);
            }
        };

        let Some(record) = self.tracker.get_mut(id) else {
            return self.drop_unattributable(client_id, DropReason::UnknownRecord(id));
        };

        match record.insert_result(result) {
            InsertOutcome::Accepted => {}
            InsertOutcome::Duplicate => {
                self.counters.results_duplicate += 1;
                return self.drop_result(client_id, ResultDropKind::Duplicate(id));
            }
            InsertOutcome::NotExpected => {
                return self.drop_unattributable(client_id, DropReason::NotExpected(id));
            }
            InsertOutcome::Closed => {
                return self.drop_unattributable(client_id, DropReason::AlreadyClosed(id));
            }
        }

        self.counters.results_accepted += 1;
        self.effects.events.push(ControllerEvent::ResultAccepted {
            record: id,
            client_id: client_id.clone(),
        });

        let decided = if record.is_complete() {
            let decision = decide_complete(record.results(), &self.thresholds);
            self.finish(id, RecordState::Decided, decision, now);
            Some(decision)
        } else {
            None
        };

        ResultOutcome::Accepted {
            record: id,
            decided,
        }
    }

    /// Closes every open record whose deadline is at or before `now` with
    /// the fail-safe decision.
    pub fn expire_due(&mut self, now: Timestamp) -> usize {
        let due = self.tracker.take_due(now);
        let count = due.len();
        for id in due {
            self.finish(id, RecordState::Expired, decide_timeout(), now);
        }
        count
    }

    pub fn on_heartbeat(
        &mut self,
        client_id: &ClientId,
        process_state: ProcessState,
        health: SupervisorHealth,
        now: Timestamp,
    ) {
        let Some(client) = self.clients.get_mut(client_id) else {
            self.counters.unknown_client_messages += 1;
            tracing::debug!(%client_id, "Heartbeat from unknown client ignored");
            return;
        };
        client.health = Some(health);

        if let Some(t) = self.liveness.on_heartbeat(&mut self.clients, client_id, now) {
            self.push_liveness(t);
        }
        if let Some(t) = self
            .dispatcher
            .on_heartbeat(&mut self.clients, client_id, process_state, now)
        {
            self.push_run_state(t);
        }
    }

    pub fn on_crashed(&mut self, client_id: &ClientId, reason: String) {
        if !self.known(client_id) {
            return;
        }
        self.effects.events.push(ControllerEvent::ClientCrashed {
            client_id: client_id.clone(),
            reason,
        });
        if let Some(t) = self.dispatcher.on_process_ended(&mut self.clients, client_id) {
            self.push_run_state(t);
        }
    }

    pub fn on_stopped(&mut self, client_id: &ClientId) {
        if !self.known(client_id) {
            return;
        }
        if let Some(t) = self.dispatcher.on_process_ended(&mut self.clients, client_id) {
            self.push_run_state(t);
        }
    }

    pub fn on_telemetry(&mut self, client_id: &ClientId, kind: String, bytes: usize) {
        self.effects.events.push(ControllerEvent::Telemetry {
            client_id: client_id.clone(),
            kind,
            bytes,
        });
    }

    pub fn on_connected(&mut self, client_id: &ClientId, role: PeerRole, addr: SocketAddr) {
        if role == PeerRole::Supervisor
            && let Some(client) = self.clients.get_mut(client_id)
        {
            client.connected = true;
        }
        self.effects.events.push(ControllerEvent::ClientConnected {
            client_id: client_id.clone(),
            role,
            addr,
        });
    }

    pub fn on_disconnected(&mut self, client_id: &ClientId, role: PeerRole) {
        if role == PeerRole::Supervisor
            && let Some(client) = self.clients.get_mut(client_id)
        {
            client.connected = false;
        }
        self.effects.events.push(ControllerEvent::ClientDisconnected {
            client_id: client_id.clone(),
            role,
        });
    }

    /// Issues a start or stop. Commands are delivered by the caller.
    pub fn command(
        &mut self,
        client_id: &ClientId,
        action: Action,
        now: Timestamp,
    ) -> Result<Dispatch, DispatchError> {
        let dispatch = self
            .dispatcher
            .issue(&mut self.clients, client_id, action, now)?;
        if let Dispatch::Issued {
            command,
            transition,
        } = &dispatch
        {
            self.effects.commands.push(command.clone());
            if let Some(t) = transition.clone() {
                self.push_run_state(t);
            }
        }
        Ok(dispatch)
    }

    /// Applies `action` to every expected client. Returns the clients a
    /// command went to and those skipped as no-ops.
    pub fn command_all(&mut self, action: Action, now: Timestamp) -> (Vec<ClientId>, Vec<ClientId>) {
        let ids: Vec<ClientId> = self.clients.ids().cloned().collect();
        let mut issued = Vec::new();
        let mut skipped = Vec::new();
        for id in ids {
            match self.command(&id, action, now) {
                Ok(Dispatch::Issued { .. }) => issued.push(id),
                Ok(Dispatch::NoOp) | Err(_) => skipped.push(id),
            }
        }
        (issued, skipped)
    }

    /// Periodic liveness recomputation. Clients that go offline are assumed
    /// stopped, and commands still unconfirmed after the ack timeout are
    /// given up on.
    pub fn sweep(&mut self, now: Timestamp) {
        for t in self.liveness.sweep(&mut self.clients, now) {
            if t.to == Liveness::Offline
                && let Some(rt) = self
                    .dispatcher
                    .on_liveness(&mut self.clients, &t.client_id, t.to)
            {
                self.push_run_state(rt);
            }
            self.push_liveness(t);
        }
        for t in self.dispatcher.expire_unconfirmed(&mut self.clients, now) {
            tracing::warn!(
                client_id = %t.client_id,
                from = %t.from,
                to = %t.to,
                "Command unconfirmed within ack timeout"
            );
            self.push_run_state(t);
        }
    }

    /// The router had no connection for `command.target`.
    pub fn on_undelivered(&mut self, command: &Command) {
        if let Some(t) = self.dispatcher.on_undelivered(&mut self.clients, command) {
            self.push_run_state(t);
        }
    }

    #[must_use]
    pub fn snapshot(&self, now: Timestamp, store: &StoreHealth) -> StatusSnapshot {
        StatusSnapshot {
            taken_at: now,
            clients: self.clients.statuses(now),
            open_records: self.tracker.open_count(),
            counters: self.counters.snapshot(store.failures()),
            store_degraded: store.is_degraded(),
        }
    }

    /// Shutdown path: open records are dropped without a decision.
    pub fn abandon_open(&mut self) -> Vec<RecordId> {
        self.tracker.abandon_open()
    }

    fn finish(&mut self, id: RecordId, state: RecordState, decision: Decision, now: Timestamp) {
        match self.tracker.close(id, state, decision, now) {
            Ok(closed) => {
                self.counters.record_closed(&closed);
                self.effects
                    .events
                    .push(ControllerEvent::RecordClosed(closed.clone()));
                self.effects.closed.push(closed);
            }
            Err(e) => tracing::error!(record = %id, error = %e, "Failed to close record"),
        }
    }

    fn drop_result(&mut self, client_id: &ClientId, reason: ResultDropKind) -> ResultOutcome {
        self.effects.events.push(ControllerEvent::ResultDropped {
            client_id: client_id.clone(),
            reason,
        });
        ResultOutcome::Dropped(reason)
    }

    /// Results for a record that closed within the tracker's history window
    /// are counted as late rather than unattributable.
    fn drop_unattributable(&mut self, client_id: &ClientId, reason: DropReason) -> ResultOutcome {
        let reason = match reason {
            DropReason::UnknownRecord(id) if self.tracker.was_recently_closed(id) => {
                DropReason::AlreadyClosed(id)
            }
            other => other,
        };
        if matches!(reason, DropReason::AlreadyClosed(_)) {
            self.counters.results_late += 1;
        } else {
            self.counters.results_unattributable += 1;
        }
        self.drop_result(client_id, ResultDropKind::Unattributable(reason))
    }

    fn known(&mut self, client_id: &ClientId) -> bool {
        if self.clients.contains(client_id) {
            return true;
        }
        self.counters.unknown_client_messages += 1;
        tracing::debug!(%client_id, "Message from unknown client ignored");
        false
    }

    fn push_liveness(&mut self, t: LivenessTransition) {
        self.effects.events.push(ControllerEvent::LivenessChanged {
            client_id: t.client_id,
            from: t.from,
            to: t.to,
        });
    }

    fn push_run_state(&mut self, t: RunStateTransition) {
        self.effects.events.push(ControllerEvent::RunStateChanged {
            client_id: t.client_id,
            from: t.from,
            to: t.to,
        });
    }
}
