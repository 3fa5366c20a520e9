use std::time::Duration;

use vigil_core::{
    Action, ClientId, Command, DispatchError, Liveness, ProcessState, RunState, Timestamp,
};

use crate::clients::ClientTable;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStateTransition {
    pub client_id: ClientId,
    pub from: RunState,
    pub to: RunState,
}

/// Outcome of a start/stop intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Issued {
        command: Command,
        transition: Option<RunStateTransition>,
    },
    /// Already starting/running (for start) or already stopping (for stop).
    NoOp,
}

/// Turns operator intents into commands and keeps each client's `run_state`
/// estimate in step with what the supervisor reports.
///
/// A command is considered lost when nothing confirms it within
/// `ack_timeout` of being issued: either the supervisor keeps reporting the
/// old process state, or it reports nothing at all. A lost command falls
/// back to the state the last process hint supports, so it can be re-issued.
#[derive(Debug, Clone, Copy)]
pub struct CommandDispatcher {
    ack_timeout: Duration,
}

impl CommandDispatcher {
    #[must_use]
    pub const fn new(ack_timeout: Duration) -> Self {
        Self { ack_timeout }
    }

    pub fn start(
        &self,
        clients: &mut ClientTable,
        client_id: &ClientId,
        now: Timestamp,
    ) -> Result<Dispatch, DispatchError> {
        self.issue(clients, client_id, Action::Start, now)
    }

    pub fn stop(
        &self,
        clients: &mut ClientTable,
        client_id: &ClientId,
        now: Timestamp,
    ) -> Result<Dispatch, DispatchError> {
        self.issue(clients, client_id, Action::Stop, now)
    }

    pub fn issue(
        &self,
        clients: &mut ClientTable,
        client_id: &ClientId,
        action: Action,
        now: Timestamp,
    ) -> Result<Dispatch, DispatchError> {
        let client = clients
            .get_mut(client_id)
            .ok_or_else(|| DispatchError::UnknownClient(client_id.clone()))?;

        let target = match (action, client.run_state) {
            (Action::Start, RunState::Starting | RunState::Running)
            | (Action::Stop, RunState::Stopping) => return Ok(Dispatch::NoOp),
            (Action::Start, _) => RunState::Starting,
            (Action::Stop, _) => RunState::Stopping,
        };

        client.last_command = Some(now);
        let transition = set_run_state(client_id, &mut client.run_state, target);
        Ok(Dispatch::Issued {
            command: Command::new(client_id.clone(), action, now),
            transition,
        })
    }

    /// Applies the process-state hint carried by a heartbeat.
    pub fn on_heartbeat(
        &self,
        clients: &mut ClientTable,
        client_id: &ClientId,
        hint: ProcessState,
        now: Timestamp,
    ) -> Option<RunStateTransition> {
        let client = clients.get_mut(client_id)?;
        client.process_hint = Some(hint);

        let start_lost = client
            .last_command
            .is_some_and(|issued| now.saturating_duration_since(issued) >= self.ack_timeout);

        let target = match (client.run_state, hint) {
            (RunState::Starting | RunState::Stopped, ProcessState::Running) => RunState::Running,
            (RunState::Stopped, ProcessState::Launching) => RunState::Starting,
            (RunState::Running | RunState::Stopping, ProcessState::Idle) => RunState::Stopped,
            (RunState::Starting, ProcessState::Idle) if start_lost => RunState::Stopped,
            _ => return None,
        };
        set_run_state(client_id, &mut client.run_state, target)
    }

    /// Periodic check for commands nothing has confirmed within
    /// `ack_timeout`.
    pub fn expire_unconfirmed(
        &self,
        clients: &mut ClientTable,
        now: Timestamp,
    ) -> Vec<RunStateTransition> {
        clients
            .iter_mut()
            .filter_map(|client| {
                let issued = client.last_command?;
                if now.saturating_duration_since(issued) < self.ack_timeout {
                    return None;
                }
                let target = unconfirmed_fallback(client.run_state, client.process_hint)?;
                set_run_state(&client.client_id, &mut client.run_state, target)
            })
            .collect()
    }

    /// The command issued at `command.issued_time` never reached the client.
    /// Ignored when a newer command has been issued since.
    pub fn on_undelivered(
        &self,
        clients: &mut ClientTable,
        command: &Command,
    ) -> Option<RunStateTransition> {
        let client = clients.get_mut(&command.target)?;
        if client.last_command != Some(command.issued_time) {
            return None;
        }
        client.last_command = None;
        let target = unconfirmed_fallback(client.run_state, client.process_hint)?;
        set_run_state(&client.client_id, &mut client.run_state, target)
    }

    /// Explicit stop acknowledgement or crash report from the supervisor.
    pub fn on_process_ended(
        &self,
        clients: &mut ClientTable,
        client_id: &ClientId,
    ) -> Option<RunStateTransition> {
        let client = clients.get_mut(client_id)?;
        client.process_hint = Some(ProcessState::Idle);
        set_run_state(client_id, &mut client.run_state, RunState::Stopped)
    }

    /// Heartbeat cessation: a client confirmed offline is assumed stopped.
    pub fn on_liveness(
        &self,
        clients: &mut ClientTable,
        client_id: &ClientId,
        liveness: Liveness,
    ) -> Option<RunStateTransition> {
        if liveness != Liveness::Offline {
            return None;
        }
        let client = clients.get_mut(client_id)?;
        client.process_hint = None;
        set_run_state(client_id, &mut client.run_state, RunState::Stopped)
    }
}

/// Where a pending transition lands when its command went unanswered.
const fn unconfirmed_fallback(current: RunState, hint: Option<ProcessState>) -> Option<RunState> {
    match (current, hint) {
        (RunState::Starting, Some(ProcessState::Launching)) => None,
        (RunState::Stopping, Some(ProcessState::Running)) => Some(RunState::Running),
        (RunState::Stopping, Some(ProcessState::Launching)) => Some(RunState::Starting),
        (RunState::Starting | RunState::Stopping, _) => Some(RunState::Stopped),
        (RunState::Stopped | RunState::Running, _) => None,
    }
}

fn set_run_state(
    client_id: &ClientId,
    current: &mut RunState,
    target: RunState,
) -> Option<RunStateTransition> {
    if *current == target {
        return None;
    }
    let transition = RunStateTransition {
        client_id: client_id.clone(),
        from: *current,
        to: target,
    };
    *current = target;
    Some(transition)
}
