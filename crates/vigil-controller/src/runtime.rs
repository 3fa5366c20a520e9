use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use vigil_core::{
    Action, ClientId, ControllerError, EdgeMessage, OperatorRequest, OperatorResponse, Outgoing,
    PeerRole, StatusSnapshot, Timestamp, TrackerError, TriggerPayload, error_codes,
};

use crate::config::ControllerConfig;
use crate::dispatcher::Dispatch;
use crate::engine::ControllerEngine;
use crate::observer::{ControllerEvent, EventBus};
use crate::router::{CommandRouter, ConnectionId};
use crate::store::{RecordStore, StoreHealth, StoreQueue, StoreWriter, StoreWriterConfig};

const INBOX_CAPACITY: usize = 1024;

/// Wall-clock timestamps derived from the tokio clock, so paused-time tests
/// and deadline timers agree on what "now" is.
#[derive(Debug, Clone, Copy)]
pub struct ControllerClock {
    origin: Timestamp,
    started: Instant,
}

impl ControllerClock {
    #[must_use]
    pub fn start() -> Self {
        Self::starting_at(Timestamp::now())
    }

    #[must_use]
    pub fn starting_at(origin: Timestamp) -> Self {
        Self {
            origin,
            started: Instant::now(),
        }
    }

    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.origin + self.started.elapsed()
    }

    /// The tokio instant at which `at` is reached.
    #[must_use]
    pub fn instant_at(&self, at: Timestamp) -> Instant {
        self.started + at.saturating_duration_since(self.origin)
    }
}

/// Inputs to the controller actor. Everything that mutates controller state
/// arrives through here and is handled one message at a time.
#[derive(Debug)]
pub enum ControllerRequest {
    Edge {
        client_id: ClientId,
        message: EdgeMessage,
    },
    Connected {
        conn_id: ConnectionId,
        client_id: ClientId,
        role: PeerRole,
        addr: SocketAddr,
        outbound: mpsc::Sender<Outgoing>,
    },
    Disconnected {
        conn_id: ConnectionId,
        client_id: ClientId,
        role: PeerRole,
    },
    Operator {
        request: OperatorRequest,
        reply: oneshot::Sender<OperatorResponse>,
    },
}

/// Cheap cloneable front end to the controller actor.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    tx: mpsc::Sender<ControllerRequest>,
    next_conn: Arc<AtomicU64>,
}

impl ControllerHandle {
    #[must_use]
    pub fn next_connection_id(&self) -> ConnectionId {
        self.next_conn.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn send(&self, request: ControllerRequest) -> Result<(), ControllerError> {
        self.tx
            .send(request)
            .await
            .map_err(|_| ControllerError::ShuttingDown)
    }

    pub async fn edge(
        &self,
        client_id: ClientId,
        message: EdgeMessage,
    ) -> Result<(), ControllerError> {
        self.send(ControllerRequest::Edge { client_id, message })
            .await
    }

    pub async fn request(
        &self,
        request: OperatorRequest,
    ) -> Result<OperatorResponse, ControllerError> {
        let (reply, rx) = oneshot::channel();
        self.send(ControllerRequest::Operator { request, reply })
            .await?;
        rx.await.map_err(|_| ControllerError::ShuttingDown)
    }

    pub async fn status(&self) -> Result<StatusSnapshot, ControllerError> {
        match self.request(OperatorRequest::GetStatus).await? {
            OperatorResponse::Status(snapshot) => Ok(snapshot),
            other => Err(ControllerError::Protocol(format!(
                "unexpected status response: {other:?}"
            ))),
        }
    }

    pub async fn trigger(&self, trigger: TriggerPayload) -> Result<OperatorResponse, ControllerError> {
        self.request(OperatorRequest::Trigger(trigger)).await
    }

    pub async fn command(
        &self,
        client_id: ClientId,
        action: Action,
    ) -> Result<OperatorResponse, ControllerError> {
        self.request(OperatorRequest::Command { client_id, action })
            .await
    }

    pub async fn command_all(&self, action: Action) -> Result<OperatorResponse, ControllerError> {
        self.request(OperatorRequest::CommandAll { action }).await
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// The controller actor: owns the engine and serializes every input.
pub struct ControllerRuntime {
    engine: ControllerEngine,
    clock: ControllerClock,
    inbox: mpsc::Receiver<ControllerRequest>,
    router: CommandRouter,
    store: StoreQueue,
    bus: EventBus,
    sweep_interval: Duration,
    shutdown_rx: broadcast::Receiver<()>,
}

impl ControllerRuntime {
    pub async fn run(mut self) {
        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            clients = self.engine.clients().len(),
            "Controller runtime started"
        );

        loop {
            let deadline = self
                .engine
                .next_deadline()
                .map(|at| self.clock.instant_at(at));

            tokio::select! {
                biased;

                _ = self.shutdown_rx.recv() => {
                    tracing::info!("Shutdown signal received, stopping controller runtime");
                    break;
                }
                () = sleep_until(deadline) => {
                    let now = self.clock.now();
                    self.engine.expire_due(now);
                }
                request = self.inbox.recv() => {
                    let Some(request) = request else { break };
                    let now = self.clock.now();
                    self.engine.expire_due(now);
                    self.handle(request, now);
                }
                _ = sweep.tick() => {
                    let now = self.clock.now();
                    self.engine.expire_due(now);
                    self.engine.sweep(now);
                }
            }

            self.flush();
        }

        let abandoned = self.engine.abandon_open();
        if !abandoned.is_empty() {
            tracing::warn!(
                count = abandoned.len(),
                "Open records abandoned at shutdown without a decision"
            );
        }
        self.flush();
    }

    fn handle(&mut self, request: ControllerRequest, now: Timestamp) {
        match request {
            ControllerRequest::Edge { client_id, message } => {
                self.handle_edge(&client_id, message, now);
            }
            ControllerRequest::Connected {
                conn_id,
                client_id,
                role,
                addr,
                outbound,
            } => {
                if role == PeerRole::Supervisor
                    && let Some(old) = self.router.register(client_id.clone(), conn_id, outbound)
                {
                    tracing::info!(%client_id, old_conn = old, new_conn = conn_id, "Supervisor connection replaced");
                }
                self.engine.on_connected(&client_id, role, addr);
            }
            ControllerRequest::Disconnected {
                conn_id,
                client_id,
                role,
            } => {
                let current = role != PeerRole::Supervisor
                    || self.router.unregister(&client_id, conn_id);
                if current {
                    self.engine.on_disconnected(&client_id, role);
                }
            }
            ControllerRequest::Operator { request, reply } => {
                let response = self.handle_operator(request, now);
                if reply.send(response).is_err() {
                    tracing::debug!("Operator went away before the reply was sent");
                }
            }
        }
    }

    fn handle_edge(&mut self, client_id: &ClientId, message: EdgeMessage, now: Timestamp) {
        match message {
            EdgeMessage::Hello(_) => {}
            EdgeMessage::Heartbeat(hb) => {
                self.engine
                    .on_heartbeat(client_id, hb.process_state, hb.health, now);
            }
            EdgeMessage::Result(payload) => {
                self.engine.on_result(client_id, payload, now);
            }
            EdgeMessage::Crashed { reason } => self.engine.on_crashed(client_id, reason),
            EdgeMessage::Stopped => self.engine.on_stopped(client_id),
            EdgeMessage::Telemetry { kind, payload } => {
                self.engine.on_telemetry(client_id, kind, payload.len());
            }
            EdgeMessage::Trigger(trigger) => {
                if let Err(e) = self.engine.on_trigger(trigger, now) {
                    tracing::warn!(sensor = %client_id, error = %e, "Trigger rejected");
                }
            }
        }
    }

    fn handle_operator(&mut self, request: OperatorRequest, now: Timestamp) -> OperatorResponse {
        match request {
            OperatorRequest::GetStatus => {
                OperatorResponse::Status(self.engine.snapshot(now, self.store.health()))
            }
            OperatorRequest::Command { client_id, action } => {
                match self.engine.command(&client_id, action, now) {
                    Ok(Dispatch::Issued { .. }) => OperatorResponse::CommandsIssued {
                        issued: vec![client_id],
                        skipped: Vec::new(),
                    },
                    Ok(Dispatch::NoOp) => OperatorResponse::CommandsIssued {
                        issued: Vec::new(),
                        skipped: vec![client_id],
                    },
                    Err(e) => OperatorResponse::error(error_codes::UNKNOWN_CLIENT, e.to_string()),
                }
            }
            OperatorRequest::CommandAll { action } => {
                let (issued, skipped) = self.engine.command_all(action, now);
                OperatorResponse::CommandsIssued { issued, skipped }
            }
            OperatorRequest::Trigger(trigger) => match self.engine.on_trigger(trigger, now) {
                Ok((record_id, deadline)) => OperatorResponse::TriggerAccepted {
                    record_id,
                    deadline,
                },
                Err(e @ TrackerError::DuplicateTrigger(_)) => {
                    OperatorResponse::error(error_codes::DUPLICATE_TRIGGER, e.to_string())
                }
                Err(e) => OperatorResponse::error(error_codes::INTERNAL_ERROR, e.to_string()),
            },
        }
    }

    fn flush(&mut self) {
        let mut effects = self.engine.take_effects();
        if effects.is_empty() {
            return;
        }
        for command in effects.commands {
            let delivered = self.router.deliver(&command);
            if !delivered {
                self.engine.on_undelivered(&command);
            }
            self.bus.publish(ControllerEvent::CommandIssued {
                client_id: command.target,
                action: command.action,
                delivered,
            });
        }
        effects.events.append(&mut self.engine.take_effects().events);
        for event in effects.events {
            self.bus.publish(event);
        }
        for record in effects.closed {
            self.store.submit(record);
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// A spawned controller: actor plus record writer.
#[derive(Debug)]
pub struct RunningController {
    pub handle: ControllerHandle,
    pub health: Arc<StoreHealth>,
    pub runtime: JoinHandle<()>,
    pub writer: JoinHandle<()>,
}

impl RunningController {
    /// Waits for the actor and then the writer. The writer drains once the
    /// actor has dropped its queue.
    pub async fn join(self) {
        if let Err(e) = self.runtime.await {
            tracing::error!(error = %e, "Controller runtime task failed");
        }
        if let Err(e) = self.writer.await {
            tracing::error!(error = %e, "Record writer task failed");
        }
    }
}

/// Spawns the controller actor and its record writer on the current runtime.
pub fn spawn_controller<S: RecordStore>(
    config: &ControllerConfig,
    store: S,
    store_config: &StoreWriterConfig,
    clock: ControllerClock,
    bus: EventBus,
    shutdown_tx: &broadcast::Sender<()>,
) -> RunningController {
    let (writer, queue) = StoreWriter::new(store, store_config, bus.clone(), shutdown_tx.subscribe());
    let health = Arc::clone(queue.health());
    let (tx, inbox) = mpsc::channel(INBOX_CAPACITY);

    let runtime = ControllerRuntime {
        engine: ControllerEngine::new(config),
        clock,
        inbox,
        router: CommandRouter::new(),
        store: queue,
        bus,
        sweep_interval: config.sweep_interval,
        shutdown_rx: shutdown_tx.subscribe(),
    };

    RunningController {
        handle: ControllerHandle {
            tx,
            next_conn: Arc::new(AtomicU64::new(1)),
        },
        health,
        runtime: tokio::spawn(runtime.run()),
        writer: tokio::spawn(writer.run()),
    }
}
