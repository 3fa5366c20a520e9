use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};
use vigil_core::{Command, ControllerMessage, EdgeMessage, Hello, PeerRole, ProcessState};

use crate::config::SupervisorConfig;
use crate::error::SupervisorError;
use crate::link::ControllerLink;
use crate::supervisor::ProcessSupervisor;

enum LinkOutcome {
    Lost,
    Shutdown,
}

/// Edge-node agent: keeps a link to the controller, heartbeats, and runs
/// the inference process on command.
///
/// The process state survives reconnects; only the link is rebuilt.
pub struct SupervisorNode {
    config: SupervisorConfig,
    supervisor: ProcessSupervisor,
    shutdown_tx: broadcast::Sender<()>,
}

impl SupervisorNode {
    #[must_use]
    pub fn new(config: SupervisorConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let supervisor = ProcessSupervisor::from_config(&config);
        Self {
            config,
            supervisor,
            shutdown_tx,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    #[must_use]
    pub const fn process_state(&self) -> ProcessState {
        self.supervisor.state()
    }

    #[must_use]
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    #[must_use]
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Reconciles orphans, then serves the controller until shutdown. The
    /// managed process is stopped before this returns.
    #[instrument(skip(self), fields(client_id = %self.config.client_id))]
    pub async fn run(mut self) -> Result<(), SupervisorError> {
        let mut shutdown_rx = self.shutdown_receiver();

        if let Some(pid) = self.supervisor.reconcile().await? {
            info!(pid, "Orphaned inference process terminated");
        }

        let hello = Hello::new(self.config.client_id.clone(), PeerRole::Supervisor);
        let result = loop {
            let link = match ControllerLink::connect_with_backoff(
                self.config.controller_addr,
                &hello,
                &self.config.reconnect,
                &mut shutdown_rx,
            )
            .await
            {
                Ok(link) => link,
                Err(SupervisorError::Shutdown) => break Ok(()),
                Err(e) => break Err(e),
            };

            match self.serve(link, &mut shutdown_rx).await {
                LinkOutcome::Lost => {
                    warn!(state = %self.supervisor.state(), "Controller link lost, reconnecting");
                }
                LinkOutcome::Shutdown => break Ok(()),
            }
        };

        self.supervisor.stop().await;
        info!("Supervisor stopped");
        result
    }

    async fn serve(
        &mut self,
        mut link: ControllerLink,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> LinkOutcome {
        let mut ticker = tokio::time::interval(self.config.heartbeat_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let outgoing = tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("Shutdown requested");
                    let ack = self.supervisor.stop().await;
                    if let Err(e) = link.send(ack).await {
                        debug!(error = %e, "Could not report stop during shutdown");
                    }
                    return LinkOutcome::Shutdown;
                }
                report = self.supervisor.exited() => vec![report, self.heartbeat()],
                message = link.recv() => match message {
                    Some(ControllerMessage::Command(command)) => self.on_command(command).await,
                    Some(ControllerMessage::Error { code, message }) => {
                        warn!(code, %message, "Controller reported an error");
                        Vec::new()
                    }
                    Some(ControllerMessage::Welcome { .. }) => Vec::new(),
                    None => return LinkOutcome::Lost,
                },
                _ = ticker.tick() => {
                    self.supervisor.tick();
                    vec![self.heartbeat()]
                }
            };

            for message in outgoing {
                if let Err(e) = link.send(message).await {
                    warn!(addr = %link.addr(), error = %e, "Failed to send to controller");
                    return LinkOutcome::Lost;
                }
            }
        }
    }

    #[instrument(skip(self, command), fields(action = %command.action))]
    async fn on_command(&mut self, command: Command) -> Vec<EdgeMessage> {
        if command.target != self.config.client_id {
            warn!(addressed_to = %command.target, "Ignoring command for another client");
            return Vec::new();
        }
        info!(issued = %command.issued_time, "Command received");

        let mut outgoing: Vec<EdgeMessage> = self.supervisor.apply(command.action).await.into_iter().collect();
        outgoing.push(self.heartbeat());
        outgoing
    }

    fn heartbeat(&self) -> EdgeMessage {
        EdgeMessage::Heartbeat(self.supervisor.heartbeat())
    }
}
