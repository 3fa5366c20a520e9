use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use vigil_core::{ControllerError, Listener};
use vigil_transport_tcp::{TcpConfig, TcpListener};

use crate::config::ControllerConfig;
use crate::handler::{ConnectionHandler, ExpectedAddrs};
use crate::observer::{ControllerEvent, EventBus, log_events};
use crate::runtime::{ControllerClock, ControllerHandle, RunningController, spawn_controller};
use crate::store::{JsonlRecordStore, RecordStore, StoreHealth, StoreWriterConfig};

/// TCP front end of the controller: accepts edge and operator connections
/// and feeds them into the controller actor.
pub struct ControllerServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    controller: RunningController,
    expected: ExpectedAddrs,
    bus: EventBus,
    logger: JoinHandle<()>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ControllerServer {
    /// Binds the listener and starts the controller with a JSON-lines store.
    pub async fn bind(
        config: &ControllerConfig,
        store_config: &StoreWriterConfig,
        tcp: TcpConfig,
    ) -> Result<Self, ControllerError> {
        let store = JsonlRecordStore::new(&store_config.path);
        Self::bind_with_store(config, store, store_config, tcp, ControllerClock::start()).await
    }

    pub async fn bind_with_store<S: RecordStore>(
        config: &ControllerConfig,
        store: S,
        store_config: &StoreWriterConfig,
        tcp: TcpConfig,
        clock: ControllerClock,
    ) -> Result<Self, ControllerError> {
        let listener = TcpListener::bind_addr_with_config(config.listen_addr, tcp)
            .await
            .map_err(|e| ControllerError::BindFailed {
                addr: config.listen_addr.to_string(),
                reason: e.to_string(),
            })?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, _) = broadcast::channel(1);
        let bus = EventBus::default();
        let logger = tokio::spawn(log_events(bus.subscribe(), shutdown_tx.subscribe()));
        let controller = spawn_controller(
            config,
            store,
            store_config,
            clock,
            bus.clone(),
            &shutdown_tx,
        );

        let expected: HashMap<_, _> = config
            .clients
            .iter()
            .map(|c| (c.id.clone(), c.address))
            .collect();

        tracing::info!(
            addr = %local_addr,
            clients = config.clients.len(),
            travel_ms = config.geometry.travel_time().as_millis(),
            "Controller listening"
        );

        Ok(Self {
            listener,
            local_addr,
            controller,
            expected: Arc::new(expected),
            bus,
            logger,
            shutdown_tx,
        })
    }

    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[must_use]
    pub fn handle(&self) -> ControllerHandle {
        self.controller.handle.clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.bus.subscribe()
    }

    #[must_use]
    pub fn store_health(&self) -> Arc<StoreHealth> {
        Arc::clone(&self.controller.health)
    }

    /// Sender that stops the server and every task it owns.
    #[must_use]
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Accepts connections until shutdown, then waits for the controller
    /// and the record writer to finish.
    pub async fn run(self) -> Result<(), ControllerError> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((transport, addr)) => {
                            tracing::debug!(%addr, "Accepted connection");
                            let handler = ConnectionHandler::new(
                                self.controller.handle.clone(),
                                transport,
                                Arc::clone(&self.expected),
                                addr,
                                self.shutdown_tx.subscribe(),
                            );
                            tokio::spawn(async move {
                                if let Err(e) = handler.run().await {
                                    tracing::debug!(%addr, error = %e, "Connection handler finished with error");
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Shutdown signal received, stopping server");
                    break;
                }
            }
        }

        drop(self.listener);
        self.controller.join().await;
        if let Err(e) = self.logger.await {
            tracing::debug!(error = %e, "Event logger task failed");
        }
        tracing::info!("Controller stopped");
        Ok(())
    }
}
