use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use vigil_core::{
    BackoffPolicy, ControllerMessage, EdgeMessage, Hello, Incoming, Outgoing, TransportError,
    TransportFactory,
};
use vigil_message_bincode::{BincodeCodec, ChannelError, MessageChannel};
use vigil_transport_tcp::{TcpConfig, TcpTransport, TcpTransportFactory};

use crate::error::SupervisorError;

pub type EdgeChannel = MessageChannel<Incoming, Outgoing, TcpTransport, BincodeCodec>;

const WELCOME_TIMEOUT: Duration = Duration::from_secs(5);
const INBOUND_CAPACITY: usize = 32;

/// An introduced connection to the controller.
///
/// A reader task owns the receive side so `recv` can sit in a `select!`
/// without losing half-read frames.
pub struct ControllerLink {
    channel: Arc<EdgeChannel>,
    inbound: mpsc::Receiver<ControllerMessage>,
    reader: JoinHandle<()>,
    addr: SocketAddr,
}

impl ControllerLink {
    /// Connects, sends `hello`, and waits for the controller's `Welcome`.
    pub async fn connect(addr: SocketAddr, hello: &Hello) -> Result<Self, SupervisorError> {
        let factory = TcpTransportFactory::with_config(TcpConfig::default().with_read_timeout(None));
        let transport = factory.connect(addr).await?;
        let channel = Arc::new(MessageChannel::new(transport, BincodeCodec::new()));

        channel
            .send(&Incoming::Edge(EdgeMessage::Hello(hello.clone())))
            .await?;

        let reply = tokio::time::timeout(WELCOME_TIMEOUT, channel.recv())
            .await
            .map_err(|_| TransportError::Timeout {
                operation: "welcome".to_string(),
                duration: WELCOME_TIMEOUT,
            })??;

        match reply {
            Outgoing::Edge(ControllerMessage::Welcome { client_id }) if client_id == hello.client_id => {}
            Outgoing::Edge(ControllerMessage::Error { code, message }) => {
                return Err(SupervisorError::Rejected { code, message });
            }
            other => {
                return Err(SupervisorError::UnexpectedMessage(format!("{other:?}")));
            }
        }

        tracing::info!(%addr, client_id = %hello.client_id, role = %hello.role, "Connected to controller");

        let (inbound_tx, inbound) = mpsc::channel(INBOUND_CAPACITY);
        let reader = tokio::spawn(read_loop(Arc::clone(&channel), inbound_tx, addr));
        Ok(Self {
            channel,
            inbound,
            reader,
            addr,
        })
    }

    /// Retries `connect` with backoff until it succeeds, the controller
    /// rejects the introduction, or shutdown is signalled.
    pub async fn connect_with_backoff(
        addr: SocketAddr,
        hello: &Hello,
        policy: &BackoffPolicy,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> Result<Self, SupervisorError> {
        let mut attempt = 0u32;
        loop {
            let result = tokio::select! {
                result = Self::connect(addr, hello) => result,
                _ = shutdown_rx.recv() => return Err(SupervisorError::Shutdown),
            };
            match result {
                Ok(link) => return Ok(link),
                Err(e) if e.is_link_failure() => {
                    let delay = policy.next(attempt);
                    attempt = attempt.saturating_add(1);
                    tracing::warn!(
                        %addr,
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "Controller unreachable, retrying"
                    );
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        _ = shutdown_rx.recv() => return Err(SupervisorError::Shutdown),
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn send(&self, message: EdgeMessage) -> Result<(), SupervisorError> {
        self.channel.send(&Incoming::Edge(message)).await?;
        Ok(())
    }

    /// Next message from the controller; `None` once the connection is gone.
    pub async fn recv(&mut self) -> Option<ControllerMessage> {
        self.inbound.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ControllerMessage> {
        self.inbound.try_recv().ok()
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Drop for ControllerLink {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(
    channel: Arc<EdgeChannel>,
    inbound_tx: mpsc::Sender<ControllerMessage>,
    addr: SocketAddr,
) {
    loop {
        match channel.recv().await {
            Ok(Outgoing::Edge(message)) => {
                if inbound_tx.send(message).await.is_err() {
                    break;
                }
            }
            Ok(Outgoing::Operator(response)) => {
                tracing::debug!(%addr, ?response, "Ignoring operator response on edge link");
            }
            Err(e) if e.is_recoverable() => {
                tracing::warn!(%addr, error = %e, "Failed to decode controller message, skipping frame");
            }
            Err(ChannelError::Transport(TransportError::Closed)) => {
                tracing::warn!(%addr, "Controller closed the connection");
                break;
            }
            Err(e) => {
                tracing::warn!(%addr, error = %e, "Controller link failed");
                break;
            }
        }
    }
    let _ = channel.transport().shutdown().await;
}
