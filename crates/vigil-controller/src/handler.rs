use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use vigil_core::{
    ClientId, ControllerError, ControllerMessage, EdgeMessage, Hello, Incoming, OperatorRequest,
    OperatorResponse, Outgoing, PeerRole, TransportError, error_codes,
};
use vigil_message_bincode::{BincodeCodec, ChannelError, MessageChannel};
use vigil_transport_tcp::TcpTransport;

use crate::router::ConnectionId;
use crate::runtime::{ControllerHandle, ControllerRequest};

pub type ControllerChannel = MessageChannel<Outgoing, Incoming, TcpTransport, BincodeCodec>;

const OUTBOUND_CAPACITY: usize = 64;

/// Configured address of every expected client, used to flag peers that
/// introduce themselves from an unexpected host.
pub type ExpectedAddrs = Arc<HashMap<ClientId, SocketAddr>>;

/// Serves one accepted connection.
///
/// Frames are read by a dedicated task and forwarded over a channel, so a
/// partially read frame is never lost to cancellation. Replies and commands
/// share one outbound queue drained by a writer task.
pub struct ConnectionHandler {
    controller: ControllerHandle,
    channel: Arc<ControllerChannel>,
    expected: ExpectedAddrs,
    remote_addr: SocketAddr,
    conn_id: ConnectionId,
    peer: Option<Hello>,
    outbound_tx: mpsc::Sender<Outgoing>,
    outbound_rx: Option<mpsc::Receiver<Outgoing>>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl ConnectionHandler {
    #[must_use]
    pub fn new(
        controller: ControllerHandle,
        transport: TcpTransport,
        expected: ExpectedAddrs,
        remote_addr: SocketAddr,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        let conn_id = controller.next_connection_id();
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        Self {
            controller,
            channel: Arc::new(MessageChannel::new(transport, BincodeCodec::new())),
            expected,
            remote_addr,
            conn_id,
            peer: None,
            outbound_tx,
            outbound_rx: Some(outbound_rx),
            shutdown_rx,
        }
    }

    pub async fn run(mut self) -> Result<(), ControllerError> {
        let writer = self
            .outbound_rx
            .take()
            .map(|rx| tokio::spawn(write_loop(Arc::clone(&self.channel), rx, self.remote_addr)));

        let (frames_tx, mut frames_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let reader = tokio::spawn(read_loop(
            Arc::clone(&self.channel),
            frames_tx,
            self.remote_addr,
        ));

        let result = loop {
            tokio::select! {
                frame = frames_rx.recv() => match frame {
                    Some(Ok(msg)) => {
                        if let Err(e) = self.handle_incoming(msg).await {
                            break Err(e);
                        }
                    }
                    Some(Err(e)) => break Err(e.into()),
                    None => break Ok(()),
                },
                _ = self.shutdown_rx.recv() => break Ok(()),
            }
        };

        reader.abort();
        if let Some(peer) = self.peer.take() {
            tracing::debug!(client_id = %peer.client_id, role = %peer.role, addr = %self.remote_addr, "Peer connection closed");
            let _ = self
                .controller
                .send(ControllerRequest::Disconnected {
                    conn_id: self.conn_id,
                    client_id: peer.client_id,
                    role: peer.role,
                })
                .await;
        }
        if let Some(writer) = writer {
            writer.abort();
        }
        let _ = self.channel.transport().shutdown().await;
        result
    }

    async fn handle_incoming(&mut self, msg: Incoming) -> Result<(), ControllerError> {
        match msg {
            Incoming::Edge(EdgeMessage::Hello(hello)) => self.handle_hello(hello).await,
            Incoming::Edge(message) => {
                let Some(peer) = &self.peer else {
                    tracing::warn!(addr = %self.remote_addr, "Edge message before Hello");
                    self.reply(ControllerMessage::error(
                        error_codes::NOT_INTRODUCED,
                        "send Hello before any other message",
                    ))
                    .await;
                    return Ok(());
                };
                tracing::trace!(client_id = %peer.client_id, topic = %message.topic(&peer.client_id), "Edge message");
                self.controller.edge(peer.client_id.clone(), message).await
            }
            Incoming::Operator(request) => self.handle_operator(request).await,
        }
    }

    async fn handle_hello(&mut self, hello: Hello) -> Result<(), ControllerError> {
        if let Some(peer) = &self.peer {
            tracing::warn!(client_id = %peer.client_id, addr = %self.remote_addr, "Repeated Hello ignored");
            self.reply(ControllerMessage::error(
                error_codes::INVALID_REQUEST,
                "connection already introduced",
            ))
            .await;
            return Ok(());
        }

        match (hello.role, self.expected.get(&hello.client_id)) {
            (PeerRole::Supervisor | PeerRole::Inference, None) => {
                tracing::warn!(
                    client_id = %hello.client_id,
                    addr = %self.remote_addr,
                    "Rejecting peer that is not an expected client"
                );
                self.reply(ControllerMessage::error(
                    error_codes::UNKNOWN_CLIENT,
                    format!("client '{}' is not configured", hello.client_id),
                ))
                .await;
                return Ok(());
            }
            (_, Some(configured)) if configured.ip() != self.remote_addr.ip() => {
                tracing::warn!(
                    client_id = %hello.client_id,
                    expected = %configured.ip(),
                    actual = %self.remote_addr.ip(),
                    "Peer connected from an unexpected address"
                );
            }
            _ => {}
        }

        tracing::info!(client_id = %hello.client_id, role = %hello.role, addr = %self.remote_addr, "Peer introduced");
        self.controller
            .send(ControllerRequest::Connected {
                conn_id: self.conn_id,
                client_id: hello.client_id.clone(),
                role: hello.role,
                addr: self.remote_addr,
                outbound: self.outbound_tx.clone(),
            })
            .await?;
        self.reply(ControllerMessage::Welcome {
            client_id: hello.client_id.clone(),
        })
        .await;
        self.peer = Some(hello);
        Ok(())
    }

    async fn handle_operator(&self, request: OperatorRequest) -> Result<(), ControllerError> {
        tracing::debug!(addr = %self.remote_addr, ?request, "Operator request");
        let response = match self.controller.request(request).await {
            Ok(response) => response,
            Err(ControllerError::ShuttingDown) => {
                OperatorResponse::error(error_codes::SHUTTING_DOWN, "controller is shutting down")
            }
            Err(e) => OperatorResponse::error(error_codes::INTERNAL_ERROR, e.to_string()),
        };
        self.outbound_tx
            .send(Outgoing::Operator(response))
            .await
            .map_err(|_| ControllerError::Transport(TransportError::Closed))
    }

    async fn reply(&self, msg: ControllerMessage) {
        if self.outbound_tx.send(Outgoing::Edge(msg)).await.is_err() {
            tracing::debug!(addr = %self.remote_addr, "Writer gone, reply dropped");
        }
    }
}

async fn read_loop(
    channel: Arc<ControllerChannel>,
    frames_tx: mpsc::Sender<Result<Incoming, TransportError>>,
    addr: SocketAddr,
) {
    loop {
        let item = match channel.recv().await {
            Ok(msg) => Ok(msg),
            Err(e) if e.is_recoverable() => {
                tracing::warn!(%addr, error = %e, "Failed to decode message, skipping frame");
                continue;
            }
            Err(ChannelError::Transport(TransportError::Closed)) => {
                tracing::debug!(%addr, "Connection closed by peer");
                break;
            }
            Err(ChannelError::Transport(e)) => Err(e),
            Err(ChannelError::Codec(e)) => Err(TransportError::RecvFailed(e.to_string())),
        };
        let fatal = item.is_err();
        if frames_tx.send(item).await.is_err() || fatal {
            break;
        }
    }
}

async fn write_loop(
    channel: Arc<ControllerChannel>,
    mut outbound_rx: mpsc::Receiver<Outgoing>,
    addr: SocketAddr,
) {
    while let Some(msg) = outbound_rx.recv().await {
        if let Err(e) = channel.send(&msg).await {
            tracing::warn!(%addr, error = %e, "Failed to write to peer");
            break;
        }
    }
}
