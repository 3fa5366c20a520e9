use std::net::SocketAddr;

use anyhow::{Context, Result};
use vigil_core::{
    Action, ClientId, Incoming, OperatorRequest, OperatorResponse, Outgoing, RecordId,
    StatusSnapshot, Timestamp, TransportFactory, TriggerPayload,
};
use vigil_message_bincode::{BincodeCodec, MessageChannel};
use vigil_transport_tcp::{TcpConfig, TcpTransport, TcpTransportFactory};

type OperatorChannel = MessageChannel<Incoming, Outgoing, TcpTransport, BincodeCodec>;

/// Result of a `start`/`stop` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandsIssued {
    pub issued: Vec<ClientId>,
    pub skipped: Vec<ClientId>,
}

/// Request/response connection to the controller's operator surface.
///
/// Pass a `TcpConfig` with a read timeout; an unanswered request otherwise
/// waits forever.
pub struct OperatorClient {
    channel: OperatorChannel,
}

impl OperatorClient {
    pub async fn connect(addr: SocketAddr, tcp: TcpConfig) -> Result<Self> {
        let factory = TcpTransportFactory::with_config(tcp);
        let transport = factory
            .connect(addr)
            .await
            .context("Failed to connect to controller")?;

        Ok(Self {
            channel: MessageChannel::new(transport, BincodeCodec::new()),
        })
    }

    pub async fn status(&self) -> Result<StatusSnapshot> {
        match self.send_and_recv(OperatorRequest::GetStatus).await? {
            OperatorResponse::Status(status) => Ok(status),
            OperatorResponse::Error { code, message } => {
                anyhow::bail!("Controller error ({code}): {message}")
            }
            _ => anyhow::bail!("Unexpected response type"),
        }
    }

    pub async fn command(&self, client_id: ClientId, action: Action) -> Result<CommandsIssued> {
        self.issue(OperatorRequest::Command { client_id, action })
            .await
    }

    pub async fn command_all(&self, action: Action) -> Result<CommandsIssued> {
        self.issue(OperatorRequest::CommandAll { action }).await
    }

    /// Injects a trigger as if the conveyor sensor had fired.
    pub async fn trigger(&self, trigger: TriggerPayload) -> Result<(RecordId, Timestamp)> {
        match self.send_and_recv(OperatorRequest::Trigger(trigger)).await? {
            OperatorResponse::TriggerAccepted {
                record_id,
                deadline,
            } => Ok((record_id, deadline)),
            OperatorResponse::Error { code, message } => {
                anyhow::bail!("Controller error ({code}): {message}")
            }
            _ => anyhow::bail!("Unexpected response type"),
        }
    }

    async fn issue(&self, request: OperatorRequest) -> Result<CommandsIssued> {
        match self.send_and_recv(request).await? {
            OperatorResponse::CommandsIssued { issued, skipped } => {
                Ok(CommandsIssued { issued, skipped })
            }
            OperatorResponse::Error { code, message } => {
                anyhow::bail!("Controller error ({code}): {message}")
            }
            _ => anyhow::bail!("Unexpected response type"),
        }
    }

    async fn send_and_recv(&self, request: OperatorRequest) -> Result<OperatorResponse> {
        self.channel
            .send(&Incoming::Operator(request))
            .await
            .context("Failed to send request")?;

        let outgoing = self
            .channel
            .recv()
            .await
            .context("Failed to receive response")?;

        match outgoing {
            Outgoing::Operator(response) => Ok(response),
            Outgoing::Edge(_) => {
                anyhow::bail!("Received edge message on operator connection")
            }
        }
    }
}

impl std::fmt::Debug for OperatorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorClient").finish_non_exhaustive()
    }
}
