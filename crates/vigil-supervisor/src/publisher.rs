use std::net::SocketAddr;

use tokio::sync::broadcast;
use vigil_core::{
    BackoffPolicy, ClientId, ControllerMessage, EdgeMessage, Hello, PeerRole, ResultPayload,
    TriggerPayload,
};

use crate::error::SupervisorError;
use crate::link::ControllerLink;

/// Publishing side of an inference client or a conveyor sensor.
///
/// Messages are fire-and-forget. A failed send rebuilds the link with
/// backoff and retries that message once on the new connection.
pub struct EdgePublisher {
    addr: SocketAddr,
    hello: Hello,
    reconnect: BackoffPolicy,
    link: Option<ControllerLink>,
    shutdown_tx: broadcast::Sender<()>,
}

impl EdgePublisher {
    #[must_use]
    pub fn new(
        addr: SocketAddr,
        client_id: impl Into<ClientId>,
        role: PeerRole,
        reconnect: BackoffPolicy,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            addr,
            hello: Hello::new(client_id.into(), role),
            reconnect,
            link: None,
            shutdown_tx,
        }
    }

    #[must_use]
    pub const fn client_id(&self) -> &ClientId {
        &self.hello.client_id
    }

    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// Sender that aborts a pending reconnect.
    #[must_use]
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    pub async fn connect(&mut self) -> Result<(), SupervisorError> {
        if self.link.is_none() {
            let mut shutdown_rx = self.shutdown_tx.subscribe();
            let link = ControllerLink::connect_with_backoff(
                self.addr,
                &self.hello,
                &self.reconnect,
                &mut shutdown_rx,
            )
            .await?;
            self.link = Some(link);
        }
        Ok(())
    }

    pub async fn publish_result(&mut self, result: ResultPayload) -> Result<(), SupervisorError> {
        self.publish(EdgeMessage::Result(result)).await
    }

    pub async fn publish_trigger(&mut self, trigger: TriggerPayload) -> Result<(), SupervisorError> {
        self.publish(EdgeMessage::Trigger(trigger)).await
    }

    /// Pass-through payload for dashboards; never used for decisions.
    pub async fn publish_telemetry(
        &mut self,
        kind: impl Into<String>,
        payload: Vec<u8>,
    ) -> Result<(), SupervisorError> {
        self.publish(EdgeMessage::Telemetry {
            kind: kind.into(),
            payload,
        })
        .await
    }

    pub async fn publish(&mut self, message: EdgeMessage) -> Result<(), SupervisorError> {
        self.connect().await?;
        self.drain_replies();
        if let Some(link) = &self.link {
            match link.send(message.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_link_failure() => {
                    tracing::warn!(client_id = %self.hello.client_id, error = %e, "Publish failed, reconnecting");
                }
                Err(e) => return Err(e),
            }
        }

        self.link = None;
        self.connect().await?;
        match &self.link {
            Some(link) => link.send(message).await,
            None => Err(SupervisorError::Shutdown),
        }
    }

    /// Drains controller replies that arrived since the last call, logging
    /// any errors. Returns the number of error replies seen.
    pub fn drain_replies(&mut self) -> usize {
        let Some(link) = self.link.as_mut() else {
            return 0;
        };
        let mut errors = 0;
        while let Some(reply) = link.try_recv() {
            if let ControllerMessage::Error { code, message } = reply {
                tracing::warn!(client_id = %self.hello.client_id, code, %message, "Controller rejected a message");
                errors += 1;
            }
        }
        errors
    }
}
