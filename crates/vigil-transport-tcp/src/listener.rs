use std::net::SocketAddr;

use tokio::net::TcpListener as TokioTcpListener;
use vigil_core::error::TransportError;
use vigil_core::traits::Listener;

use crate::config::TcpConfig;
use crate::transport::TcpTransport;

pub struct TcpListener {
    inner: TokioTcpListener,
    config: TcpConfig,
}

impl TcpListener {
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        Self::bind_with_config(addr, TcpConfig::default()).await
    }

    pub async fn bind_with_config(addr: &str, config: TcpConfig) -> Result<Self, TransportError> {
        let inner = TokioTcpListener::bind(addr).await?;
        Ok(Self { inner, config })
    }

    pub async fn bind_addr_with_config(
        addr: SocketAddr,
        config: TcpConfig,
    ) -> Result<Self, TransportError> {
        let inner = TokioTcpListener::bind(addr).await?;
        Ok(Self { inner, config })
    }

    #[must_use]
    pub const fn config(&self) -> &TcpConfig {
        &self.config
    }
}

impl std::fmt::Debug for TcpListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpListener")
            .field("local_addr", &self.inner.local_addr())
            .field("config", &self.config)
            .finish()
    }
}

impl Listener for TcpListener {
    type Transport = TcpTransport;

    async fn accept(&self) -> Result<(Self::Transport, SocketAddr), TransportError> {
        let (stream, addr) = self.inner.accept().await?;

        if self.config.nodelay {
            stream.set_nodelay(true)?;
        }

        Ok((TcpTransport::with_config(stream, self.config.clone()), addr))
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.inner.local_addr().map_err(TransportError::from)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use tokio::net::TcpStream;
    use vigil_core::traits::FramedTransport;

    #[tokio::test]
    async fn bind_and_accept() {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind");
        let addr = listener.local_addr().expect("failed to get local addr");
        assert_ne!(addr.port(), 0);

        let handle =
            tokio::spawn(async move { TcpStream::connect(addr).await.expect("failed to connect") });

        let (transport, peer_addr) = listener.accept().await.expect("failed to accept");
        assert_eq!(peer_addr.ip(), std::net::IpAddr::from([127, 0, 0, 1]));
        assert_eq!(transport.peer_addr(), Some(peer_addr));

        let client_stream = handle.await.expect("client task failed");
        let client_transport = TcpTransport::new(client_stream);

        client_transport
            .send_frame(b"heartbeat")
            .await
            .expect("failed to send");

        let received = transport.recv_frame().await.expect("failed to recv");
        assert_eq!(&received, b"heartbeat");
    }

    #[tokio::test]
    async fn accepted_transport_inherits_config() {
        let config = TcpConfig::new().with_max_message_size(64);
        let listener = TcpListener::bind_with_config("127.0.0.1:0", config)
            .await
            .expect("failed to bind");
        let addr = listener.local_addr().expect("failed to get local addr");

        let handle =
            tokio::spawn(async move { TcpStream::connect(addr).await.expect("failed to connect") });
        let (transport, _) = listener.accept().await.expect("failed to accept");
        let _client = handle.await.expect("client task failed");

        assert_eq!(transport.config().max_message_size, 64);
        assert!(transport.send_frame(&[0u8; 65]).await.is_err());
    }
}
