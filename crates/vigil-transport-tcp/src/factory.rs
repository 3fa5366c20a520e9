use std::net::SocketAddr;

use tokio::net::TcpStream;
use vigil_core::error::TransportError;
use vigil_core::traits::TransportFactory;

use crate::config::TcpConfig;
use crate::listener::TcpListener;
use crate::transport::TcpTransport;

#[derive(Debug, Clone, Default)]
pub struct TcpTransportFactory {
    config: TcpConfig,
}

impl TcpTransportFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_config(config: TcpConfig) -> Self {
        Self { config }
    }

    pub async fn listen_str(&self, addr: &str) -> Result<TcpListener, TransportError> {
        TcpListener::bind_with_config(addr, self.config.clone()).await
    }

    pub async fn connect_str(&self, addr: &str) -> Result<TcpTransport, TransportError> {
        let socket_addr: SocketAddr =
            addr.parse()
                .map_err(|e: std::net::AddrParseError| TransportError::ConnectionFailed {
                    addr: addr.to_string(),
                    reason: e.to_string(),
                })?;
        self.connect(socket_addr).await
    }

    #[must_use]
    pub const fn config(&self) -> &TcpConfig {
        &self.config
    }
}

impl TransportFactory for TcpTransportFactory {
    type Transport = TcpTransport;
    type Listener = TcpListener;

    async fn connect(&self, addr: SocketAddr) -> Result<Self::Transport, TransportError> {
        let stream = tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::Timeout {
                operation: "connect".to_string(),
                duration: self.config.connect_timeout,
            })?
            .map_err(|e| TransportError::ConnectionFailed {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;

        if self.config.nodelay {
            stream.set_nodelay(true)?;
        }

        Ok(TcpTransport::with_config(stream, self.config.clone()))
    }

    async fn listen(&self, addr: SocketAddr) -> Result<Self::Listener, TransportError> {
        TcpListener::bind_addr_with_config(addr, self.config.clone()).await
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use vigil_core::traits::{FramedTransport, Listener};

    #[tokio::test]
    async fn connect_to_listener_using_trait() {
        let factory = TcpTransportFactory::new();
        let bind_addr: SocketAddr = "127.0.0.1:0".parse().expect("parse");
        let listener = factory.listen(bind_addr).await.expect("failed to bind");
        let local = listener.local_addr().expect("failed to get local addr");

        let handle =
            tokio::spawn(async move { listener.accept().await.expect("failed to accept") });

        let transport = factory.connect(local).await.expect("failed to connect");
        transport
            .send_frame(b"hello")
            .await
            .expect("failed to send");

        let (server_transport, _) = handle.await.expect("acceptor task failed");
        let received = server_transport.recv_frame().await.expect("failed to recv");
        assert_eq!(&received, b"hello");
    }

    #[tokio::test]
    async fn connect_str_rejects_garbage_address() {
        let factory = TcpTransportFactory::new();
        let result = factory.connect_str("not-an-address").await;
        assert!(matches!(
            result,
            Err(TransportError::ConnectionFailed { .. })
        ));
    }

    #[tokio::test]
    async fn connect_refused_is_connection_failed() {
        let factory = TcpTransportFactory::new();
        let listener = factory
            .listen_str("127.0.0.1:0")
            .await
            .expect("failed to bind");
        let addr = listener.local_addr().expect("failed to get local addr");
        drop(listener);

        let result = factory.connect(addr).await;
        assert!(result.is_err());
    }
}
