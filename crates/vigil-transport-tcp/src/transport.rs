use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use vigil_core::error::TransportError;
use vigil_core::traits::FramedTransport;

use crate::config::TcpConfig;

const FRAME_LENGTH_SIZE: usize = 4;

/// Length-prefixed frames over one TCP stream.
///
/// Reads and writes lock separate halves, so one task may block in
/// `recv_frame` while others send. `recv_frame` is not cancellation safe:
/// callers that race it against other futures should give it a dedicated
/// task.
pub struct TcpTransport {
    reader: Mutex<ReadHalf<TcpStream>>,
    writer: Mutex<WriteHalf<TcpStream>>,
    peer_addr: Option<SocketAddr>,
    config: TcpConfig,
}

impl TcpTransport {
    #[must_use]
    pub fn new(stream: TcpStream) -> Self {
        Self::with_config(stream, TcpConfig::default())
    }

    #[must_use]
    pub fn with_config(stream: TcpStream, config: TcpConfig) -> Self {
        let peer_addr = stream.peer_addr().ok();
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            peer_addr,
            config,
        }
    }

    #[must_use]
    pub const fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Half-closes the write side so the peer sees end-of-stream.
    pub async fn shutdown(&self) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        writer.shutdown().await.map_err(TransportError::from)
    }

    #[must_use]
    pub const fn config(&self) -> &TcpConfig {
        &self.config
    }

    fn check_size(&self, len: usize) -> Result<(), String> {
        if len > self.config.max_message_size {
            return Err(format!(
                "frame of {len} bytes exceeds limit {}",
                self.config.max_message_size
            ));
        }
        Ok(())
    }
}

fn read_error(e: std::io::Error) -> TransportError {
    match e.kind() {
        ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::BrokenPipe => {
            TransportError::Closed
        }
        _ => TransportError::RecvFailed(e.to_string()),
    }
}

async fn within<F, T>(
    limit: Option<Duration>,
    operation: &str,
    fut: F,
) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match limit {
        Some(duration) => tokio::time::timeout(duration, fut)
            .await
            .map_err(|_| TransportError::Timeout {
                operation: operation.to_string(),
                duration,
            })?,
        None => fut.await,
    }
}

impl FramedTransport for TcpTransport {
    async fn send_frame(&self, frame: &[u8]) -> Result<(), TransportError> {
        self.check_size(frame.len())
            .map_err(TransportError::SendFailed)?;
        let prefix = u32::try_from(frame.len())
            .map_err(|_| TransportError::SendFailed("frame length overflows u32".to_string()))?
            .to_be_bytes();

        let mut writer = self.writer.lock().await;
        within(self.config.write_timeout, "send_frame", async {
            let write = async {
                writer.write_all(&prefix).await?;
                writer.write_all(frame).await?;
                writer.flush().await
            };
            write
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string()))
        })
        .await
    }

    async fn recv_frame(&self) -> Result<Vec<u8>, TransportError> {
        let mut reader = self.reader.lock().await;
        within(self.config.read_timeout, "recv_frame", async {
            let mut prefix = [0u8; FRAME_LENGTH_SIZE];
            reader.read_exact(&mut prefix).await.map_err(read_error)?;
            let len = u32::from_be_bytes(prefix) as usize;
            self.check_size(len).map_err(TransportError::RecvFailed)?;

            let mut frame = vec![0u8; len];
            reader.read_exact(&mut frame).await.map_err(read_error)?;
            Ok(frame)
        })
        .await
    }
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("peer_addr", &self.peer_addr)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
