use std::marker::PhantomData;

use thiserror::Error;
use vigil_core::error::{CodecError, TransportError};
use vigil_core::traits::{Codec, FramedTransport};

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

impl ChannelError {
    /// A codec failure leaves the framing intact; the next frame is readable.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Codec(_))
    }
}

/// Typed, bidirectional view of a framed transport: sends `Tx`, receives `Rx`.
///
/// Both methods take `&self`, so one channel behind an `Arc` can serve a
/// reader task and any number of writers.
pub struct MessageChannel<Tx, Rx, T, C> {
    transport: T,
    codec: C,
    _phantom: PhantomData<fn(Tx) -> Rx>,
}

impl<Tx, Rx, T, C> MessageChannel<Tx, Rx, T, C> {
    pub const fn new(transport: T, codec: C) -> Self {
        Self {
            transport,
            codec,
            _phantom: PhantomData,
        }
    }

    pub const fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_parts(self) -> (T, C) {
        (self.transport, self.codec)
    }
}

impl<Tx, Rx, T, C> MessageChannel<Tx, Rx, T, C>
where
    T: FramedTransport,
    C: Codec<Tx> + Codec<Rx>,
{
    pub async fn send(&self, msg: &Tx) -> Result<(), ChannelError> {
        let bytes = Codec::<Tx>::encode(&self.codec, msg)?;
        self.transport.send_frame(&bytes).await?;
        Ok(())
    }

    pub async fn recv(&self) -> Result<Rx, ChannelError> {
        let bytes = self.transport.recv_frame().await?;
        let msg = Codec::<Rx>::decode(&self.codec, &bytes)?;
        Ok(msg)
    }
}

impl<Tx, Rx, T: std::fmt::Debug, C: std::fmt::Debug> std::fmt::Debug
    for MessageChannel<Tx, Rx, T, C>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageChannel")
            .field("transport", &self.transport)
            .field("codec", &self.codec)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vigil_core::types::{
        Action, ClientId, Command, ControllerMessage, EdgeMessage, Hello, Incoming, Outgoing,
        PeerRole, Timestamp,
    };

    #[derive(Default)]
    struct MockTransport {
        sent: tokio::sync::Mutex<Vec<Vec<u8>>>,
        to_recv: tokio::sync::Mutex<Vec<Vec<u8>>>,
    }

    impl MockTransport {
        fn with_recv_data(mut data: Vec<Vec<u8>>) -> Self {
            data.reverse();
            Self {
                sent: tokio::sync::Mutex::new(Vec::new()),
                to_recv: tokio::sync::Mutex::new(data),
            }
        }

        async fn get_sent(&self) -> Vec<Vec<u8>> {
            self.sent.lock().await.clone()
        }
    }

    impl FramedTransport for MockTransport {
        async fn send_frame(&self, frame: &[u8]) -> Result<(), TransportError> {
            self.sent.lock().await.push(frame.to_vec());
            Ok(())
        }

        async fn recv_frame(&self) -> Result<Vec<u8>, TransportError> {
            self.to_recv
                .lock()
                .await
                .pop()
                .ok_or(TransportError::Closed)
        }
    }

    type EdgeChannel = MessageChannel<Incoming, Outgoing, MockTransport, crate::BincodeCodec>;

    #[tokio::test]
    async fn send_encodes_and_transmits() {
        let channel: EdgeChannel =
            MessageChannel::new(MockTransport::default(), crate::BincodeCodec::new());

        let hello = Incoming::Edge(EdgeMessage::Hello(Hello::new(
            ClientId::new("jetson-1"),
            PeerRole::Supervisor,
        )));
        channel.send(&hello).await.expect("send failed");

        let sent = channel.transport().get_sent().await;
        assert_eq!(sent.len(), 1);
        let decoded: Incoming = bincode::deserialize(&sent[0]).expect("decode failed");
        assert_eq!(decoded, hello);
    }

    #[tokio::test]
    async fn recv_decodes_in_order_then_reports_closed() {
        let first = Outgoing::Edge(ControllerMessage::Welcome {
            client_id: ClientId::new("jetson-1"),
        });
        let second = Outgoing::Edge(ControllerMessage::Command(Command::new(
            ClientId::new("jetson-1"),
            Action::Start,
            Timestamp::from_secs(2),
        )));
        let frames = vec![
            bincode::serialize(&first).expect("encode failed"),
            bincode::serialize(&second).expect("encode failed"),
        ];

        let channel: EdgeChannel = MessageChannel::new(
            MockTransport::with_recv_data(frames),
            crate::BincodeCodec::new(),
        );

        assert_eq!(channel.recv().await.expect("recv failed"), first);
        assert_eq!(channel.recv().await.expect("recv failed"), second);
        let result = channel.recv().await;
        assert!(matches!(result, Err(ChannelError::Transport(TransportError::Closed))));
    }

    #[tokio::test]
    async fn garbage_frame_is_recoverable() {
        let good = bincode::serialize(&Outgoing::Edge(ControllerMessage::error(1000, "hello first")))
            .expect("encode failed");
        let channel: EdgeChannel = MessageChannel::new(
            MockTransport::with_recv_data(vec![vec![0xFF; 3], good]),
            crate::BincodeCodec::new(),
        );

        let err = channel.recv().await.expect_err("garbage should fail");
        assert!(err.is_recoverable());
        assert!(channel.recv().await.is_ok());
    }

    #[test]
    fn channel_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EdgeChannel>();
        assert_send_sync::<Arc<EdgeChannel>>();
    }
}
