#![allow(clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use vigil_core::traits::{FramedTransport, Listener, TransportFactory};
use vigil_transport_tcp::{TcpConfig, TcpListener, TcpTransportFactory};

async fn echo_server(frames: usize) -> (std::net::SocketAddr, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind listener");
    let addr = listener.local_addr().expect("failed to get local addr");

    let handle = tokio::spawn(async move {
        let (transport, _) = listener.accept().await.expect("failed to accept");
        for _ in 0..frames {
            let msg = transport.recv_frame().await.expect("failed to recv");
            transport.send_frame(&msg).await.expect("failed to send");
        }
    });

    (addr, handle)
}

#[tokio::test]
async fn send_receive_roundtrip() {
    let (addr, handle) = echo_server(1).await;

    let factory = TcpTransportFactory::default();
    let transport = factory.connect(addr).await.expect("failed to connect");

    let original = b"vigil/client/jetson-1/heartbeat";
    transport
        .send_frame(original)
        .await
        .expect("failed to send");

    let received = transport.recv_frame().await.expect("failed to recv");
    assert_eq!(received, original);

    handle.await.expect("server task failed");
}

#[tokio::test]
async fn multiple_frames_keep_boundaries() {
    let messages = [
        b"first".to_vec(),
        Vec::new(),
        vec![0u8; 1000],
        vec![255u8; 70_000],
        b"last".to_vec(),
    ];
    let (addr, handle) = echo_server(messages.len()).await;

    let factory = TcpTransportFactory::default();
    let transport = factory.connect(addr).await.expect("failed to connect");

    for original in &messages {
        transport
            .send_frame(original)
            .await
            .expect("failed to send");
        let received = transport.recv_frame().await.expect("failed to recv");
        assert_eq!(&received, original);
    }

    handle.await.expect("server task failed");
}

#[tokio::test]
async fn reader_task_does_not_block_writers() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind listener");
    let addr = listener.local_addr().expect("failed to get local addr");

    let server = tokio::spawn(async move {
        let (transport, _) = listener.accept().await.expect("failed to accept");
        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(transport.recv_frame().await.expect("failed to recv"));
        }
        transport
            .send_frame(b"done")
            .await
            .expect("failed to send");
        seen
    });

    let factory = TcpTransportFactory::default();
    let transport = Arc::new(factory.connect(addr).await.expect("failed to connect"));

    let reader = {
        let transport = Arc::clone(&transport);
        tokio::spawn(async move { transport.recv_frame().await })
    };

    // The reader is parked in recv_frame while these sends go through.
    tokio::time::sleep(Duration::from_millis(20)).await;
    for msg in [&b"a"[..], b"b", b"c"] {
        transport.send_frame(msg).await.expect("failed to send");
    }

    let reply = reader
        .await
        .expect("reader task failed")
        .expect("failed to recv");
    assert_eq!(reply, b"done");

    let seen = server.await.expect("server task failed");
    assert_eq!(seen, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
}

#[tokio::test]
async fn detects_connection_closed() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind listener");
    let addr = listener.local_addr().expect("failed to get local addr");

    let handle = tokio::spawn(async move {
        let (transport, _) = listener.accept().await.expect("failed to accept");
        drop(transport);
    });

    let factory = TcpTransportFactory::default();
    let transport = factory.connect(addr).await.expect("failed to connect");

    handle.await.expect("server task failed");

    let result = transport.recv_frame().await;
    assert!(result.is_err());
}

#[tokio::test]
async fn oversized_incoming_frame_is_rejected() {
    let listener = TcpListener::bind_with_config("127.0.0.1:0", TcpConfig::new().with_max_message_size(16))
        .await
        .expect("failed to bind listener");
    let addr = listener.local_addr().expect("failed to get local addr");

    let handle = tokio::spawn(async move {
        let (transport, _) = listener.accept().await.expect("failed to accept");
        transport.recv_frame().await
    });

    let factory = TcpTransportFactory::default();
    let transport = factory.connect(addr).await.expect("failed to connect");
    transport
        .send_frame(&[7u8; 64])
        .await
        .expect("failed to send");

    let result = handle.await.expect("server task failed");
    assert!(result.is_err());
}
