#![allow(clippy::expect_used, clippy::panic)]
#![cfg(unix)]

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use vigil_controller::{
    ControllerClock, ControllerConfig, ControllerEvent, ControllerHandle, ControllerServer,
    ConveyorGeometry, ExpectedClient, MemoryRecordStore, StoreWriterConfig,
};
use vigil_core::{
    Action, BackoffPolicy, Classification, ClientId, ClientStatus, Decision, OperatorResponse,
    PeerRole, ProcessState, RecordState, ResultPayload, RunState, StatusSnapshot, TriggerPayload,
    error_codes,
};
use vigil_supervisor::{EdgePublisher, ProcessSpec, SupervisorConfig, SupervisorError, SupervisorNode};
use vigil_transport_tcp::TcpConfig;

const WAIT: Duration = Duration::from_secs(5);

fn controller_config(listen: SocketAddr) -> ControllerConfig {
    ControllerConfig::new(
        ConveyorGeometry::new(1.0, 2.0).expect("valid geometry"),
        vec![ExpectedClient::new(
            "jetson-1",
            SocketAddr::from(([127, 0, 0, 1], 7410)),
        )],
    )
    .expect("valid config")
    .with_listen_addr(listen)
}

async fn start_controller(listen: SocketAddr) -> ControllerServer {
    ControllerServer::bind_with_store(
        &controller_config(listen),
        MemoryRecordStore::new(),
        &StoreWriterConfig::new("unused"),
        TcpConfig::default(),
        ControllerClock::start(),
    )
    .await
    .expect("bind controller")
}

fn supervisor_config(client: &str, addr: SocketAddr, pid_file: &Path) -> SupervisorConfig {
    SupervisorConfig::new(client, addr, ProcessSpec::new("sleep").with_args(["30"]))
        .with_heartbeat_interval(Duration::from_millis(100))
        .with_stop_grace(Duration::from_secs(1))
        .with_pid_file(pid_file)
        .with_reconnect(BackoffPolicy::new(
            Duration::from_millis(50),
            Duration::from_millis(200),
        ))
}

fn jetson(status: &StatusSnapshot) -> ClientStatus {
    status
        .clients
        .iter()
        .find(|c| c.client_id == ClientId::new("jetson-1"))
        .cloned()
        .expect("configured client")
}

async fn wait_for<F>(handle: &ControllerHandle, what: &str, mut pred: F) -> StatusSnapshot
where
    F: FnMut(&StatusSnapshot) -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let status = handle.status().await.expect("controller running");
        if pred(&status) {
            return status;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}: {status:?}"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[tokio::test]
async fn supervisor_follows_start_and_stop() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pid_file = dir.path().join("inference.pid");
    let server = start_controller(SocketAddr::from(([127, 0, 0, 1], 0))).await;
    let handle = server.handle();
    let addr = server.local_addr();
    let server_shutdown = server.shutdown_handle();
    let server_task = tokio::spawn(server.run());

    let node = SupervisorNode::new(supervisor_config("jetson-1", addr, &pid_file));
    let node_shutdown = node.shutdown_handle();
    let node_task = tokio::spawn(node.run());

    wait_for(&handle, "supervisor connected", |s| {
        let c = jetson(s);
        c.connected && c.process_state == Some(ProcessState::Idle)
    })
    .await;

    let response = handle
        .command(ClientId::new("jetson-1"), Action::Start)
        .await
        .expect("command");
    assert_eq!(
        response,
        OperatorResponse::CommandsIssued {
            issued: vec![ClientId::new("jetson-1")],
            skipped: Vec::new(),
        }
    );

    let status = wait_for(&handle, "process running", |s| {
        let c = jetson(s);
        c.run_state == RunState::Running && c.process_state == Some(ProcessState::Running)
    })
    .await;
    assert_eq!(jetson(&status).run_state, RunState::Running);
    assert!(pid_file.exists());

    handle
        .command(ClientId::new("jetson-1"), Action::Stop)
        .await
        .expect("command");
    wait_for(&handle, "process stopped", |s| {
        let c = jetson(s);
        c.run_state == RunState::Stopped && c.process_state == Some(ProcessState::Idle)
    })
    .await;
    assert!(!pid_file.exists());

    node_shutdown.send(()).ok();
    tokio::time::timeout(WAIT, node_task)
        .await
        .expect("node stops")
        .expect("join")
        .expect("node run");
    server_shutdown.send(()).ok();
    server_task.await.expect("join").expect("server run");
}

#[tokio::test]
async fn shutdown_stops_managed_process() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pid_file = dir.path().join("inference.pid");
    let server = start_controller(SocketAddr::from(([127, 0, 0, 1], 0))).await;
    let handle = server.handle();
    let addr = server.local_addr();
    let server_shutdown = server.shutdown_handle();
    let server_task = tokio::spawn(server.run());

    let node = SupervisorNode::new(supervisor_config("jetson-1", addr, &pid_file));
    let node_shutdown = node.shutdown_handle();
    let node_task = tokio::spawn(node.run());

    wait_for(&handle, "supervisor connected", |s| jetson(s).connected).await;
    handle
        .command(ClientId::new("jetson-1"), Action::Start)
        .await
        .expect("command");
    wait_for(&handle, "process running", |s| {
        jetson(s).process_state == Some(ProcessState::Running)
    })
    .await;
    let pid: u32 = std::fs::read_to_string(&pid_file)
        .expect("pid file")
        .trim()
        .parse()
        .expect("pid");

    node_shutdown.send(()).ok();
    tokio::time::timeout(WAIT, node_task)
        .await
        .expect("node stops")
        .expect("join")
        .expect("node run");
    assert!(!pid_file.exists());
    assert!(!vigil_supervisor::process::is_alive(pid));

    wait_for(&handle, "stop acknowledged", |s| {
        jetson(s).run_state == RunState::Stopped
    })
    .await;
    server_shutdown.send(()).ok();
    server_task.await.expect("join").expect("server run");
}

#[tokio::test]
async fn unknown_client_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let server = start_controller(SocketAddr::from(([127, 0, 0, 1], 0))).await;
    let addr = server.local_addr();
    let server_shutdown = server.shutdown_handle();
    let server_task = tokio::spawn(server.run());

    let node = SupervisorNode::new(supervisor_config(
        "jetson-9",
        addr,
        &dir.path().join("inference.pid"),
    ));
    let result = tokio::time::timeout(WAIT, node.run())
        .await
        .expect("rejection is final");
    match result {
        Err(SupervisorError::Rejected { code, .. }) => assert_eq!(code, error_codes::UNKNOWN_CLIENT),
        other => panic!("expected rejection, got {other:?}"),
    }

    server_shutdown.send(()).ok();
    server_task.await.expect("join").expect("server run");
}

#[tokio::test]
async fn supervisor_waits_for_controller() {
    let dir = tempfile::tempdir().expect("tempdir");
    let reserved = std::net::TcpListener::bind("127.0.0.1:0").expect("reserve port");
    let addr = reserved.local_addr().expect("addr");
    drop(reserved);

    let node = SupervisorNode::new(supervisor_config(
        "jetson-1",
        addr,
        &dir.path().join("inference.pid"),
    ));
    let node_shutdown = node.shutdown_handle();
    let node_task = tokio::spawn(node.run());

    tokio::time::sleep(Duration::from_millis(300)).await;
    let server = start_controller(addr).await;
    let handle = server.handle();
    let server_shutdown = server.shutdown_handle();
    let server_task = tokio::spawn(server.run());

    wait_for(&handle, "late connection", |s| jetson(s).connected).await;

    node_shutdown.send(()).ok();
    tokio::time::timeout(WAIT, node_task)
        .await
        .expect("node stops")
        .expect("join")
        .expect("node run");
    server_shutdown.send(()).ok();
    server_task.await.expect("join").expect("server run");
}

#[tokio::test]
async fn published_result_completes_record() {
    let server = start_controller(SocketAddr::from(([127, 0, 0, 1], 0))).await;
    let handle = server.handle();
    let addr = server.local_addr();
    let mut events = server.subscribe();
    let server_shutdown = server.shutdown_handle();
    let server_task = tokio::spawn(server.run());

    let policy = BackoffPolicy::new(Duration::from_millis(50), Duration::from_millis(200));
    let mut sensor = EdgePublisher::new(addr, "belt-sensor", PeerRole::Sensor, policy);
    sensor
        .publish_trigger(TriggerPayload::default())
        .await
        .expect("publish trigger");
    let status = wait_for(&handle, "record opened", |s| s.open_records == 1).await;
    assert_eq!(status.counters.triggers, 1);

    let mut inference = EdgePublisher::new(addr, "jetson-1", PeerRole::Inference, policy);
    inference
        .publish_result(ResultPayload::new(Classification::no_defect(), 0.97))
        .await
        .expect("publish result");
    inference
        .publish_telemetry("frame", vec![0u8; 16])
        .await
        .expect("publish telemetry");

    let closed = tokio::time::timeout(WAIT, async {
        loop {
            if let ControllerEvent::RecordClosed(record) = events.recv().await.expect("events") {
                return record;
            }
        }
    })
    .await
    .expect("record closes");
    assert_eq!(closed.state, RecordState::Decided);
    assert_eq!(closed.decision, Decision::Pass);
    assert!(inference.is_connected());

    server_shutdown.send(()).ok();
    server_task.await.expect("join").expect("server run");
}
