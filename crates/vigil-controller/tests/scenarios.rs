#![allow(clippy::expect_used, clippy::panic)]

//! End-to-end timing scenarios driven through the controller actor with a
//! paused tokio clock.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use vigil_controller::{
    ControllerClock, ControllerConfig, ControllerEvent, ConveyorGeometry, EventBus,
    ExpectedClient, MemoryRecordStore, RunningController, StoreWriterConfig, spawn_controller,
};
use vigil_controller::runtime::ControllerRequest;
use vigil_core::{
    Action, Classification, ClientId, ClosedRecord, ControllerMessage, Decision, EdgeMessage,
    HeartbeatPayload, Liveness, OperatorResponse, Outgoing, PeerRole, ProcessState, RecordState,
    ResultPayload, RunState, SupervisorHealth, Timestamp, TriggerPayload,
};

struct Harness {
    controller: RunningController,
    store: MemoryRecordStore,
    events: broadcast::Receiver<ControllerEvent>,
    shutdown_tx: broadcast::Sender<()>,
    origin: Instant,
}

fn config() -> ControllerConfig {
    let clients = ["jetson-1", "jetson-2", "jetson-3"]
        .iter()
        .zip(1u8..)
        .map(|(id, host)| ExpectedClient::new(*id, SocketAddr::from(([10, 0, 0, host], 7410))))
        .collect();
    ControllerConfig::new(
        ConveyorGeometry::new(0.5, 5.0).expect("valid geometry"),
        clients,
    )
    .expect("valid config")
}

fn start() -> Harness {
    let store = MemoryRecordStore::new();
    let bus = EventBus::new(256);
    let events = bus.subscribe();
    let (shutdown_tx, _) = broadcast::channel(1);
    let origin = Instant::now();
    let controller = spawn_controller(
        &config(),
        store.clone(),
        &StoreWriterConfig::new("unused"),
        ControllerClock::starting_at(Timestamp::ZERO),
        bus,
        &shutdown_tx,
    );
    Harness {
        controller,
        store,
        events,
        shutdown_tx,
        origin,
    }
}

impl Harness {
    /// Sleeps until `offset` after the controller clock's origin.
    async fn at(&self, offset: Duration) {
        tokio::time::sleep_until(self.origin + offset).await;
    }

    async fn result(&self, client: &str, payload: ResultPayload) {
        self.controller
            .handle
            .edge(ClientId::new(client), EdgeMessage::Result(payload))
            .await
            .expect("controller running");
    }

    async fn next_closed(&mut self) -> ClosedRecord {
        loop {
            match self.events.recv().await.expect("event stream") {
                ControllerEvent::RecordClosed(record) => return record,
                _ => continue,
            }
        }
    }

    async fn finish(self) -> Vec<ClosedRecord> {
        self.shutdown_tx.send(()).ok();
        self.controller.join().await;
        self.store.rows()
    }
}

fn ok() -> ResultPayload {
    ResultPayload::new(Classification::no_defect(), 0.96)
}

fn defect(confidence: f32) -> ResultPayload {
    ResultPayload::new(Classification::defect("crack"), confidence)
}

async fn trigger_at_zero(harness: &Harness) {
    let response = harness
        .controller
        .handle
        .trigger(TriggerPayload::at(Timestamp::ZERO))
        .await
        .expect("controller running");
    match response {
        OperatorResponse::TriggerAccepted { deadline, .. } => {
            assert_eq!(deadline, Timestamp::from_secs(10));
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn missing_result_ejects_at_deadline() {
    let mut harness = start();
    trigger_at_zero(&harness).await;

    harness.at(Duration::from_secs(3)).await;
    harness.result("jetson-1", ok()).await;
    harness.at(Duration::from_secs(9)).await;
    harness.result("jetson-2", ok()).await;

    let closed = harness.next_closed().await;
    assert_eq!(closed.state, RecordState::Expired);
    assert_eq!(closed.decision, Decision::Eject);
    assert_eq!(closed.closed_time, Timestamp::from_secs(10));
    assert_eq!(closed.results.len(), 2);
    assert_eq!(closed.missing_clients(), vec![&ClientId::new("jetson-3")]);

    let rows = harness.finish().await;
    assert_eq!(rows, vec![closed]);
}

#[tokio::test(start_paused = true)]
async fn confident_defect_ejects_when_complete() {
    let mut harness = start();
    trigger_at_zero(&harness).await;

    harness.at(Duration::from_secs(2)).await;
    harness.result("jetson-1", ok()).await;
    harness.at(Duration::from_secs(5)).await;
    harness.result("jetson-2", defect(0.9)).await;
    harness.at(Duration::from_secs(8)).await;
    harness.result("jetson-3", ok()).await;

    let closed = harness.next_closed().await;
    assert_eq!(closed.state, RecordState::Decided);
    assert_eq!(closed.decision, Decision::Eject);
    assert_eq!(closed.closed_time, Timestamp::from_secs(8));

    harness.at(Duration::from_secs(11)).await;
    let rows = harness.finish().await;
    assert_eq!(rows.len(), 1, "the deadline must not close the record again");
}

#[tokio::test(start_paused = true)]
async fn complete_without_confident_defect_passes() {
    let mut harness = start();
    trigger_at_zero(&harness).await;

    harness.at(Duration::from_secs(1)).await;
    harness.result("jetson-1", defect(0.65)).await;
    harness.result("jetson-2", ok()).await;
    harness.at(Duration::from_secs(8)).await;
    harness.result("jetson-3", ok()).await;

    let closed = harness.next_closed().await;
    assert_eq!(closed.decision, Decision::Pass);
    assert_eq!(closed.closed_time, Timestamp::from_secs(8));
    harness.finish().await;
}

#[tokio::test(start_paused = true)]
async fn result_at_deadline_loses_to_expiry() {
    let mut harness = start();
    trigger_at_zero(&harness).await;

    harness.result("jetson-1", ok()).await;
    harness.result("jetson-2", ok()).await;
    harness.at(Duration::from_secs(10)).await;
    harness.result("jetson-3", ok()).await;

    let closed = harness.next_closed().await;
    assert_eq!(closed.state, RecordState::Expired);
    assert_eq!(closed.decision, Decision::Eject);

    let status = harness.controller.handle.status().await.expect("status");
    assert_eq!(status.counters.expired_eject, 1);
    assert_eq!(status.counters.results_unattributable, 1);
    harness.finish().await;
}

#[tokio::test(start_paused = true)]
async fn heartbeat_silence_walks_liveness_down() {
    let harness = start();
    let handle = harness.controller.handle.clone();
    let heartbeat = EdgeMessage::Heartbeat(HeartbeatPayload::new(
        ProcessState::Running,
        SupervisorHealth::default(),
    ));
    handle
        .edge(ClientId::new("jetson-1"), heartbeat)
        .await
        .expect("controller running");

    let liveness_of = |status: &vigil_core::StatusSnapshot| {
        status
            .clients
            .iter()
            .find(|c| c.client_id == ClientId::new("jetson-1"))
            .map(|c| (c.liveness, c.run_state))
            .expect("configured client")
    };

    harness.at(Duration::from_millis(2_900)).await;
    let status = handle.status().await.expect("status");
    assert_eq!(liveness_of(&status), (Liveness::Online, RunState::Running));

    harness.at(Duration::from_millis(3_600)).await;
    let status = handle.status().await.expect("status");
    assert_eq!(liveness_of(&status).0, Liveness::Stale);

    harness.at(Duration::from_millis(10_600)).await;
    let status = handle.status().await.expect("status");
    assert_eq!(liveness_of(&status), (Liveness::Offline, RunState::Stopped));
    harness.finish().await;
}

#[tokio::test(start_paused = true)]
async fn repeated_start_issues_one_command() {
    let mut harness = start();
    let handle = harness.controller.handle.clone();
    let (outbound, mut commands_rx) = mpsc::channel(8);
    handle
        .send(ControllerRequest::Connected {
            conn_id: handle.next_connection_id(),
            client_id: ClientId::new("jetson-2"),
            role: PeerRole::Supervisor,
            addr: SocketAddr::from(([10, 0, 0, 2], 7410)),
            outbound,
        })
        .await
        .expect("controller running");

    let first = handle
        .command(ClientId::new("jetson-2"), Action::Start)
        .await
        .expect("controller running");
    let second = handle
        .command(ClientId::new("jetson-2"), Action::Start)
        .await
        .expect("controller running");

    assert_eq!(
        first,
        OperatorResponse::CommandsIssued {
            issued: vec![ClientId::new("jetson-2")],
            skipped: Vec::new(),
        }
    );
    assert_eq!(
        second,
        OperatorResponse::CommandsIssued {
            issued: Vec::new(),
            skipped: vec![ClientId::new("jetson-2")],
        }
    );

    let Ok(Outgoing::Edge(ControllerMessage::Command(command))) = commands_rx.try_recv() else {
        panic!("start must reach the connected supervisor");
    };
    assert_eq!(command.action, Action::Start);
    assert!(commands_rx.try_recv().is_err());

    let mut delivered_commands = 0;
    while let Ok(event) = harness.events.try_recv() {
        if let ControllerEvent::CommandIssued { delivered, .. } = event {
            assert!(delivered);
            delivered_commands += 1;
        }
    }
    assert_eq!(delivered_commands, 1);
    harness.finish().await;
}

#[tokio::test(start_paused = true)]
async fn undelivered_start_can_be_reissued() {
    let mut harness = start();
    let handle = harness.controller.handle.clone();

    for _ in 0..2 {
        let response = handle
            .command(ClientId::new("jetson-2"), Action::Start)
            .await
            .expect("controller running");
        assert_eq!(
            response,
            OperatorResponse::CommandsIssued {
                issued: vec![ClientId::new("jetson-2")],
                skipped: Vec::new(),
            }
        );
    }

    let status = handle.status().await.expect("status");
    let run_state = status
        .clients
        .iter()
        .find(|c| c.client_id == ClientId::new("jetson-2"))
        .map(|c| c.run_state);
    assert_eq!(run_state, Some(RunState::Stopped));

    let mut undelivered = 0;
    while let Ok(event) = harness.events.try_recv() {
        if let ControllerEvent::CommandIssued { delivered, .. } = event {
            assert!(!delivered, "no supervisor is connected");
            undelivered += 1;
        }
    }
    assert_eq!(undelivered, 2);
    harness.finish().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_abandons_open_records() {
    let harness = start();
    trigger_at_zero(&harness).await;
    harness.at(Duration::from_secs(1)).await;

    let rows = harness.finish().await;
    assert!(rows.is_empty());
}
