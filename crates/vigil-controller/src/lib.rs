//! Bottle-inspection controller: tracks each bottle from the entry sensor to
//! the decision point, aggregates edge inference results into a PASS/EJECT
//! decision, and supervises the edge clients that produce them.

pub mod clients;
pub mod config;
pub mod correlation;
pub mod decision;
pub mod dispatcher;
pub mod engine;
pub mod handler;
pub mod liveness;
pub mod observer;
pub mod router;
pub mod runtime;
pub mod schedule;
pub mod server;
pub mod store;
pub mod tracker;

pub use clients::{ClientState, ClientTable};
pub use config::{ControllerConfig, ConveyorGeometry, ExpectedClient, LivenessThresholds};
pub use correlation::{Attribution, CorrelationPolicy, DropReason, OldestOpenFirst};
pub use decision::{ConfidenceThresholds, decide_complete, decide_timeout};
pub use dispatcher::{CommandDispatcher, Dispatch};
pub use engine::{ControllerEngine, Effects, ResultOutcome};
pub use liveness::LivenessMonitor;
pub use observer::{ControllerEvent, Counters, EventBus, ResultDropKind};
pub use runtime::{ControllerClock, ControllerHandle, RunningController, spawn_controller};
pub use server::ControllerServer;
pub use store::{
    JsonlRecordStore, MemoryRecordStore, RecordStore, StoreHealth, StoreWriterConfig, read_records,
};
pub use tracker::{BottleTracker, TrackingRecord};
