use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::client::{Liveness, ProcessState, RunState, SupervisorHealth};
use crate::types::command::{Action, Command};
use crate::types::id::{ClientId, RecordId};
use crate::types::inspection::Classification;
use crate::types::time::Timestamp;

/// Logical channel names. The transport carries every topic over one framed
/// connection per peer; the names are kept for logging and for bridging to a
/// broker-based deployment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    Command(ClientId),
    Result(ClientId),
    Heartbeat(ClientId),
    Telemetry(ClientId),
    SupervisorStatus,
    SensorTrigger,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command(id) => write!(f, "vigil/client/{id}/command"),
            Self::Result(id) => write!(f, "vigil/client/{id}/result"),
            Self::Heartbeat(id) => write!(f, "vigil/client/{id}/heartbeat"),
            Self::Telemetry(id) => write!(f, "vigil/client/{id}/telemetry"),
            Self::SupervisorStatus => write!(f, "vigil/status/supervisor"),
            Self::SensorTrigger => write!(f, "vigil/sensor/trigger"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeerRole {
    Supervisor,
    Inference,
    Sensor,
}

impl fmt::Display for PeerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Supervisor => write!(f, "supervisor"),
            Self::Inference => write!(f, "inference"),
            Self::Sensor => write!(f, "sensor"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    pub client_id: ClientId,
    pub role: PeerRole,
}

impl Hello {
    #[must_use]
    pub const fn new(client_id: ClientId, role: PeerRole) -> Self {
        Self { client_id, role }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatPayload {
    pub process_state: ProcessState,
    pub health: SupervisorHealth,
    pub sent_time: Timestamp,
}

impl HeartbeatPayload {
    #[must_use]
    pub const fn new(process_state: ProcessState, health: SupervisorHealth) -> Self {
        Self {
            process_state,
            health,
            sent_time: Timestamp::ZERO,
        }
    }

    #[must_use]
    pub const fn with_sent_time(mut self, sent_time: Timestamp) -> Self {
        self.sent_time = sent_time;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultPayload {
    pub classification: Classification,
    pub confidence: f32,
    pub captured_time: Option<Timestamp>,
    pub record_ref: Option<RecordId>,
}

impl ResultPayload {
    #[must_use]
    pub const fn new(classification: Classification, confidence: f32) -> Self {
        Self {
            classification,
            confidence,
            captured_time: None,
            record_ref: None,
        }
    }

    #[must_use]
    pub const fn with_record_ref(mut self, record: RecordId) -> Self {
        self.record_ref = Some(record);
        self
    }

    #[must_use]
    pub const fn with_captured_time(mut self, captured: Timestamp) -> Self {
        self.captured_time = Some(captured);
        self
    }
}

/// Sensor trigger. A missing time is stamped on arrival; a missing id is
/// allocated by the tracker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerPayload {
    pub trigger_time: Option<Timestamp>,
    pub record_id: Option<RecordId>,
}

impl TriggerPayload {
    #[must_use]
    pub const fn at(trigger_time: Timestamp) -> Self {
        Self {
            trigger_time: Some(trigger_time),
            record_id: None,
        }
    }

    #[must_use]
    pub const fn with_record_id(mut self, record_id: RecordId) -> Self {
        self.record_id = Some(record_id);
        self
    }
}

/// Messages published by edge peers (supervisors, inference clients, sensors).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EdgeMessage {
    Hello(Hello),
    Heartbeat(HeartbeatPayload),
    Result(ResultPayload),
    Crashed { reason: String },
    Stopped,
    Telemetry { kind: String, payload: Vec<u8> },
    Trigger(TriggerPayload),
}

impl EdgeMessage {
    #[must_use]
    pub fn topic(&self, client_id: &ClientId) -> Topic {
        match self {
            Self::Hello(_) | Self::Crashed { .. } | Self::Stopped => Topic::SupervisorStatus,
            Self::Heartbeat(_) => Topic::Heartbeat(client_id.clone()),
            Self::Result(_) => Topic::Result(client_id.clone()),
            Self::Telemetry { .. } => Topic::Telemetry(client_id.clone()),
            Self::Trigger(_) => Topic::SensorTrigger,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerMessage {
    Welcome { client_id: ClientId },
    Command(Command),
    Error { code: u32, message: String },
}

impl ControllerMessage {
    #[must_use]
    pub fn error(code: u32, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatorRequest {
    GetStatus,
    Command { client_id: ClientId, action: Action },
    CommandAll { action: Action },
    Trigger(TriggerPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OperatorResponse {
    Status(StatusSnapshot),
    CommandsIssued { issued: Vec<ClientId>, skipped: Vec<ClientId> },
    TriggerAccepted { record_id: RecordId, deadline: Timestamp },
    Error { code: u32, message: String },
}

impl OperatorResponse {
    #[must_use]
    pub fn error(code: u32, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientStatus {
    pub client_id: ClientId,
    pub liveness: Liveness,
    pub run_state: RunState,
    pub heartbeat_age_ms: Option<u64>,
    pub process_state: Option<ProcessState>,
    pub connected: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub triggers: u64,
    pub duplicate_triggers: u64,
    pub decided_pass: u64,
    pub decided_eject: u64,
    pub expired_eject: u64,
    pub results_accepted: u64,
    pub results_duplicate: u64,
    pub results_unattributable: u64,
    pub results_late: u64,
    pub results_malformed: u64,
    pub unknown_client_messages: u64,
    pub store_failures: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub taken_at: Timestamp,
    pub clients: Vec<ClientStatus>,
    pub open_records: usize,
    pub counters: CounterSnapshot,
    pub store_degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Incoming {
    Edge(EdgeMessage),
    Operator(OperatorRequest),
}

impl From<EdgeMessage> for Incoming {
    fn from(msg: EdgeMessage) -> Self {
        Self::Edge(msg)
    }
}

impl From<OperatorRequest> for Incoming {
    fn from(msg: OperatorRequest) -> Self {
        Self::Operator(msg)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Outgoing {
    Edge(ControllerMessage),
    Operator(OperatorResponse),
}

impl From<ControllerMessage> for Outgoing {
    fn from(msg: ControllerMessage) -> Self {
        Self::Edge(msg)
    }
}

impl From<OperatorResponse> for Outgoing {
    fn from(msg: OperatorResponse) -> Self {
        Self::Operator(msg)
    }
}

pub mod error_codes {
    pub const NOT_INTRODUCED: u32 = 1000;
    pub const UNKNOWN_CLIENT: u32 = 1001;
    pub const DUPLICATE_TRIGGER: u32 = 1002;
    pub const INVALID_REQUEST: u32 = 1004;
    pub const SHUTTING_DOWN: u32 = 1005;
    pub const INTERNAL_ERROR: u32 = 5000;
}
