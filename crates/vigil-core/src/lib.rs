//! Shared vocabulary of the vigil inspection controller: identifiers, wire
//! protocol, errors, transport traits and the configuration file model.

pub mod backoff;
pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use backoff::{BackoffPolicy, Jitter};

pub use config::{
    ClientEntry, ControllerConfigFile, LoggingConfigFile, StoreConfigFile, SupervisorConfigFile,
    TransportConfigFile, VigilConfig,
};

pub use error::{
    CodecError, ConfigError, ControllerError, DispatchError, StoreError, TrackerError,
    TransportError,
};

pub use traits::{Codec, FramedTransport, Listener, TransportFactory};

pub use types::{
    Action, Classification, ClientId, ClientStatus, ClosedRecord, Command, ControllerMessage,
    CounterSnapshot, Decision, EdgeMessage, HeartbeatPayload, Hello, Incoming, InspectionResult,
    Liveness, NO_DEFECT_CATEGORY, OperatorRequest, OperatorResponse, Outgoing, PeerRole,
    ProcessState, RecordId, RecordState, ResultPayload, RunState, StatusSnapshot,
    SupervisorHealth, Timestamp, Topic, TriggerPayload, error_codes,
};
