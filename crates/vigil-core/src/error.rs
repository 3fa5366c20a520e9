use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::{ClientId, RecordId};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed to '{addr}': {reason}")]
    ConnectionFailed { addr: String, reason: String },

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    RecvFailed(String),

    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    #[error("Connection closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Encode failed: {0}")]
    EncodeFailed(String),

    #[error("Decode failed: {0}")]
    DecodeFailed(String),

    #[error("Message too large: {size} bytes exceeds limit of {limit} bytes")]
    MessageTooLarge { size: usize, limit: usize },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid config value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Missing required config: {0}")]
    MissingRequired(String),
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrackerError {
    #[error("Duplicate trigger: record {0} is still open")]
    DuplicateTrigger(RecordId),

    #[error("Record {0} is not open")]
    NotOpen(RecordId),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Unknown client: {0}")]
    UnknownClient(ClientId),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record store I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize record {id}: {reason}")]
    Serialize { id: RecordId, reason: String },

    #[error("Corrupt row {line} in record store: {reason}")]
    CorruptRow { line: usize, reason: String },

    #[error("Record store is closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Controller is shutting down")]
    ShuttingDown,

    #[error("Failed to bind controller listener on {addr}: {reason}")]
    BindFailed { addr: String, reason: String },

    #[error("Tracker error: {0}")]
    Tracker(#[from] TrackerError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Protocol violation: {0}")]
    Protocol(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = TrackerError::DuplicateTrigger(RecordId::new(7));
        assert_eq!(err.to_string(), "Duplicate trigger: record 7 is still open");

        let err = DispatchError::UnknownClient(ClientId::new("jetson-9"));
        assert_eq!(err.to_string(), "Unknown client: jetson-9");

        let err = ConfigError::invalid("controller.conveyor_speed_mps", "must be positive");
        assert_eq!(
            err.to_string(),
            "Invalid config value for 'controller.conveyor_speed_mps': must be positive"
        );
    }

    #[test]
    fn controller_error_wraps_sources() {
        let err: ControllerError = TrackerError::NotOpen(RecordId::new(3)).into();
        assert!(matches!(err, ControllerError::Tracker(_)));

        let err: ControllerError = TransportError::Closed.into();
        assert_eq!(err.to_string(), "Transport error: Connection closed");
    }
}
