use std::path::PathBuf;

use thiserror::Error;
use vigil_core::{CodecError, ConfigError, TransportError};
use vigil_message_bincode::ChannelError;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to signal process {pid}: {reason}")]
    Signal { pid: u32, reason: String },

    #[error("Pid file error at {}: {source}", path.display())]
    PidFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to wait for process: {0}")]
    Wait(#[source] std::io::Error),

    #[error("Introduction rejected by controller (code {code}): {message}")]
    Rejected { code: u32, message: String },

    #[error("Unexpected message from controller: {0}")]
    UnexpectedMessage(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Shutdown requested")]
    Shutdown,
}

impl SupervisorError {
    pub fn signal(pid: u32, reason: impl Into<String>) -> Self {
        Self::Signal {
            pid,
            reason: reason.into(),
        }
    }

    pub fn pid_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::PidFile {
            path: path.into(),
            source,
        }
    }

    /// Whether the controller link should be re-established after this error.
    #[must_use]
    pub const fn is_link_failure(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Codec(_) | Self::UnexpectedMessage(_)
        )
    }
}

impl From<ChannelError> for SupervisorError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::Transport(e) => Self::Transport(e),
            ChannelError::Codec(e) => Self::Codec(e),
        }
    }
}
