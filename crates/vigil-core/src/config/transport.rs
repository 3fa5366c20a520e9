use serde::{Deserialize, Serialize};

use super::env_override;
use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfigFile {
    pub max_message_size: usize,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub nodelay: bool,
}

impl Default for TransportConfigFile {
    fn default() -> Self {
        Self {
            max_message_size: 16 * 1024 * 1024,
            connect_timeout_ms: 10_000,
            read_timeout_ms: 30_000,
            write_timeout_ms: 30_000,
            nodelay: true,
        }
    }
}

impl TransportConfigFile {
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        env_override("VIGIL_TRANSPORT_MAX_MESSAGE_SIZE", &mut self.max_message_size)?;
        env_override("VIGIL_TRANSPORT_CONNECT_TIMEOUT", &mut self.connect_timeout_ms)?;
        env_override("VIGIL_TRANSPORT_WRITE_TIMEOUT", &mut self.write_timeout_ms)?;
        env_override("VIGIL_TRANSPORT_NODELAY", &mut self.nodelay)?;
        Ok(())
    }
}
