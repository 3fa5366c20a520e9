use serde::{Deserialize, Serialize};

use super::env_override;
use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfigFile {
    pub path: String,
    pub queue_capacity: usize,
    pub retry_first_ms: u64,
    pub retry_max_ms: u64,
    /// Consecutive failed attempts before the store is reported degraded.
    pub degrade_after_attempts: u32,
}

impl Default for StoreConfigFile {
    fn default() -> Self {
        Self {
            path: "vigil-records.jsonl".to_string(),
            queue_capacity: 1_024,
            retry_first_ms: 100,
            retry_max_ms: 5_000,
            degrade_after_attempts: 3,
        }
    }
}

impl StoreConfigFile {
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(val) = std::env::var("VIGIL_STORE_PATH") {
            self.path = val;
        }
        env_override("VIGIL_STORE_RETRY_FIRST_MS", &mut self.retry_first_ms)?;
        env_override("VIGIL_STORE_RETRY_MAX_MS", &mut self.retry_max_ms)?;
        Ok(())
    }
}
