use serde::{Deserialize, Serialize};

use super::env_override;
use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfigFile {
    pub client_id: String,
    pub controller_addr: String,
    pub program: String,
    pub args: Vec<String>,
    pub heartbeat_interval_ms: u64,
    pub stop_grace_ms: u64,
    pub pid_file: String,
    pub reconnect_first_ms: u64,
    pub reconnect_max_ms: u64,
}

impl Default for SupervisorConfigFile {
    fn default() -> Self {
        Self {
            client_id: "jetson-1".to_string(),
            controller_addr: "127.0.0.1:7400".to_string(),
            program: "python3".to_string(),
            args: vec!["inference.py".to_string()],
            heartbeat_interval_ms: 1_000,
            stop_grace_ms: 5_000,
            pid_file: "vigil-inference.pid".to_string(),
            reconnect_first_ms: 200,
            reconnect_max_ms: 10_000,
        }
    }
}

impl SupervisorConfigFile {
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(val) = std::env::var("VIGIL_CLIENT_ID") {
            self.client_id = val;
        }
        if let Ok(val) = std::env::var("VIGIL_CONTROLLER_ADDR") {
            self.controller_addr = val;
        }
        if let Ok(val) = std::env::var("VIGIL_SUPERVISOR_PROGRAM") {
            self.program = val;
        }
        if let Ok(val) = std::env::var("VIGIL_SUPERVISOR_PID_FILE") {
            self.pid_file = val;
        }
        env_override(
            "VIGIL_SUPERVISOR_HEARTBEAT_INTERVAL_MS",
            &mut self.heartbeat_interval_ms,
        )?;
        env_override("VIGIL_SUPERVISOR_STOP_GRACE_MS", &mut self.stop_grace_ms)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = SupervisorConfigFile::default();
        assert_eq!(config.controller_addr, "127.0.0.1:7400");
        assert_eq!(config.stop_grace_ms, 5_000);
        assert_eq!(config.heartbeat_interval_ms, 1_000);
    }

    #[test]
    fn serde_roundtrip() {
        let config = SupervisorConfigFile::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: SupervisorConfigFile = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.client_id, config.client_id);
        assert_eq!(parsed.args, config.args);
    }
}
