use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::env_override;
use crate::error::ConfigError;

/// One expected inference client and the address it is deployed at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientEntry {
    pub id: String,
    pub address: String,
}

impl ClientEntry {
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfigFile {
    pub listen_addr: String,
    pub conveyor_speed_mps: f64,
    pub decision_distance_m: f64,
    pub online_threshold_ms: u64,
    pub offline_threshold_ms: u64,
    pub sweep_interval_ms: u64,
    pub default_confidence_threshold: f32,
    pub closed_history: usize,
    pub class_thresholds: BTreeMap<String, f32>,
    pub clients: Vec<ClientEntry>,
}

impl Default for ControllerConfigFile {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:7400".to_string(),
            conveyor_speed_mps: 0.5,
            decision_distance_m: 5.0,
            online_threshold_ms: 3_000,
            offline_threshold_ms: 10_000,
            sweep_interval_ms: 500,
            default_confidence_threshold: 0.7,
            closed_history: 256,
            class_thresholds: BTreeMap::new(),
            clients: vec![
                ClientEntry::new("jetson-1", "192.168.10.11:7410"),
                ClientEntry::new("jetson-2", "192.168.10.12:7410"),
                ClientEntry::new("jetson-3", "192.168.10.13:7410"),
            ],
        }
    }
}

impl ControllerConfigFile {
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(val) = std::env::var("VIGIL_CONTROLLER_LISTEN_ADDR") {
            self.listen_addr = val;
        }
        env_override("VIGIL_CONVEYOR_SPEED_MPS", &mut self.conveyor_speed_mps)?;
        env_override("VIGIL_DECISION_DISTANCE_M", &mut self.decision_distance_m)?;
        env_override("VIGIL_ONLINE_THRESHOLD_MS", &mut self.online_threshold_ms)?;
        env_override("VIGIL_OFFLINE_THRESHOLD_MS", &mut self.offline_threshold_ms)?;
        env_override("VIGIL_SWEEP_INTERVAL_MS", &mut self.sweep_interval_ms)?;
        env_override(
            "VIGIL_DEFAULT_CONFIDENCE_THRESHOLD",
            &mut self.default_confidence_threshold,
        )?;
        if let Ok(val) = std::env::var("VIGIL_CONTROLLER_CLIENTS") {
            self.clients = parse_client_list(&val)?;
        }
        Ok(())
    }
}

/// Parses `id=host:port` pairs separated by commas.
fn parse_client_list(raw: &str) -> Result<Vec<ClientEntry>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| {
            pair.split_once('=')
                .map(|(id, addr)| ClientEntry::new(id.trim(), addr.trim()))
                .ok_or_else(|| {
                    ConfigError::invalid(
                        "VIGIL_CONTROLLER_CLIENTS",
                        format!("'{pair}' is not of the form id=host:port"),
                    )
                })
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = ControllerConfigFile::default();
        assert_eq!(config.listen_addr, "0.0.0.0:7400");
        assert_eq!(config.online_threshold_ms, 3_000);
        assert_eq!(config.offline_threshold_ms, 10_000);
        assert_eq!(config.clients.len(), 3);
        assert!(config.class_thresholds.is_empty());
    }

    #[test]
    fn class_thresholds_from_toml() {
        let config: ControllerConfigFile = toml::from_str(
            r#"
            default_confidence_threshold = 0.6

            [class_thresholds]
            crack = 0.8
            label = 0.5

            [[clients]]
            id = "cam-a"
            address = "10.0.0.5:7410"
            "#,
        )
        .unwrap();
        assert_eq!(config.class_thresholds.get("crack"), Some(&0.8));
        assert_eq!(config.clients, vec![ClientEntry::new("cam-a", "10.0.0.5:7410")]);
    }

    #[test]
    fn client_list_parsing() {
        let clients = parse_client_list("a=10.0.0.1:1, b = 10.0.0.2:2,").unwrap();
        assert_eq!(
            clients,
            vec![
                ClientEntry::new("a", "10.0.0.1:1"),
                ClientEntry::new("b", "10.0.0.2:2"),
            ]
        );
        assert!(parse_client_list("a:10.0.0.1:1").is_err());
    }
}
