use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::time::Duration;

use vigil_core::{ClientId, ConfigError, ControllerConfigFile, Timestamp};

use crate::decision::ConfidenceThresholds;

/// Static conveyor geometry. The travel time from the entry sensor to the
/// decision point fixes every record's deadline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConveyorGeometry {
    speed_mps: f64,
    distance_m: f64,
}

impl ConveyorGeometry {
    pub fn new(speed_mps: f64, distance_m: f64) -> Result<Self, ConfigError> {
        if !speed_mps.is_finite() || speed_mps <= 0.0 {
            return Err(ConfigError::invalid(
                "controller.conveyor_speed_mps",
                format!("must be a positive finite number, got {speed_mps}"),
            ));
        }
        if !distance_m.is_finite() || distance_m <= 0.0 {
            return Err(ConfigError::invalid(
                "controller.decision_distance_m",
                format!("must be a positive finite number, got {distance_m}"),
            ));
        }
        Ok(Self {
            speed_mps,
            distance_m,
        })
    }

    #[must_use]
    pub const fn speed_mps(&self) -> f64 {
        self.speed_mps
    }

    #[must_use]
    pub const fn distance_m(&self) -> f64 {
        self.distance_m
    }

    #[must_use]
    pub fn travel_time(&self) -> Duration {
        Duration::try_from_secs_f64(self.distance_m / self.speed_mps).unwrap_or(Duration::MAX)
    }

    #[must_use]
    pub fn deadline_after(&self, trigger_time: Timestamp) -> Timestamp {
        trigger_time.saturating_add(self.travel_time())
    }
}

/// `ONLINE` below `online`, `STALE` up to `offline`, `OFFLINE` from there on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessThresholds {
    pub online: Duration,
    pub offline: Duration,
}

impl LivenessThresholds {
    pub fn new(online: Duration, offline: Duration) -> Result<Self, ConfigError> {
        if online.is_zero() {
            return Err(ConfigError::invalid(
                "controller.online_threshold_ms",
                "must be greater than zero",
            ));
        }
        if offline <= online {
            return Err(ConfigError::invalid(
                "controller.offline_threshold_ms",
                format!(
                    "offline threshold ({}ms) must be greater than online threshold ({}ms)",
                    offline.as_millis(),
                    online.as_millis()
                ),
            ));
        }
        Ok(Self { online, offline })
    }
}

impl Default for LivenessThresholds {
    fn default() -> Self {
        Self {
            online: Duration::from_secs(3),
            offline: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedClient {
    pub id: ClientId,
    pub address: SocketAddr,
}

impl ExpectedClient {
    #[must_use]
    pub fn new(id: impl Into<ClientId>, address: SocketAddr) -> Self {
        Self {
            id: id.into(),
            address,
        }
    }
}

/// Validated controller settings, fixed for the life of the process.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub listen_addr: SocketAddr,
    pub geometry: ConveyorGeometry,
    pub liveness: LivenessThresholds,
    pub sweep_interval: Duration,
    pub thresholds: ConfidenceThresholds,
    pub clients: Vec<ExpectedClient>,
    pub closed_history: usize,
}

impl ControllerConfig {
    pub fn new(
        geometry: ConveyorGeometry,
        clients: Vec<ExpectedClient>,
    ) -> Result<Self, ConfigError> {
        validate_clients(&clients)?;
        Ok(Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 7400)),
            geometry,
            liveness: LivenessThresholds::default(),
            sweep_interval: Duration::from_millis(500),
            thresholds: ConfidenceThresholds::default(),
            clients,
            closed_history: 256,
        })
    }

    #[must_use]
    pub const fn with_listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = addr;
        self
    }

    #[must_use]
    pub const fn with_liveness(mut self, liveness: LivenessThresholds) -> Self {
        self.liveness = liveness;
        self
    }

    #[must_use]
    pub const fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    #[must_use]
    pub fn with_thresholds(mut self, thresholds: ConfidenceThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    #[must_use]
    pub const fn with_closed_history(mut self, len: usize) -> Self {
        self.closed_history = len;
        self
    }

    #[must_use]
    pub fn client_ids(&self) -> Vec<ClientId> {
        self.clients.iter().map(|c| c.id.clone()).collect()
    }
}

fn validate_clients(clients: &[ExpectedClient]) -> Result<(), ConfigError> {
    if clients.is_empty() {
        return Err(ConfigError::invalid(
            "controller.clients",
            "at least one expected client is required",
        ));
    }
    let mut seen = HashSet::new();
    for client in clients {
        if client.id.as_str().trim().is_empty() {
            return Err(ConfigError::invalid(
                "controller.clients",
                "client id must not be empty",
            ));
        }
        if !seen.insert(&client.id) {
            return Err(ConfigError::invalid(
                "controller.clients",
                format!("duplicate client id '{}'", client.id),
            ));
        }
    }
    Ok(())
}

fn parse_addr(key: &str, raw: &str) -> Result<SocketAddr, ConfigError> {
    raw.parse()
        .map_err(|_| ConfigError::invalid(key, format!("'{raw}' is not a valid socket address")))
}

fn positive_millis(key: &str, ms: u64) -> Result<Duration, ConfigError> {
    if ms == 0 {
        return Err(ConfigError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_millis(ms))
}

impl TryFrom<&ControllerConfigFile> for ControllerConfig {
    type Error = ConfigError;

    fn try_from(file: &ControllerConfigFile) -> Result<Self, Self::Error> {
        let listen_addr = parse_addr("controller.listen_addr", &file.listen_addr)?;
        let geometry = ConveyorGeometry::new(file.conveyor_speed_mps, file.decision_distance_m)?;
        let liveness = LivenessThresholds::new(
            Duration::from_millis(file.online_threshold_ms),
            Duration::from_millis(file.offline_threshold_ms),
        )?;
        let sweep_interval = positive_millis("controller.sweep_interval_ms", file.sweep_interval_ms)?;

        let class_thresholds: BTreeMap<String, f32> = file.class_thresholds.clone();
        let thresholds =
            ConfidenceThresholds::new(file.default_confidence_threshold, class_thresholds)?;

        let clients = file
            .clients
            .iter()
            .map(|entry| {
                let address = parse_addr(
                    &format!("controller.clients.{}.address", entry.id),
                    &entry.address,
                )?;
                Ok(ExpectedClient::new(entry.id.as_str(), address))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self::new(geometry, clients)?
            .with_listen_addr(listen_addr)
            .with_liveness(liveness)
            .with_sweep_interval(sweep_interval)
            .with_thresholds(thresholds)
            .with_closed_history(file.closed_history))
    }
}
