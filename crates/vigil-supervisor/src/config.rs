use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use vigil_core::{BackoffPolicy, ClientId, ConfigError, SupervisorConfigFile};

/// How to launch the managed inference process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl ProcessSpec {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub client_id: ClientId,
    pub controller_addr: SocketAddr,
    pub process: ProcessSpec,
    pub heartbeat_interval: Duration,
    pub stop_grace: Duration,
    pub pid_file: PathBuf,
    pub reconnect: BackoffPolicy,
}

impl SupervisorConfig {
    #[must_use]
    pub fn new(client_id: impl Into<ClientId>, controller_addr: SocketAddr, process: ProcessSpec) -> Self {
        Self {
            client_id: client_id.into(),
            controller_addr,
            process,
            heartbeat_interval: Duration::from_secs(1),
            stop_grace: Duration::from_secs(5),
            pid_file: PathBuf::from("vigil-inference.pid"),
            reconnect: BackoffPolicy::new(Duration::from_millis(200), Duration::from_secs(10)),
        }
    }

    #[must_use]
    pub const fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    #[must_use]
    pub fn with_pid_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.pid_file = path.into();
        self
    }

    #[must_use]
    pub const fn with_reconnect(mut self, policy: BackoffPolicy) -> Self {
        self.reconnect = policy;
        self
    }
}

impl TryFrom<&SupervisorConfigFile> for SupervisorConfig {
    type Error = ConfigError;

    fn try_from(file: &SupervisorConfigFile) -> Result<Self, Self::Error> {
        if file.client_id.trim().is_empty() {
            return Err(ConfigError::MissingRequired("supervisor.client_id".to_string()));
        }
        if file.program.trim().is_empty() {
            return Err(ConfigError::MissingRequired("supervisor.program".to_string()));
        }
        if file.pid_file.trim().is_empty() {
            return Err(ConfigError::MissingRequired("supervisor.pid_file".to_string()));
        }
        let controller_addr: SocketAddr = file
            .controller_addr
            .parse()
            .map_err(|e| ConfigError::invalid("supervisor.controller_addr", format!("{e}")))?;

        for (key, value) in [
            ("supervisor.heartbeat_interval_ms", file.heartbeat_interval_ms),
            ("supervisor.reconnect_first_ms", file.reconnect_first_ms),
            ("supervisor.reconnect_max_ms", file.reconnect_max_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(key, "must be positive"));
            }
        }
        if file.reconnect_first_ms > file.reconnect_max_ms {
            return Err(ConfigError::invalid(
                "supervisor.reconnect_first_ms",
                "must not exceed reconnect_max_ms",
            ));
        }

        Ok(Self::new(
            file.client_id.as_str(),
            controller_addr,
            ProcessSpec::new(&file.program).with_args(file.args.iter().cloned()),
        )
        .with_heartbeat_interval(Duration::from_millis(file.heartbeat_interval_ms))
        .with_stop_grace(Duration::from_millis(file.stop_grace_ms))
        .with_pid_file(&file.pid_file)
        .with_reconnect(BackoffPolicy::new(
            Duration::from_millis(file.reconnect_first_ms),
            Duration::from_millis(file.reconnect_max_ms),
        )))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn from_default_file() {
        let config =
            SupervisorConfig::try_from(&SupervisorConfigFile::default()).expect("valid defaults");
        assert_eq!(config.client_id, ClientId::new("jetson-1"));
        assert_eq!(config.controller_addr, SocketAddr::from(([127, 0, 0, 1], 7400)));
        assert_eq!(config.process.program, "python3");
        assert_eq!(config.process.args, vec!["inference.py".to_string()]);
        assert_eq!(config.stop_grace, Duration::from_secs(5));
        assert_eq!(config.reconnect.first, Duration::from_millis(200));
    }

    #[test]
    fn builder_pattern() {
        let config = SupervisorConfig::new(
            "jetson-2",
            SocketAddr::from(([10, 0, 0, 1], 7400)),
            ProcessSpec::new("sleep").with_args(["30"]),
        )
        .with_heartbeat_interval(Duration::from_millis(250))
        .with_stop_grace(Duration::from_millis(500))
        .with_pid_file("/tmp/jetson-2.pid");

        assert_eq!(config.heartbeat_interval, Duration::from_millis(250));
        assert_eq!(config.stop_grace, Duration::from_millis(500));
        assert_eq!(config.pid_file, PathBuf::from("/tmp/jetson-2.pid"));
    }

    #[test]
    fn rejects_bad_values() {
        let file = SupervisorConfigFile {
            controller_addr: "controller:7400".to_string(),
            ..SupervisorConfigFile::default()
        };
        let err = SupervisorConfig::try_from(&file).expect_err("hostname is not an address");
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "supervisor.controller_addr"));

        let file = SupervisorConfigFile {
            heartbeat_interval_ms: 0,
            ..SupervisorConfigFile::default()
        };
        assert!(SupervisorConfig::try_from(&file).is_err());

        let file = SupervisorConfigFile {
            program: " ".to_string(),
            ..SupervisorConfigFile::default()
        };
        assert!(matches!(
            SupervisorConfig::try_from(&file),
            Err(ConfigError::MissingRequired(_))
        ));

        let file = SupervisorConfigFile {
            reconnect_first_ms: 20_000,
            ..SupervisorConfigFile::default()
        };
        assert!(SupervisorConfig::try_from(&file).is_err());
    }
}
