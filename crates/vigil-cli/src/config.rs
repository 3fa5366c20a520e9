use std::path::{Path, PathBuf};

use vigil_controller::{ControllerConfig, StoreWriterConfig};
use vigil_core::{ConfigError, VigilConfig};
use vigil_supervisor::SupervisorConfig;

pub const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
pub const VALID_FORMATS: [&str; 3] = ["pretty", "json", "compact"];

pub trait VigilConfigLoader: Sized {
    /// Load configuration from the given path, or from default locations if `None`.
    fn load(path: Option<&Path>) -> Result<Self, ConfigError>;

    /// Load configuration from a specific file path.
    fn from_file(path: &Path) -> Result<Self, ConfigError>;

    /// Validate the configuration values.
    fn validate(&self) -> Result<(), ConfigError>;

    /// Serialize the configuration to a TOML string.
    fn to_toml(&self) -> Result<String, ConfigError>;

    /// Generate a default configuration file with comments.
    fn generate_default_config() -> String;
}

impl VigilConfigLoader for VigilConfig {
    fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = if let Some(p) = path {
            Self::from_file(p)?
        } else {
            load_from_default_locations()?
        };

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::ParseError(format!("Failed to read config file: {e}"))
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Every section is checked by converting it into its typed runtime
    /// config, so the rules live next to the types that rely on them.
    fn validate(&self) -> Result<(), ConfigError> {
        ControllerConfig::try_from(&self.controller)?;
        SupervisorConfig::try_from(&self.supervisor)?;
        StoreWriterConfig::try_from(&self.store)?;

        if self.transport.max_message_size == 0 {
            return Err(ConfigError::invalid(
                "transport.max_message_size",
                "must be positive",
            ));
        }

        if !VALID_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::invalid(
                "logging.level",
                format!("must be one of: {}", VALID_LEVELS.join(", ")),
            ));
        }

        if !VALID_FORMATS.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(ConfigError::invalid(
                "logging.format",
                format!("must be one of: {}", VALID_FORMATS.join(", ")),
            ));
        }

        Ok(())
    }

    fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    fn generate_default_config() -> String {
        let config = Self::default();
        let toml_str = toml::to_string_pretty(&config).unwrap_or_default();

        format!(
            "# Vigil Configuration File\n\
             #\n\
             # Deadline = decision_distance_m / conveyor_speed_mps after each trigger.\n\
             # Every [[controller.clients]] entry must report before the deadline\n\
             # or the item is ejected.\n\
             \n\
             {toml_str}"
        )
    }
}

fn load_from_default_locations() -> Result<VigilConfig, ConfigError> {
    let local_config = PathBuf::from("vigil.toml");
    if local_config.exists() {
        return VigilConfig::from_file(&local_config);
    }

    if let Some(config_dir) = dirs::config_dir() {
        let user_config = config_dir.join("vigil").join("config.toml");
        if user_config.exists() {
            return VigilConfig::from_file(&user_config);
        }
    }

    Ok(VigilConfig::default())
}
