mod controller;
mod logging;
mod store;
mod supervisor;
mod transport;

pub use controller::{ClientEntry, ControllerConfigFile};
pub use logging::LoggingConfigFile;
pub use store::StoreConfigFile;
pub use supervisor::SupervisorConfigFile;
pub use transport::TransportConfigFile;

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VigilConfig {
    pub controller: ControllerConfigFile,
    pub supervisor: SupervisorConfigFile,
    pub transport: TransportConfigFile,
    pub store: StoreConfigFile,
    pub logging: LoggingConfigFile,
}

impl VigilConfig {
    /// Applies every `VIGIL_*` override. An unparseable value is an error.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.controller.apply_env_overrides()?;
        self.supervisor.apply_env_overrides()?;
        self.transport.apply_env_overrides()?;
        self.store.apply_env_overrides()?;
        self.logging.apply_env_overrides();
        Ok(())
    }
}

pub(crate) fn env_override<T>(var: &str, slot: &mut T) -> Result<(), ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    if let Ok(val) = std::env::var(var) {
        *slot = val
            .parse()
            .map_err(|e| ConfigError::invalid(var, format!("'{val}': {e}")))?;
    }
    Ok(())
}
