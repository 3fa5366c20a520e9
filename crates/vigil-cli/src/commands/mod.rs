pub mod config;
pub mod control;
pub mod controller;
pub mod records;
pub mod status;
pub mod supervisor;
pub mod trigger;

pub use config::run_config;
pub use control::run_control;
pub use controller::run_controller;
pub use records::run_records;
pub use status::run_status;
pub use supervisor::run_supervisor;
pub use trigger::run_trigger;

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tokio::sync::broadcast;
use vigil_core::VigilConfig;
use vigil_transport_tcp::TcpConfig;

use crate::client::OperatorClient;

/// Where operator commands connect.
#[derive(Debug, Clone, Args)]
pub struct ControllerAddrArgs {
    /// Controller address (default: supervisor.controller_addr from config).
    #[arg(long, env = "VIGIL_CONTROLLER_ADDR")]
    pub controller: Option<String>,
}

impl ControllerAddrArgs {
    pub fn resolve(&self, config: &VigilConfig) -> Result<SocketAddr> {
        let raw = self
            .controller
            .as_deref()
            .unwrap_or(&config.supervisor.controller_addr);
        raw.parse()
            .with_context(|| format!("Invalid controller address '{raw}'"))
    }

    pub async fn connect(&self, config: &VigilConfig) -> Result<OperatorClient> {
        let addr = self.resolve(config)?;
        OperatorClient::connect(addr, operator_tcp(config)).await
    }
}

/// Transport settings for request/response connections. Unlike edge links
/// these carry a read timeout.
pub fn operator_tcp(config: &VigilConfig) -> TcpConfig {
    let read_timeout = (config.transport.read_timeout_ms > 0)
        .then(|| Duration::from_millis(config.transport.read_timeout_ms));
    TcpConfig::from(&config.transport).with_read_timeout(read_timeout)
}

/// Forwards Ctrl-C and SIGTERM to `shutdown_tx`.
pub fn spawn_signal_handlers(shutdown_tx: &broadcast::Sender<()>) {
    let ctrl_c_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl+C, initiating shutdown");
            let _ = ctrl_c_tx.send(());
        }
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let sigterm_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                    tracing::info!("Received SIGTERM, initiating shutdown");
                    let _ = sigterm_tx.send(());
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to register SIGTERM handler");
                }
            }
        });
    }
}
