use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use vigil_controller::{ControllerConfig, ControllerServer, StoreWriterConfig};
use vigil_core::VigilConfig;
use vigil_transport_tcp::TcpConfig;

use super::spawn_signal_handlers;

#[derive(Debug, Args)]
pub struct ControllerArgs {
    /// Address to listen on (overrides controller.listen_addr).
    #[arg(short, long)]
    pub listen_addr: Option<SocketAddr>,

    /// Record store path (overrides store.path).
    #[arg(long)]
    pub store: Option<PathBuf>,
}

pub async fn run_controller(args: ControllerArgs, config: &VigilConfig) -> Result<()> {
    let mut controller_config =
        ControllerConfig::try_from(&config.controller).context("Invalid controller config")?;
    if let Some(addr) = args.listen_addr {
        controller_config = controller_config.with_listen_addr(addr);
    }

    let mut store_config =
        StoreWriterConfig::try_from(&config.store).context("Invalid store config")?;
    if let Some(path) = args.store {
        store_config.path = path;
    }

    tracing::info!(
        listen_addr = %controller_config.listen_addr,
        store = %store_config.path.display(),
        clients = controller_config.clients.len(),
        "Starting controller"
    );

    let server = ControllerServer::bind(
        &controller_config,
        &store_config,
        TcpConfig::from(&config.transport),
    )
    .await?;
    spawn_signal_handlers(&server.shutdown_handle());

    match server.run().await {
        Ok(()) => {
            tracing::info!("Controller shut down cleanly");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "Controller error");
            Err(e.into())
        }
    }
}
