use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use vigil_core::{ClientId, VigilConfig};
use vigil_supervisor::{ProcessSpec, SupervisorConfig, SupervisorNode};

use super::spawn_signal_handlers;

#[derive(Debug, Args)]
pub struct SupervisorArgs {
    /// Client id announced to the controller (overrides supervisor.client_id).
    #[arg(long)]
    pub client_id: Option<String>,

    /// Controller address (overrides supervisor.controller_addr).
    #[arg(long)]
    pub controller: Option<SocketAddr>,

    /// Pid file for the managed process (overrides supervisor.pid_file).
    #[arg(long)]
    pub pid_file: Option<PathBuf>,

    /// Inference program and arguments (overrides supervisor.program/args).
    #[arg(last = true)]
    pub command: Vec<String>,
}

pub async fn run_supervisor(args: SupervisorArgs, config: &VigilConfig) -> Result<()> {
    let mut supervisor_config =
        SupervisorConfig::try_from(&config.supervisor).context("Invalid supervisor config")?;
    apply_overrides(&mut supervisor_config, args);

    tracing::info!(
        client_id = %supervisor_config.client_id,
        controller = %supervisor_config.controller_addr,
        program = %supervisor_config.process.program,
        pid_file = %supervisor_config.pid_file.display(),
        "Starting supervisor"
    );

    let node = SupervisorNode::new(supervisor_config);
    spawn_signal_handlers(&node.shutdown_handle());

    match node.run().await {
        Ok(()) => {
            tracing::info!("Supervisor shut down cleanly");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "Supervisor error");
            Err(e.into())
        }
    }
}

fn apply_overrides(config: &mut SupervisorConfig, args: SupervisorArgs) {
    if let Some(id) = args.client_id {
        config.client_id = ClientId::new(id);
    }
    if let Some(addr) = args.controller {
        config.controller_addr = addr;
    }
    if let Some(path) = args.pid_file {
        config.pid_file = path;
    }
    let mut command = args.command.into_iter();
    if let Some(program) = command.next() {
        config.process = ProcessSpec::new(program).with_args(command);
    }
}
