use anyhow::Result;
use clap::Args;
use vigil_core::{Action, ClientId, VigilConfig};

use super::ControllerAddrArgs;
use crate::output::CommandOutput;

#[derive(Debug, Args)]
pub struct ControlArgs {
    #[command(flatten)]
    pub addr: ControllerAddrArgs,

    /// Target a single client; every configured client when omitted.
    #[arg(long)]
    pub client: Option<ClientId>,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

pub async fn run_control(action: Action, args: ControlArgs, config: &VigilConfig) -> Result<()> {
    let client = args.addr.connect(config).await?;
    let result = match args.client {
        Some(id) => client.command(id, action).await?,
        None => client.command_all(action).await?,
    };

    tracing::debug!(%action, issued = result.issued.len(), skipped = result.skipped.len(), "Commands issued");

    let output = CommandOutput::new(action, &result);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if output.issued.is_empty() {
        println!("No {action} command issued");
    } else {
        println!("Issued {action} to: {}", output.issued.join(", "));
    }
    if !output.skipped.is_empty() {
        println!("Skipped (no change needed): {}", output.skipped.join(", "));
    }
    Ok(())
}
