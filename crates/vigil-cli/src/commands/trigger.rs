use anyhow::Result;
use clap::Args;
use vigil_core::{RecordId, TriggerPayload, VigilConfig};

use super::ControllerAddrArgs;
use crate::output::TriggerOutput;

#[derive(Debug, Args)]
pub struct TriggerArgs {
    #[command(flatten)]
    pub addr: ControllerAddrArgs,

    /// Use this record id instead of letting the controller allocate one.
    #[arg(long)]
    pub record_id: Option<u64>,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Fires a manual trigger, as if the conveyor sensor had seen an item.
pub async fn run_trigger(args: TriggerArgs, config: &VigilConfig) -> Result<()> {
    let mut trigger = TriggerPayload::default();
    if let Some(id) = args.record_id {
        trigger = trigger.with_record_id(RecordId::new(id));
    }

    let client = args.addr.connect(config).await?;
    let (record_id, deadline) = client.trigger(trigger).await?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&TriggerOutput::new(record_id, deadline))?
        );
    } else {
        println!("Opened record {record_id} (deadline {deadline})");
    }
    Ok(())
}
