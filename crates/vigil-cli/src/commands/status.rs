use anyhow::Result;
use clap::Args;
use vigil_core::{StatusSnapshot, VigilConfig};

use super::ControllerAddrArgs;
use crate::output::StatusOutput;

#[derive(Debug, Args)]
pub struct StatusArgs {
    #[command(flatten)]
    pub addr: ControllerAddrArgs,

    /// Show counters and heartbeat ages.
    #[arg(short, long)]
    pub verbose: bool,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

pub async fn run_status(args: StatusArgs, config: &VigilConfig) -> Result<()> {
    let client = args.addr.connect(config).await?;
    let status = client.status().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&StatusOutput::from(&status))?);
    } else {
        print_status(&status, args.verbose);
    }

    Ok(())
}

fn print_status(status: &StatusSnapshot, verbose: bool) {
    let summary = StatusOutput::from(status);

    println!("Controller Status");
    println!("=================");
    println!();
    println!(
        "Clients:      {}/{} online",
        summary.online_clients, summary.total_clients
    );
    println!("Open records: {}", status.open_records);
    if status.store_degraded {
        println!("Record store: DEGRADED");
    }

    println!();
    println!("Clients:");
    println!("--------");
    if status.clients.is_empty() {
        println!("  (none)");
    }
    for client in &status.clients {
        let link = if client.connected { "connected" } else { "disconnected" };
        println!(
            "  {} - {} [{}] ({link})",
            client.client_id, client.liveness, client.run_state
        );
        if verbose {
            if let Some(state) = client.process_state {
                println!("    Process: {state}");
            }
            match client.heartbeat_age_ms {
                Some(age) => println!("    Last heartbeat: {age}ms ago"),
                None => println!("    Last heartbeat: never"),
            }
        }
    }

    if verbose {
        let c = &status.counters;
        println!();
        println!("Counters:");
        println!("---------");
        println!("  Triggers:         {} ({} duplicate)", c.triggers, c.duplicate_triggers);
        println!("  Decided pass:     {}", c.decided_pass);
        println!("  Decided eject:    {}", c.decided_eject);
        println!("  Expired eject:    {}", c.expired_eject);
        println!(
            "  Results:          {} accepted, {} duplicate, {} unattributable",
            c.results_accepted, c.results_duplicate, c.results_unattributable
        );
        println!(
            "                    {} late, {} malformed",
            c.results_late, c.results_malformed
        );
        println!("  Unknown clients:  {}", c.unknown_client_messages);
        println!("  Store failures:   {}", c.store_failures);
    }
}
