use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use vigil_controller::read_records;
use vigil_core::{ClosedRecord, Decision, VigilConfig};

use crate::output::{RecordOutput, RecordsSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DecisionFilter {
    Pass,
    Eject,
    Timeout,
}

impl DecisionFilter {
    fn matches(self, record: &ClosedRecord) -> bool {
        match self {
            Self::Pass => record.decision == Decision::Pass,
            Self::Eject => record.decision == Decision::Eject,
            Self::Timeout => record.is_timeout(),
        }
    }
}

#[derive(Debug, Args)]
pub struct RecordsArgs {
    /// Record store to read (default: store.path from config).
    pub path: Option<PathBuf>,

    /// Only show the most recent N records.
    #[arg(short = 'n', long)]
    pub last: Option<usize>,

    /// Only show records with this outcome.
    #[arg(long, value_enum)]
    pub only: Option<DecisionFilter>,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Reads the append-only record store offline; the controller need not run.
pub fn run_records(args: &RecordsArgs, config: &VigilConfig) -> Result<()> {
    let path = args
        .path
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.store.path));
    let records = read_records(&path)
        .with_context(|| format!("Failed to read records from {}", path.display()))?;
    let selected = select(records, args.only, args.last);

    if args.json {
        let rows: Vec<RecordOutput> = selected.iter().map(RecordOutput::from).collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    let summary = RecordsSummary::of(&selected);
    println!("Records: {}", path.display());
    println!(
        "  {} shown: {} pass, {} eject ({} timed out)",
        summary.total, summary.passed, summary.ejected, summary.timed_out
    );
    println!();
    for record in &selected {
        print_record(record);
    }
    Ok(())
}

fn select(
    records: Vec<ClosedRecord>,
    only: Option<DecisionFilter>,
    last: Option<usize>,
) -> Vec<ClosedRecord> {
    let mut selected: Vec<ClosedRecord> = records
        .into_iter()
        .filter(|r| only.is_none_or(|f| f.matches(r)))
        .collect();
    if let Some(n) = last {
        let skip = selected.len().saturating_sub(n);
        selected.drain(..skip);
    }
    selected
}

fn print_record(record: &ClosedRecord) {
    println!(
        "#{} {} {} trigger={} deadline={} closed={}",
        record.id,
        record.decision,
        record.state,
        record.trigger_time,
        record.deadline,
        record.closed_time
    );
    for result in &record.results {
        println!(
            "    {} {} ({:.2})",
            result.client_id, result.classification, result.confidence
        );
    }
    let missing = record.missing_clients();
    if !missing.is_empty() {
        let names: Vec<String> = missing.iter().map(ToString::to_string).collect();
        println!("    missing: {}", names.join(", "));
    }
}
