use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use vigil_core::{Action, VigilConfig};

mod client;
mod commands;
mod config;

use config::VigilConfigLoader;
mod output;

use commands::{
    config::ConfigArgs, control::ControlArgs, controller::ControllerArgs, records::RecordsArgs,
    status::StatusArgs, supervisor::SupervisorArgs, trigger::TriggerArgs,
};

#[derive(Debug, Parser)]
#[command(name = "vigil", version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: vigil.toml or ~/.config/vigil/config.toml).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Set log level or filter directives.
    #[arg(long, global = true, env = "VIGIL_LOG")]
    log_level: Option<String>,

    /// Log output format: pretty, compact or json.
    #[arg(long, global = true, env = "VIGIL_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the inspection controller.
    #[command(name = "controller")]
    Controller(ControllerArgs),

    /// Run the edge supervisor that manages an inference process.
    #[command(name = "supervisor")]
    Supervisor(SupervisorArgs),

    /// Show client liveness, run state and counters.
    #[command(name = "status")]
    Status(StatusArgs),

    /// Tell inference clients to start.
    #[command(name = "start")]
    Start(ControlArgs),

    /// Tell inference clients to stop.
    #[command(name = "stop")]
    Stop(ControlArgs),

    /// Fire a manual sensor trigger.
    #[command(name = "trigger")]
    Trigger(TriggerArgs),

    /// Read closed records from the record store.
    #[command(name = "records")]
    Records(RecordsArgs),

    /// Configuration management (generate, show, validate).
    #[command(name = "config")]
    Config(ConfigArgs),
}

fn setup_logging(log_level: &str, format: &str) {
    use std::io::IsTerminal;

    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        "json" => registry.with(fmt::layer().json().with_target(true)).init(),
        "compact" => registry
            .with(
                fmt::layer()
                    .compact()
                    .with_ansi(std::io::stdout().is_terminal())
                    .with_target(false),
            )
            .init(),
        _ => registry
            .with(
                fmt::layer()
                    .with_ansi(std::io::stdout().is_terminal())
                    .with_target(true),
            )
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // `config` must work on a broken file, so it loads on its own.
    if let Commands::Config(args) = &cli.command {
        setup_logging(cli.log_level.as_deref().unwrap_or("warn"), "compact");
        return commands::run_config(args, cli.config.as_deref());
    }

    let vigil_config = VigilConfig::load(cli.config.as_deref())?;

    let log_level = cli
        .log_level
        .as_deref()
        .unwrap_or(&vigil_config.logging.level);
    let log_format = cli
        .log_format
        .as_deref()
        .unwrap_or(&vigil_config.logging.format);
    setup_logging(log_level, &log_format.to_lowercase());

    match cli.command {
        Commands::Controller(args) => commands::run_controller(args, &vigil_config).await,
        Commands::Supervisor(args) => commands::run_supervisor(args, &vigil_config).await,
        Commands::Status(args) => commands::run_status(args, &vigil_config).await,
        Commands::Start(args) => commands::run_control(Action::Start, args, &vigil_config).await,
        Commands::Stop(args) => commands::run_control(Action::Stop, args, &vigil_config).await,
        Commands::Trigger(args) => commands::run_trigger(args, &vigil_config).await,
        Commands::Records(args) => commands::run_records(&args, &vigil_config),
        Commands::Config(_) => Ok(()),
    }
}
