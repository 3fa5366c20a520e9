use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use vigil_controller::ControllerConfig;
use vigil_core::VigilConfig;

use crate::config::VigilConfigLoader;

#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Output path for generated config.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Show current effective config, env overrides included.
    #[arg(long)]
    pub show: bool,

    /// Validate configuration file.
    #[arg(long)]
    pub validate: bool,
}

/// `path` is the global `--config` flag.
pub fn run_config(args: &ConfigArgs, path: Option<&std::path::Path>) -> Result<()> {
    if args.validate {
        let config = VigilConfig::load(path).context("Configuration validation failed")?;
        let controller = ControllerConfig::try_from(&config.controller)?;
        let source = path.map_or_else(
            || "default locations".to_string(),
            |p| p.display().to_string(),
        );
        println!("Configuration is valid (loaded from {source})");
        println!(
            "  {} expected clients, decision deadline {}ms after trigger",
            controller.clients.len(),
            controller.geometry.travel_time().as_millis()
        );
    } else if args.show {
        let config = VigilConfig::load(path)?;
        println!("{}", config.to_toml()?);
    } else {
        let config_str = VigilConfig::generate_default_config();
        if let Some(output_path) = &args.output {
            std::fs::write(output_path, &config_str)
                .with_context(|| format!("Failed to write {}", output_path.display()))?;
            println!("Configuration written to {}", output_path.display());
        } else {
            println!("{config_str}");
        }
    }
    Ok(())
}
