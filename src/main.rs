//! CLI entry point for iom-daq
//!
//! ```bash
//! iom-daq validate config/iom.example.toml
//! iom-daq run config/iom.example.toml --map fast --cycles 20 --loopback
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use iom_daq::acquisition::{connect, run_acquisition};
use iom_daq::config::AppConfig;
use iom_daq::logging::{self, LogFormat};
use tracing::info;

#[derive(Parser)]
#[command(name = "iom-daq")]
#[command(about = "Acquisition for chassis-based remote I/O", long_about = None)]
struct Cli {
    /// Override the configured log level
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Override the configured log format
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and check a configuration file, then connect and disconnect
    Validate {
        /// Path to the TOML configuration
        config: PathBuf,
    },

    /// Run acquisition cycles of one map
    Run {
        /// Path to the TOML configuration
        config: PathBuf,

        /// Map to run
        #[arg(long)]
        map: String,

        #[arg(long, default_value = "10")]
        cycles: u32,

        /// Cycle period in milliseconds
        #[arg(long, default_value = "100")]
        period_ms: u64,

        /// Write each cycle's inputs back onto the map's outputs
        #[arg(long)]
        loopback: bool,
    },
}

fn load(cli: &Cli, path: &Path) -> Result<AppConfig> {
    let mut config = AppConfig::load_from(path)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    if let Some(level) = &cli.log_level {
        config.application.log_level = level.clone();
    }
    if let Some(format) = cli.log_format {
        config.application.log_format = format;
    }
    config.validate()?;
    logging::init_from_config(&config)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Validate { config } => {
            let config = load(&cli, config)?;
            let mut manager = connect(&config)?;
            manager.shutdown()?;
            println!(
                "{}: {} device(s), {} map(s) OK",
                config.application.name,
                config.chassis.devices.len(),
                config.chassis.maps.len()
            );
            Ok(())
        }
        Commands::Run {
            config,
            map,
            cycles,
            period_ms,
            loopback,
        } => {
            let config = load(&cli, config)?;
            let mut manager = connect(&config)?;
            let summary = run_acquisition(
                &mut manager,
                map,
                *cycles,
                Duration::from_millis(*period_ms),
                *loopback,
            )
            .await?;
            manager.shutdown()?;

            for value in &summary.last_values {
                let bits: String = value
                    .samples
                    .iter()
                    .map(|&s| if s { '1' } else { '0' })
                    .collect();
                println!("{}[{}] = {}", value.device, value.channel, bits);
            }
            info!(
                cycles = summary.cycles,
                overruns = summary.overruns,
                "Done"
            );
            Ok(())
        }
    }
}
