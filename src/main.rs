//! CLI entry point for voxel-planner
//!
//! Loads an instrument configuration, builds the acquisition plan it describes
//! and writes the tile list for the acquisition runner.
//!
//! # Usage
//!
//! Emit the tile list for the configured plan:
//! ```bash
//! voxel-planner plan --config config/instrument.toml --output tiles.json
//! ```
//!
//! Restrict it to a slice of the traversal:
//! ```bash
//! voxel-planner plan --config config/instrument.toml --start 2 --stop 5
//! ```
//!
//! Check a configuration and print the resolved layout:
//! ```bash
//! voxel-planner check --config config/instrument.toml
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::info;
use voxel_planner::config::InstrumentConfig;
use voxel_planner::logging::{self, OutputFormat, TracingConfig};
use voxel_planner::planner::VolumePlanner;
use voxel_planner::serializer::{ChannelOrder, TileListSerializer, TileNumbering};

#[derive(Parser)]
#[command(name = "voxel-planner")]
#[command(about = "Light-sheet acquisition volume planner", long_about = None)]
struct Cli {
    /// Override the configured log level
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the acquisition tile list
    Plan {
        /// Instrument configuration file
        #[arg(long, default_value = "config/instrument.toml")]
        config: PathBuf,

        /// Output file (stdout when omitted)
        #[arg(long)]
        output: Option<PathBuf>,

        /// First tile of the traversal slice
        #[arg(long)]
        start: Option<usize>,

        /// Last tile (inclusive) of the traversal slice
        #[arg(long)]
        stop: Option<usize>,

        /// Override the configured channel order
        #[arg(long, value_enum)]
        channel_order: Option<OrderArg>,

        /// Number tiles within the emitted slice instead of the full traversal
        #[arg(long)]
        slice_numbering: bool,
    },

    /// Validate a configuration and print the resolved plan
    Check {
        /// Instrument configuration file
        #[arg(long, default_value = "config/instrument.toml")]
        config: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OrderArg {
    PerTile,
    PerVolume,
}

impl From<OrderArg> for ChannelOrder {
    fn from(value: OrderArg) -> Self {
        match value {
            OrderArg::PerTile => ChannelOrder::PerTile,
            OrderArg::PerVolume => ChannelOrder::PerVolume,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Plan {
            config,
            output,
            start,
            stop,
            channel_order,
            slice_numbering,
        } => {
            let config = load_config(&config, cli.log_level.as_deref(), cli.json_logs)?;
            let mut planner = VolumePlanner::from_config(&config)
                .context("Failed to build the acquisition plan")?;
            if let Some(order) = channel_order {
                planner.set_channel_order(order.into())?;
            }
            if let Some(stop) = stop {
                planner.set_stop(Some(stop)).context("Invalid --stop")?;
            }
            if let Some(start) = start {
                planner.set_start(start).context("Invalid --start")?;
            }

            let numbering = if slice_numbering {
                TileNumbering::SliceIndex
            } else {
                TileNumbering::TableRow
            };
            let json = TileListSerializer::new(planner.channel_order())
                .with_numbering(numbering)
                .to_json(&planner)?;

            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!(path = %path.display(), "tile list written");
                }
                None => println!("{json}"),
            }
            Ok(())
        }
        Commands::Check { config } => {
            let config = load_config(&config, cli.log_level.as_deref(), cli.json_logs)?;
            let planner = VolumePlanner::from_config(&config)
                .context("Failed to build the acquisition plan")?;
            println!("{}", serde_json::to_string_pretty(&planner.value())?);
            Ok(())
        }
    }
}

fn load_config(path: &Path, log_level: Option<&str>, json_logs: bool) -> Result<InstrumentConfig> {
    let mut config = InstrumentConfig::load_from(path)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    if let Some(level) = log_level {
        config.application.log_level = level.to_string();
    }
    config.validate().context("Invalid configuration")?;

    let format = if json_logs {
        OutputFormat::Json
    } else {
        OutputFormat::Compact
    };
    logging::init(TracingConfig::from_instrument_config(&config)?.with_format(format))?;
    info!(instrument = %config.application.name, "configuration loaded");
    Ok(config)
}
