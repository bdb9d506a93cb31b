//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Gatehouse - extension interception pipeline for MQTT brokers.
#[derive(Parser)]
#[command(name = "gatehouse")]
#[command(version)]
#[command(about = "Gatehouse extension host and diagnostic tools")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load extensions and host the interception pipeline
    Start(StartArgs),

    /// Validate the configuration and the extension folder without starting anything
    Check(CheckArgs),
}

// -----------------------------------------------------------------------------
// Start command
// -----------------------------------------------------------------------------

#[derive(Args)]
pub struct StartArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/gatehouse.toml")]
    pub config: PathBuf,
}

// -----------------------------------------------------------------------------
// Check command
// -----------------------------------------------------------------------------

#[derive(Args)]
pub struct CheckArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/gatehouse.toml")]
    pub config: PathBuf,

    /// Override the extension folder named in the config
    #[arg(long)]
    pub extensions: Option<PathBuf>,

    /// Report format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

/// Output format for reports.
#[derive(clap::ValueEnum, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human readable lines
    #[default]
    Text,
    /// One JSON document
    Json,
}
