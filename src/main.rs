//! Gatehouse - unified CLI entrypoint.
//!
//! Usage:
//!   gatehouse start --config config/gatehouse.toml
//!   gatehouse check --config config/gatehouse.toml --format json

use anyhow::Result;
use clap::Parser;
use gatehouse::cli::commands::{run_check, run_start};
use gatehouse::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start(args) => run_start(args).await,
        Commands::Check(args) => run_check(args),
    }
}
