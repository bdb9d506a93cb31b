//! Gatehouse CLI - unified command-line interface.
//!
//! Provides a single binary entry point for:
//! - `gatehouse start` - Load extensions and host the interception pipeline
//! - `gatehouse check` - Validate a config file and its extension folder

mod args;
pub mod commands;

pub use args::{CheckArgs, Cli, Commands, OutputFormat, StartArgs};
