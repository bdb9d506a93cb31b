//! Core runtime infrastructure.
//!
//! - `config` - Configuration parsing and validation

pub mod config;

pub use config::*;
