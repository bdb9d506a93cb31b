//! Operations and observability.
//!
//! - `telemetry` - JSON structured logging with a reloadable level filter

pub mod telemetry;

pub use telemetry::*;
