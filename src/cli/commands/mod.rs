//! CLI command implementations.

mod check;
mod start;

pub use check::run_check;
pub use start::run_start;
