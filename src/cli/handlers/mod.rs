//! CLI command handlers.

pub mod analyze;
pub mod dedupe;
pub mod input;
pub mod plan;
