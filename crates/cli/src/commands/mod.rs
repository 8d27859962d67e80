//! CLI command implementations

pub mod usage;
