//! Subcommand implementations

pub mod detection;
pub mod monitor;
pub mod samples;
