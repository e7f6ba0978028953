//! CLI module for the Velero backup stack provisioner.
//!
//! This module provides the command-line interface for planning and
//! provisioning backup stacks.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat};
pub use output::OutputFormatter;
