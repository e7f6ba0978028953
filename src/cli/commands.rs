//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Velero backup stack provisioner.
#[derive(Parser, Debug)]
#[command(name = "velero-stack")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the stack configuration file.
    #[arg(short, long, global = true, env = "VELERO_STACK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Stack name, used when no configuration file is given.
    #[arg(short, long, global = true, env = "VELERO_STACK")]
    pub stack: Option<String>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the stack configuration.
    Validate,

    /// Show the resource plan in dependency order, without touching
    /// anything.
    Plan,

    /// Provision the stack.
    Up {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,

        /// Print sensitive export values in plaintext.
        #[arg(long)]
        show_secrets: bool,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
