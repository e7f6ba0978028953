//! Velero backup stack CLI entrypoint.
//!
//! This is the main entrypoint for the velero-stack command-line tool.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use velero_backup_stack::cli::{Cli, Commands, OutputFormatter};
use velero_backup_stack::config::StackConfig;
use velero_backup_stack::deploy::HelmCli;
use velero_backup_stack::error::{ConfigError, Result, StackError};
use velero_backup_stack::provider::AzureProvider;
use velero_backup_stack::stack::{BackupStack, StackExecutor};

use tokio::sync::watch;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    // Tokens and identifiers may live in a .env next to the binary.
    if dotenvy::dotenv().is_ok() {
        debug!("Loaded environment from .env");
    }

    let formatter = OutputFormatter::new(cli.output);
    let config = load_config(cli.config.as_ref(), cli.stack.as_deref())?;

    match cli.command {
        Commands::Validate => cmd_validate(&config),
        Commands::Plan => cmd_plan(&config, &formatter),
        Commands::Up { yes, show_secrets } => {
            cmd_up(&config, yes, show_secrets, &formatter).await
        }
    }
}

/// Resolves the stack configuration from a file or the --stack flag.
fn load_config(path: Option<&PathBuf>, stack: Option<&str>) -> Result<StackConfig> {
    match (path, stack) {
        (Some(path), _) => StackConfig::from_file(path),
        (None, Some(stack)) => StackConfig::for_stack(stack),
        (None, None) => Err(ConfigError::MissingStack.into()),
    }
}

/// Validate configuration.
fn cmd_validate(config: &StackConfig) -> Result<()> {
    // Loading already validated; show what would be used.
    eprintln!("Configuration is valid!");
    eprintln!("\nStack summary:");
    eprintln!("  Stack: {}", config.stack);
    eprintln!("  Location: {}", config.location);
    eprintln!("  Namespace: {}", config.namespace);
    eprintln!("  Release: {}", config.release_name);
    eprintln!(
        "  Chart: {} {} ({})",
        config.chart.name, config.chart.version, config.chart.repository
    );
    eprintln!("  Schedule: {} ({})", config.schedule.name, config.schedule.cron);
    Ok(())
}

/// Show the resource plan.
fn cmd_plan(config: &StackConfig, formatter: &OutputFormatter) -> Result<()> {
    let provider = Arc::new(AzureProvider::from_env()?);
    let stack = BackupStack::build(config, provider)?;

    let output = formatter.format_plan(&stack.plan());
    eprintln!("{output}");
    Ok(())
}

/// Provision the stack.
async fn cmd_up(
    config: &StackConfig,
    auto_approve: bool,
    show_secrets: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let provider = Arc::new(AzureProvider::from_env()?);
    let stack = BackupStack::build(config, provider.clone())?;

    // Show plan
    let output = formatter.format_plan(&stack.plan());
    eprintln!("{output}");

    // Confirm
    if !auto_approve {
        eprint!("Do you want to provision this stack? [y/N]: ");
        std::io::stderr().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            eprintln!("Provisioning cancelled.");
            return Ok(());
        }
    }

    // An interrupt stops new creation requests; in-flight calls finish.
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; waiting for in-flight resources");
            let _ = cancel_tx.send(true);
        }
    });

    info!(stack = %config.stack, "provisioning backup stack");
    let executor = Arc::new(StackExecutor::new(provider, Arc::new(HelmCli::new())));
    let outcome = stack.run(executor, cancel_rx).await?;

    eprintln!("{}", formatter.format_report(&outcome.report));

    match outcome.exports {
        Some(exports) => {
            eprintln!("{}", formatter.format_exports(&exports, show_secrets));
            eprintln!("{}", formatter.success("Stack provisioned."));
            Ok(())
        }
        None => {
            eprintln!("{}", formatter.error("Provisioning incomplete."));
            Err(StackError::ProvisionIncomplete {
                failed: outcome.report.failed(),
                skipped: outcome.report.skipped(),
            })
        }
    }
}
