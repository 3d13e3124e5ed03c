//! Platform CLI entry point
//!
//! Parses arguments, sets up logging, loads configuration and dispatches
//! to subcommands.

use clap::Parser;
use console::style;
use platform_cli::cli::{Cli, Commands};
use platform_cli::config::ConfigManager;
use platform_cli::error::PlatformResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> PlatformResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    init_logging(cli.verbose, &config.general.log_format);
    debug!(target: "platform_cli", "Using configuration {}", config_manager.path().display());

    match cli.command {
        Commands::Build(args) => platform_cli::cli::commands::build(args, &config).await,
        Commands::Clean(args) => platform_cli::cli::commands::clean(args, &config).await,
        Commands::Cache(args) => platform_cli::cli::commands::cache(args, &config).await,
        Commands::Config(args) => {
            platform_cli::cli::commands::config(args, &config, &config_manager).await
        }
    }
}

/// Logging: 0 = warn, 1 = info, 2+ = debug. RUST_LOG overrides the count.
fn init_logging(verbose: u8, log_format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("platform_cli=warn"),
        1 => EnvFilter::new("platform_cli=info"),
        _ => EnvFilter::new("platform_cli=debug"),
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if log_format == "json" {
        builder.json().init();
    } else {
        builder.with_target(false).without_time().init();
    }
}
