//! Binsmith - On-demand Go binaries
//!
//! CLI entry point that dispatches to subcommands.

use binsmith::cli::{Cli, Commands};
use binsmith::config::{Config, ConfigManager};
use binsmith::error::BinsmithResult;
use clap::Parser;
use console::style;
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

async fn run() -> BinsmithResult<()> {
    let cli = Cli::parse();

    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };
    let config = config_manager.load().await?;

    init_logging(cli.verbose, &config);
    debug!("Loaded config from {}", config_manager.path().display());

    match cli.command {
        Commands::Fetch(args) => binsmith::cli::commands::fetch(args, &config).await,
        Commands::Resolve(args) => binsmith::cli::commands::resolve(args, &config).await,
        Commands::Platforms => binsmith::cli::commands::platforms(&config).await,
        Commands::Config(args) => {
            binsmith::cli::commands::config(args, &config, &config_manager).await
        }
    }
}

/// 0 = warn, 1 = info, 2+ = debug; RUST_LOG wins when set
fn init_logging(verbose: u8, config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("binsmith=warn"),
        1 => EnvFilter::new("binsmith=info"),
        _ => EnvFilter::new("binsmith=debug"),
    });

    if config.general.log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .without_time()
            .init();
    }
}
