mod bootstrap;
mod cli;
mod commands;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use ferry_core::{load_config, validate_config, write_default_config, Config, ConfigError};

use cli::{Cli, CliCommand};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command();
    let config_path = cli.config_path();

    if let CliCommand::Setup { force } = command {
        logging::init(cli.log_level.as_deref(), cli.log_format, None);
        return commands::setup(&config_path, force);
    }

    let loaded = resolve_config(&cli);
    let log_file = loaded.as_ref().ok().and_then(|c| c.logging.file.clone());
    logging::init(cli.log_level.as_deref(), cli.log_format, log_file.as_deref());

    let config = loaded
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    validate_config(&config).context("Configuration validation failed")?;
    info!("ferry {} using {}", VERSION, config_path.display());

    match command {
        CliCommand::Run { once } => commands::run(&config, once).await,
        CliCommand::Status { json } => commands::status(&config, json),
        CliCommand::Reset { url, completed } => commands::reset(&config, &url, completed),
        CliCommand::Check => commands::check(&config).await,
        CliCommand::Setup { .. } => Ok(()),
    }
}

/// Load the config file. Without an explicit `--config`, a missing default
/// file is created with defaults first.
fn resolve_config(cli: &Cli) -> Result<Config, ConfigError> {
    let path = cli.config_path();
    match load_config(&path) {
        Err(ConfigError::FileNotFound(_)) if cli.config.is_none() => {
            write_default_config(&path)?;
            load_config(&path)
        }
        other => other,
    }
}
