use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::json;
use tokio::signal;
use tracing::{info, warn};

use ferry_core::{
    write_default_config, BulkManager, Config, HealthGate, IdentityHash, ShutdownHandle,
};

use crate::bootstrap;

const BACKLOG_TEMPLATE: &str = "# One URL per line. Blank lines and lines starting with # are ignored.\n";

pub async fn run(config: &Config, once: bool) -> Result<()> {
    let manager = bootstrap::build_manager(config)?;
    let signals = tokio::spawn(forward_shutdown(manager.shutdown_handle()));

    let result = run_manager(&manager, once).await;
    signals.abort();
    result
}

async fn run_manager(manager: &BulkManager, once: bool) -> Result<()> {
    if once {
        let report = manager.run_once().await?;
        info!(
            "Single pass finished: {} completed, {} failed, {} skipped",
            report.completed,
            report.failed,
            report.already_done + report.exhausted + report.in_flight
        );
    } else {
        manager.run_forever().await?;
    }
    Ok(())
}

async fn forward_shutdown(handle: ShutdownHandle) {
    shutdown_signal().await;
    info!("Received shutdown signal");
    handle.trigger();
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Write the default config, plus an empty backlog next to it if missing.
pub fn setup(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        bail!(
            "{} already exists; pass --force to overwrite it",
            config_path.display()
        );
    }
    let config = write_default_config(config_path)?;
    println!("Created default configuration file: {}", config_path.display());

    let backlog = &config.paths.backlog_file;
    if !backlog.exists() {
        std::fs::write(backlog, BACKLOG_TEMPLATE)
            .with_context(|| format!("Failed to create {}", backlog.display()))?;
        println!("Created empty backlog: {}", backlog.display());
    }
    println!("Edit the [remote] section with your rclone settings before running.");
    Ok(())
}

pub fn status(config: &Config, as_json: bool) -> Result<()> {
    let state = bootstrap::open_state(config)?;
    let ceiling = config.manager.failure_ceiling;
    let exhausted = state.ledger().exhausted(ceiling);
    let pending = state.ledger().pending(ceiling);

    if as_json {
        let report = json!({
            "completed": state.completions().len(),
            "pending_retry": pending.len(),
            "exhausted": exhausted
                .iter()
                .map(|(_, record)| json!({
                    "url": record.identity,
                    "failures": record.failures,
                    "last_failure": record.last_failure,
                    "last_error": record.last_error,
                }))
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Completed:      {}", state.completions().len());
    println!("Pending retry:  {}", pending.len());
    println!("Gave up:        {}", exhausted.len());
    for (_, record) in &exhausted {
        println!(
            "  {} ({} failures, last {}): {}",
            record.identity,
            record.failures,
            record.last_failure.format("%Y-%m-%d %H:%M:%S"),
            record.last_error
        );
    }
    Ok(())
}

pub fn reset(config: &Config, url: &str, completed: bool) -> Result<()> {
    let mut state = bootstrap::open_state(config)?;
    let hash = IdentityHash::of(url);

    let cleared = state.ledger_mut().reset(&hash)?;
    let uncompleted = if completed {
        state.completions_mut().remove(&hash)?.is_some()
    } else {
        false
    };

    match (cleared, uncompleted) {
        (false, false) => println!("Nothing recorded for {}", url.trim()),
        _ => {
            if cleared {
                println!("Cleared failure history for {}", url.trim());
            }
            if uncompleted {
                println!("Removed completion record for {}", url.trim());
            }
        }
    }
    Ok(())
}

pub async fn check(config: &Config) -> Result<()> {
    let uploader = bootstrap::build_uploader(config)?;
    let report = HealthGate::new(uploader, config.paths.backlog_file.clone())
        .check()
        .await;

    if report.ok {
        println!("All health checks passed");
        return Ok(());
    }
    for reason in &report.reasons {
        println!("FAIL: {}", reason);
    }
    bail!("{} health check(s) failed", report.reasons.len())
}
