//! Build the manager and its backends from configuration.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use ferry_core::{
    BulkManager, Config, Fetcher, FsRemote, HttpFetcher, ManagerConfig, RcloneUploader,
    RemoteBackend, StateBook, Uploader,
};

pub fn build_uploader(config: &Config) -> Result<Arc<dyn Uploader>> {
    let uploader: Arc<dyn Uploader> = match config.remote.backend {
        RemoteBackend::Rclone => {
            info!(
                "Using rclone remote {}:{}",
                config.remote.name, config.remote.base_path
            );
            Arc::new(RcloneUploader::new(
                config.remote.name.clone(),
                config.remote.base_path.clone(),
                config.remote.rclone_binary.as_deref(),
            ))
        }
        RemoteBackend::Filesystem => {
            let root = config
                .remote
                .root
                .clone()
                .context("remote.root is required for the filesystem backend")?;
            info!("Using filesystem remote at {}", root.display());
            Arc::new(FsRemote::new(root, config.remote.base_path.clone()))
        }
    };
    Ok(uploader)
}

pub fn build_fetcher(config: &Config) -> Result<Arc<dyn Fetcher>> {
    let fetcher = HttpFetcher::new(&config.fetch).context("Failed to create HTTP client")?;
    Ok(Arc::new(fetcher))
}

pub fn open_state(config: &Config) -> Result<StateBook> {
    let completions = config.completions_path();
    let failures = config.failures_path();
    let state = StateBook::open(&completions, &failures).with_context(|| {
        format!(
            "Failed to open state in {}",
            config.paths.state_dir.display()
        )
    })?;
    info!(
        "Loaded {} completed and {} failed items",
        state.completions().len(),
        state.ledger().len()
    );
    Ok(state)
}

pub fn build_manager(config: &Config) -> Result<BulkManager> {
    std::fs::create_dir_all(&config.paths.working_dir).with_context(|| {
        format!(
            "Failed to create working directory {}",
            config.paths.working_dir.display()
        )
    })?;

    Ok(BulkManager::new(
        ManagerConfig::from_config(config),
        open_state(config)?,
        build_fetcher(config)?,
        build_uploader(config)?,
    ))
}
