//! Runtime configuration for the bulk manager.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::Config;
use crate::retry::RetryPolicy;
use crate::transfer::VerifyOptions;

/// Settings the manager needs at runtime, resolved from [`Config`].
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Root for fetched artifacts; each group gets a subdirectory.
    pub working_dir: PathBuf,
    pub backlog_file: PathBuf,
    /// Sleep between cycles in run-forever mode.
    pub cycle_interval: Duration,
    /// Failures after which an item is no longer retried automatically.
    pub failure_ceiling: u32,
    /// Delete the local artifact once the upload is verified.
    pub auto_delete: bool,
    /// Start even when the health gate fails.
    pub continue_on_health_failure: bool,
    pub max_concurrent_items: usize,
    /// Deadline for fetch, upload and verify of one item.
    pub item_timeout: Option<Duration>,
    pub verification_enabled: bool,
    pub verify: VerifyOptions,
    pub fetch_retry: RetryPolicy,
    pub upload_retry: RetryPolicy,
    /// Prometheus textfile rewritten after each cycle.
    pub metrics_textfile: Option<PathBuf>,
}

impl ManagerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            working_dir: config.paths.working_dir.clone(),
            backlog_file: config.paths.backlog_file.clone(),
            cycle_interval: Duration::from_secs(config.manager.cycle_interval_secs),
            failure_ceiling: config.manager.failure_ceiling,
            auto_delete: config.manager.auto_delete,
            continue_on_health_failure: config.manager.continue_on_health_failure,
            max_concurrent_items: config.manager.max_concurrent_items.max(1),
            item_timeout: config.manager.item_timeout_secs.map(Duration::from_secs),
            verification_enabled: config.verification.enabled,
            verify: config.verification.options(),
            fetch_retry: config.fetch.retry.policy(),
            upload_retry: config.upload.retry.policy(),
            metrics_textfile: config.metrics.textfile.clone(),
        }
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_config_defaults() {
        let config = ManagerConfig::default();
        assert_eq!(config.cycle_interval, Duration::from_secs(3600));
        assert_eq!(config.failure_ceiling, 3);
        assert!(config.auto_delete);
        assert!(!config.continue_on_health_failure);
        assert_eq!(config.max_concurrent_items, 1);
        assert!(config.item_timeout.is_none());
        assert!(config.verification_enabled);
        assert!(!config.verify.use_full_hash);
    }

    #[test]
    fn test_from_config_overrides() {
        let mut config = Config::default();
        config.manager.item_timeout_secs = Some(90);
        config.manager.max_concurrent_items = 4;
        config.verification.use_full_hash = true;

        let resolved = ManagerConfig::from_config(&config);
        assert_eq!(resolved.item_timeout, Some(Duration::from_secs(90)));
        assert_eq!(resolved.max_concurrent_items, 4);
        assert!(resolved.verify.use_full_hash);
    }
}
