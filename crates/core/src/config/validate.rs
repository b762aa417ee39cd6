use super::{types::Config, ConfigError, RemoteBackend, RetryConfig};

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.manager.failure_ceiling == 0 {
        return Err(ConfigError::ValidationError(
            "manager.failure_ceiling must be at least 1".to_string(),
        ));
    }

    if config.manager.max_concurrent_items == 0 {
        return Err(ConfigError::ValidationError(
            "manager.max_concurrent_items must be at least 1".to_string(),
        ));
    }

    if config.manager.item_timeout_secs == Some(0) {
        return Err(ConfigError::ValidationError(
            "manager.item_timeout_secs cannot be 0".to_string(),
        ));
    }

    if config.verification.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "verification.timeout_secs cannot be 0".to_string(),
        ));
    }

    match config.remote.backend {
        RemoteBackend::Rclone => {
            if config.remote.name.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "remote.name is required for the rclone backend".to_string(),
                ));
            }
        }
        RemoteBackend::Filesystem => {
            if config.remote.root.is_none() {
                return Err(ConfigError::ValidationError(
                    "remote.root is required for the filesystem backend".to_string(),
                ));
            }
        }
    }

    validate_retry("fetch.retry", &config.fetch.retry)?;
    validate_retry("upload.retry", &config.upload.retry)?;

    Ok(())
}

fn validate_retry(section: &str, retry: &RetryConfig) -> Result<(), ConfigError> {
    if retry.max_attempts == 0 {
        return Err(ConfigError::ValidationError(format!(
            "{}.max_attempts must be at least 1",
            section
        )));
    }
    if !(retry.multiplier >= 1.0) {
        return Err(ConfigError::ValidationError(format!(
            "{}.multiplier must be >= 1.0",
            section
        )));
    }
    if !retry.base_delay_secs.is_finite() || retry.base_delay_secs < 0.0 {
        return Err(ConfigError::ValidationError(format!(
            "{}.base_delay_secs must be a non-negative number",
            section
        )));
    }
    if retry.base_delay_secs > retry.max_delay_secs as f64 {
        return Err(ConfigError::ValidationError(format!(
            "{}.base_delay_secs cannot exceed max_delay_secs ({})",
            section, retry.max_delay_secs
        )));
    }
    Ok(())
}
