use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};
use crate::state::atomic_write;

/// Load configuration from file with environment variable overrides.
///
/// Missing keys fall back to `Config::default()`. Environment variables use the
/// `FERRY_` prefix and `__` as the section separator, e.g.
/// `FERRY_MANAGER__FAILURE_CEILING=5`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("FERRY_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Write the default configuration to `path`, replacing any existing file.
pub fn write_default_config(path: &Path) -> Result<Config, ConfigError> {
    let config = Config::default();
    let body =
        toml::to_string_pretty(&config).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    atomic_write(path, body.as_bytes()).map_err(|source| ConfigError::WriteError {
        path: path.display().to_string(),
        source,
    })?;
    tracing::info!("Wrote default configuration to {}", path.display());
    Ok(config)
}
