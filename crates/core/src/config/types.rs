use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::transfer::{ChecksumType, VerifyOptions};

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub manager: ManagerSection,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Available upload backends
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RemoteBackend {
    /// Shell out to the `rclone` binary.
    #[default]
    Rclone,
    /// Copy into a local directory tree (mounted drive, NAS share).
    Filesystem,
}

/// Remote storage target
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub backend: RemoteBackend,
    /// Remote target name (rclone remote, without the trailing colon).
    #[serde(default = "default_remote_name")]
    pub name: String,
    /// Base path under the remote; group labels are appended to it.
    #[serde(default = "default_remote_base_path")]
    pub base_path: String,
    /// Explicit path to the rclone executable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rclone_binary: Option<PathBuf>,
    /// Destination root for the filesystem backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            backend: RemoteBackend::default(),
            name: default_remote_name(),
            base_path: default_remote_base_path(),
            rclone_binary: None,
            root: None,
        }
    }
}

fn default_remote_name() -> String {
    "onedrive".to_string()
}

fn default_remote_base_path() -> String {
    "Videos".to_string()
}

/// Local filesystem locations
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathsConfig {
    /// Where artifacts are downloaded before upload.
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,
    /// Plain-text backlog, one source reference per line.
    #[serde(default = "default_backlog_file")]
    pub backlog_file: PathBuf,
    /// Directory holding the completion and failure record files.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            working_dir: default_working_dir(),
            backlog_file: default_backlog_file(),
            state_dir: default_state_dir(),
        }
    }
}

fn default_working_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_backlog_file() -> PathBuf {
    PathBuf::from("need_to_download_url.txt")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Orchestration loop behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ManagerSection {
    /// Seconds to sleep between cycles in run-forever mode.
    #[serde(default = "default_cycle_interval")]
    pub cycle_interval_secs: u64,
    /// Recorded failures after which an item is no longer retried automatically.
    #[serde(default = "default_failure_ceiling")]
    pub failure_ceiling: u32,
    /// Delete the local artifact once the upload is verified.
    #[serde(default = "default_true")]
    pub auto_delete: bool,
    /// Start cycles even when the health gate reports problems.
    #[serde(default)]
    pub continue_on_health_failure: bool,
    /// Items processed concurrently within one cycle.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_items: usize,
    /// Per-item deadline covering fetch, upload and verify.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_timeout_secs: Option<u64>,
}

impl Default for ManagerSection {
    fn default() -> Self {
        Self {
            cycle_interval_secs: default_cycle_interval(),
            failure_ceiling: default_failure_ceiling(),
            auto_delete: true,
            continue_on_health_failure: false,
            max_concurrent_items: default_max_concurrent(),
            item_timeout_secs: None,
        }
    }
}

fn default_cycle_interval() -> u64 {
    3600 // 1 hour
}

fn default_failure_ceiling() -> u32 {
    3
}

fn default_max_concurrent() -> usize {
    1
}

fn default_true() -> bool {
    true
}

/// Post-upload verification
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VerificationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Compare content hashes instead of sizes (slower, stronger).
    #[serde(default)]
    pub use_full_hash: bool,
    #[serde(default = "default_verify_timeout")]
    pub timeout_secs: u64,
    /// Digest used by the filesystem backend when `use_full_hash` is set.
    #[serde(default = "default_checksum")]
    pub checksum: ChecksumType,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            use_full_hash: false,
            timeout_secs: default_verify_timeout(),
            checksum: default_checksum(),
        }
    }
}

impl VerificationConfig {
    pub fn options(&self) -> VerifyOptions {
        VerifyOptions {
            use_full_hash: self.use_full_hash,
            checksum: self.checksum,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

fn default_verify_timeout() -> u64 {
    300 // 5 minutes
}

fn default_checksum() -> ChecksumType {
    ChecksumType::Sha256
}

/// Retry policy parameters for a backend call site.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Maximum attempts including the first.
    pub max_attempts: u32,
    /// Delay before the first retry, in seconds.
    pub base_delay_secs: f64,
    /// Factor applied to the delay after each retry.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Upper bound on a single delay, in seconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            // Never panics: out-of-range values saturate at `max_delay_secs`
            base_delay: Duration::try_from_secs_f64(self.base_delay_secs.max(0.0))
                .unwrap_or(Duration::MAX)
                .min(Duration::from_secs(self.max_delay_secs)),
            multiplier: self.multiplier,
            max_delay: Duration::from_secs(self.max_delay_secs),
        }
    }
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay() -> u64 {
    300
}

/// Source download settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Overall timeout for one GET, body included.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Accept self-signed or otherwise invalid TLS certificates.
    #[serde(default)]
    pub accept_invalid_certs: bool,
    #[serde(default = "default_fetch_retry")]
    pub retry: RetryConfig,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout(),
            accept_invalid_certs: false,
            retry: default_fetch_retry(),
        }
    }
}

fn default_user_agent() -> String {
    concat!("ferry/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_request_timeout() -> u64 {
    3600
}

fn default_fetch_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        base_delay_secs: 5.0,
        multiplier: 2.0,
        max_delay_secs: 60,
    }
}

/// Upload settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadConfig {
    #[serde(default = "default_upload_retry")]
    pub retry: RetryConfig,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            retry: default_upload_retry(),
        }
    }
}

fn default_upload_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 2,
        base_delay_secs: 10.0,
        multiplier: 2.0,
        max_delay_secs: 120,
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Append logs to this file in addition to stderr.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

/// Metrics export
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Prometheus textfile written after every cycle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub textfile: Option<PathBuf>,
}

impl Config {
    /// Path of the completion record file.
    pub fn completions_path(&self) -> PathBuf {
        self.paths.state_dir.join("processed_urls.json")
    }

    /// Path of the failure record file.
    pub fn failures_path(&self) -> PathBuf {
        self.paths.state_dir.join("failed_downloads.json")
    }
}
