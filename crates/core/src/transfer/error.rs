//! Error types for the transfer backends.

use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by fetchers and uploaders.
///
/// The `Display` text is what ends up as `last_error` in the retry ledger.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The source reference cannot be fetched by this backend.
    #[error("Invalid source {source_ref}: {reason}")]
    InvalidSource { source_ref: String, reason: String },

    /// Server answered with a non-success status.
    #[error("HTTP {status} fetching {url}")]
    Http { status: u16, url: String },

    /// Request could not be completed (connect, TLS, body read).
    #[error("Request failed: {0}")]
    Request(String),

    /// Backend reported success but the artifact is not on disk.
    #[error("Artifact missing on disk: {path}")]
    ArtifactMissing { path: PathBuf },

    /// Required external binary not found.
    #[error("Binary not found: {path}")]
    BinaryNotFound { path: PathBuf },

    /// The configured remote does not exist.
    #[error("Remote not configured: {name}")]
    RemoteNotConfigured { name: String },

    /// External command exited unsuccessfully.
    #[error("{command} failed ({status}): {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    /// Operation exceeded its deadline.
    #[error("{operation} timed out after {timeout_secs} seconds")]
    Timeout {
        operation: String,
        timeout_secs: u64,
    },

    /// Remote copy does not match the local artifact.
    #[error("Verification failed: {reason}")]
    VerificationFailed { reason: String },

    /// Local I/O error.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TransferError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn verification_failed(reason: impl Into<String>) -> Self {
        Self::VerificationFailed {
            reason: reason.into(),
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            Self::Request(_)
            | Self::CommandFailed { .. }
            | Self::Timeout { .. }
            | Self::Io { .. } => true,
            Self::InvalidSource { .. }
            | Self::ArtifactMissing { .. }
            | Self::BinaryNotFound { .. }
            | Self::RemoteNotConfigured { .. }
            | Self::VerificationFailed { .. } => false,
        }
    }
}

impl From<reqwest::Error> for TransferError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => Self::Http {
                status: status.as_u16(),
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
            },
            None => Self::Request(e.to_string()),
        }
    }
}
