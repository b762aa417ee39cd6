//! Types shared by the transfer backends.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Digest used for full-content verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumType {
    #[default]
    Sha256,
    Md5,
}

/// How a completed upload is verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyOptions {
    /// Compare content digests instead of sizes only.
    pub use_full_hash: bool,
    /// Digest for backends that hash locally.
    pub checksum: ChecksumType,
    /// Verification reports failure once this elapses.
    pub timeout: Duration,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            use_full_hash: false,
            checksum: ChecksumType::Sha256,
            timeout: Duration::from_secs(300),
        }
    }
}

/// A fetched local artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedArtifact {
    /// File or directory holding the fetched content.
    pub path: PathBuf,
    /// Bytes written, when known.
    pub bytes: u64,
}
