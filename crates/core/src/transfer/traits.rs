//! Trait definitions for the transfer backends.

use async_trait::async_trait;
use std::path::Path;

use super::error::TransferError;
use super::types::{FetchedArtifact, VerifyOptions};

/// Produces a local artifact from a source reference.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Returns the name of this fetcher implementation.
    fn name(&self) -> &str;

    /// Fetch `source` into `dest_dir`.
    ///
    /// Re-fetching after a partial failure may redo work but must not leave a
    /// truncated file under the final name.
    async fn fetch(&self, source: &str, dest_dir: &Path) -> Result<FetchedArtifact, TransferError>;
}

/// Copies local artifacts to a remote and confirms the copy.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Returns the name of this uploader implementation.
    fn name(&self) -> &str;

    /// Human-readable destination for a group, for logs and diagnostics.
    fn destination(&self, group: &str) -> String;

    /// Confirms the remote is reachable and configured.
    async fn check_ready(&self) -> Result<(), TransferError>;

    /// Copy `local` (file or directory) under the remote `group`.
    async fn upload(&self, local: &Path, group: &str) -> Result<(), TransferError>;

    /// Confirm the remote copy of `local` under `group` matches it.
    async fn verify(
        &self,
        local: &Path,
        group: &str,
        options: &VerifyOptions,
    ) -> Result<(), TransferError>;
}
