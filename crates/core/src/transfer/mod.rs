//! Transfer backends: fetching source artifacts and pushing them to a remote.
//!
//! The manager only talks to the [`Fetcher`] and [`Uploader`] traits:
//! - [`HttpFetcher`] downloads a direct link over HTTP(S)
//! - [`RcloneUploader`] drives the `rclone` binary
//! - [`FsRemote`] treats a local directory tree (e.g. a mounted drive) as the remote

mod error;
mod fs_remote;
mod http;
mod rclone;
mod traits;
mod types;

pub use error::TransferError;
pub use fs_remote::FsRemote;
pub use http::HttpFetcher;
pub use rclone::RcloneUploader;
pub use traits::{Fetcher, Uploader};
pub use types::{ChecksumType, FetchedArtifact, VerifyOptions};

use std::path::{Path, PathBuf};

/// Hidden, per-attempt sibling of `path` that a transfer writes into before
/// renaming it over `path`. Concurrent writers of the same name never share it.
pub(crate) fn part_path(path: &Path) -> PathBuf {
    let name = path.file_name().unwrap_or_default().to_string_lossy();
    path.with_file_name(format!(".{}.{}.part", name, uuid::Uuid::new_v4().simple()))
}
