//! Uploader backed by the `rclone` command line tool.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use super::error::TransferError;
use super::traits::Uploader;
use super::types::VerifyOptions;
use crate::retry::{retry_async, RetryPolicy};

const LISTREMOTES_TIMEOUT: Duration = Duration::from_secs(30);

fn listremotes_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        base_delay: Duration::from_secs(2),
        multiplier: 1.0,
        max_delay: Duration::from_secs(2),
    }
}

/// Install locations checked when `rclone` is not on `PATH`.
const COMMON_LOCATIONS: &[&str] = &[
    "/usr/local/bin/rclone",
    "/usr/bin/rclone",
    "/opt/homebrew/bin/rclone",
    "/snap/bin/rclone",
];

/// Uploads to `<remote>:<base_path>/<group>` with `rclone copy` and verifies
/// with `rclone check --one-way`.
pub struct RcloneUploader {
    binary: Option<PathBuf>,
    remote: String,
    base_path: String,
}

impl RcloneUploader {
    /// Creates an uploader, resolving the binary from `binary`, then `PATH`,
    /// then common install locations.
    pub fn new(
        remote: impl Into<String>,
        base_path: impl Into<String>,
        binary: Option<&Path>,
    ) -> Self {
        let binary = locate_binary(binary);
        match &binary {
            Some(path) => info!("Using rclone at {}", path.display()),
            None => warn!("rclone executable not found; install rclone or set remote.rclone_binary"),
        }
        Self {
            binary,
            remote: remote.into(),
            base_path: base_path.into(),
        }
    }

    pub fn binary(&self) -> Option<&Path> {
        self.binary.as_deref()
    }

    fn remote_path(&self, group: &str) -> String {
        let base = self.base_path.trim_matches('/');
        if base.is_empty() {
            format!("{}:{}", self.remote, group)
        } else {
            format!("{}:{}/{}", self.remote, base, group)
        }
    }

    fn copy_args(&self, local: &Path, group: &str) -> Vec<String> {
        vec![
            "copy".to_string(),
            local.to_string_lossy().to_string(),
            self.remote_path(group),
            "--retries".to_string(),
            "3".to_string(),
            "--low-level-retries".to_string(),
            "10".to_string(),
        ]
    }

    fn check_args(&self, local: &Path, group: &str, use_full_hash: bool) -> Vec<String> {
        let mut args = vec![
            "check".to_string(),
            local.to_string_lossy().to_string(),
            self.remote_path(group),
            "--one-way".to_string(),
        ];
        if !use_full_hash {
            args.push("--size-only".to_string());
        }
        args
    }

    /// Runs rclone with `args`, killing it if `limit` elapses.
    async fn run(&self, args: &[String], limit: Option<Duration>) -> Result<String, TransferError> {
        let binary = self.binary.as_ref().ok_or_else(|| TransferError::BinaryNotFound {
            path: PathBuf::from("rclone"),
        })?;
        let command = format!("rclone {}", args.first().map(String::as_str).unwrap_or(""));
        debug!("Running {} {}", binary.display(), args.join(" "));

        let mut cmd = Command::new(binary);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let child = cmd.output();

        let output = match limit {
            Some(limit) => timeout(limit, child).await.map_err(|_| TransferError::Timeout {
                operation: command.clone(),
                timeout_secs: limit.as_secs(),
            })?,
            None => child.await,
        }
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TransferError::BinaryNotFound {
                    path: binary.clone(),
                }
            } else {
                TransferError::io(binary, e)
            }
        })?;

        if !output.status.success() {
            return Err(TransferError::CommandFailed {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl Uploader for RcloneUploader {
    fn name(&self) -> &str {
        "rclone"
    }

    fn destination(&self, group: &str) -> String {
        self.remote_path(group)
    }

    async fn check_ready(&self) -> Result<(), TransferError> {
        let args = ["listremotes".to_string()];
        let stdout = retry_async(
            &listremotes_policy(),
            "rclone_listremotes",
            |_| self.run(&args, Some(LISTREMOTES_TIMEOUT)),
            TransferError::is_retryable,
        )
        .await?;
        let wanted = format!("{}:", self.remote);
        if stdout.lines().any(|line| line.trim() == wanted) {
            debug!("Found {} in rclone configuration", wanted);
            Ok(())
        } else {
            Err(TransferError::RemoteNotConfigured {
                name: self.remote.clone(),
            })
        }
    }

    async fn upload(&self, local: &Path, group: &str) -> Result<(), TransferError> {
        if !local.exists() {
            return Err(TransferError::ArtifactMissing {
                path: local.to_path_buf(),
            });
        }
        info!("Uploading {} to {}", local.display(), self.remote_path(group));
        self.run(&self.copy_args(local, group), None).await?;
        Ok(())
    }

    async fn verify(
        &self,
        local: &Path,
        group: &str,
        options: &VerifyOptions,
    ) -> Result<(), TransferError> {
        let args = self.check_args(local, group, options.use_full_hash);
        match self.run(&args, Some(options.timeout)).await {
            Ok(_) => Ok(()),
            Err(TransferError::CommandFailed { stderr, .. }) => {
                Err(TransferError::verification_failed(stderr))
            }
            Err(e) => Err(e),
        }
    }
}

/// Resolve the rclone executable.
pub(crate) fn locate_binary(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    let exe = if cfg!(windows) { "rclone.exe" } else { "rclone" };
    if let Some(paths) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&paths) {
            let candidate = dir.join(exe);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }

    let home_bin = std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/bin/rclone"));
    home_bin
        .into_iter()
        .chain(COMMON_LOCATIONS.iter().map(PathBuf::from))
        .find(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn uploader(binary: Option<&Path>) -> RcloneUploader {
        RcloneUploader::new("onedrive", "/Videos/", binary)
    }

    #[test]
    fn test_remote_path() {
        let up = uploader(Some(Path::new("/bin/true")));
        assert_eq!(up.remote_path("The Show"), "onedrive:Videos/The Show");

        let bare = RcloneUploader::new("gdrive", "", Some(Path::new("/bin/true")));
        assert_eq!(bare.remote_path("X"), "gdrive:X");
    }

    #[test]
    fn test_copy_and_check_args() {
        let up = uploader(Some(Path::new("/bin/true")));
        let copy = up.copy_args(Path::new("/dl/X/a.bin"), "X");
        assert_eq!(
            copy,
            vec![
                "copy",
                "/dl/X/a.bin",
                "onedrive:Videos/X",
                "--retries",
                "3",
                "--low-level-retries",
                "10"
            ]
        );

        let check = up.check_args(Path::new("/dl/X/a.bin"), "X", false);
        assert!(check.contains(&"--one-way".to_string()));
        assert!(check.contains(&"--size-only".to_string()));
        assert!(!up
            .check_args(Path::new("/dl/X/a.bin"), "X", true)
            .contains(&"--size-only".to_string()));
    }

    #[test]
    fn test_explicit_binary_wins() {
        assert_eq!(
            locate_binary(Some(Path::new("/custom/rclone"))),
            Some(PathBuf::from("/custom/rclone"))
        );
    }

    #[tokio::test]
    async fn test_missing_binary_reports_not_found() {
        let up = uploader(Some(Path::new("/nonexistent/rclone-binary")));
        let err = up.check_ready().await.unwrap_err();
        assert!(matches!(err, TransferError::BinaryNotFound { .. }));
    }

    #[cfg(unix)]
    fn fake_rclone(dir: &TempDir, script: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.path().join("rclone");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", script)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_check_ready_finds_remote() {
        let dir = TempDir::new().unwrap();
        let bin = fake_rclone(&dir, "echo 'gdrive:'\necho 'onedrive:'");
        assert!(uploader(Some(&bin)).check_ready().await.is_ok());

        let other = RcloneUploader::new("dropbox", "Videos", Some(&bin));
        let err = other.check_ready().await.unwrap_err();
        assert!(matches!(err, TransferError::RemoteNotConfigured { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_verify_failure_carries_stderr() {
        let dir = TempDir::new().unwrap();
        let bin = fake_rclone(&dir, "echo '1 differences found' >&2\nexit 1");
        let err = uploader(Some(&bin))
            .verify(Path::new("/tmp/a"), "X", &VerifyOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::VerificationFailed { .. }));
        assert!(err.to_string().contains("1 differences found"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_verify_times_out() {
        let dir = TempDir::new().unwrap();
        let bin = fake_rclone(&dir, "sleep 5");
        let options = VerifyOptions {
            timeout: Duration::from_millis(100),
            ..VerifyOptions::default()
        };
        let err = uploader(Some(&bin))
            .verify(Path::new("/tmp/a"), "X", &options)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Timeout { .. }));
    }
}
