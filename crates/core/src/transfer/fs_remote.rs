//! Directory-tree remote, for mounted drives and tests.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::time::timeout;
use tracing::{debug, info};

use super::error::TransferError;
use super::part_path;
use super::traits::Uploader;
use super::types::{ChecksumType, VerifyOptions};

const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Uploads by copying into `<root>/<base_path>/<group>/`.
///
/// Files land directly under the group directory; a directory artifact has
/// its contents copied there, matching `rclone copy`.
pub struct FsRemote {
    root: PathBuf,
    base_path: String,
    buffer_size: usize,
}

impl FsRemote {
    pub fn new(root: impl Into<PathBuf>, base_path: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_path: base_path.into(),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    /// Directory that holds a group's uploads.
    pub fn group_dir(&self, group: &str) -> PathBuf {
        let base = self.base_path.trim_matches('/');
        if base.is_empty() {
            self.root.join(group)
        } else {
            self.root.join(base).join(group)
        }
    }

    /// Files making up an artifact, paired with their path relative to the
    /// group directory.
    async fn collect_files(&self, local: &Path) -> Result<Vec<(PathBuf, PathBuf)>, TransferError> {
        let meta = fs::metadata(local).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TransferError::ArtifactMissing {
                    path: local.to_path_buf(),
                }
            } else {
                TransferError::io(local, e)
            }
        })?;

        if meta.is_file() {
            let name = local.file_name().ok_or_else(|| TransferError::ArtifactMissing {
                path: local.to_path_buf(),
            })?;
            return Ok(vec![(local.to_path_buf(), PathBuf::from(name))]);
        }

        let mut files = Vec::new();
        let mut pending = vec![local.to_path_buf()];
        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir)
                .await
                .map_err(|e| TransferError::io(&dir, e))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| TransferError::io(&dir, e))?
            {
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| TransferError::io(&path, e))?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() {
                    let rel = path
                        .strip_prefix(local)
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|_| PathBuf::from(entry.file_name()));
                    files.push((path, rel));
                }
            }
        }
        files.sort_by(|a, b| a.1.cmp(&b.1));
        Ok(files)
    }

    /// Copies a file via a hidden per-attempt `.part` sibling renamed on
    /// completion; the part file is removed if the copy fails.
    async fn copy_file(&self, source: &Path, destination: &Path) -> Result<u64, TransferError> {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| TransferError::io(parent, e))?;
        }

        let part = part_path(destination);
        let copied = match self.copy_into(source, &part).await {
            Ok(bytes) => fs::rename(&part, destination)
                .await
                .map(|_| bytes)
                .map_err(|e| TransferError::io(destination, e)),
            Err(e) => Err(e),
        };
        if copied.is_err() {
            let _ = fs::remove_file(&part).await;
        }
        copied
    }

    async fn copy_into(&self, source: &Path, part: &Path) -> Result<u64, TransferError> {
        let source_file = File::open(source)
            .await
            .map_err(|e| TransferError::io(source, e))?;
        let dest_file = File::create(part)
            .await
            .map_err(|e| TransferError::io(part, e))?;

        let mut reader = BufReader::with_capacity(self.buffer_size, source_file);
        let mut writer = BufWriter::with_capacity(self.buffer_size, dest_file);
        let mut buffer = vec![0u8; self.buffer_size];
        let mut total_bytes = 0u64;

        loop {
            let bytes_read = reader
                .read(&mut buffer)
                .await
                .map_err(|e| TransferError::io(source, e))?;
            if bytes_read == 0 {
                break;
            }
            writer
                .write_all(&buffer[..bytes_read])
                .await
                .map_err(|e| TransferError::io(part, e))?;
            total_bytes += bytes_read as u64;
        }

        writer
            .flush()
            .await
            .map_err(|e| TransferError::io(part, e))?;
        Ok(total_bytes)
    }

    /// Calculates the checksum of a file using the specified algorithm.
    async fn calculate_checksum(
        &self,
        path: &Path,
        checksum_type: ChecksumType,
    ) -> Result<String, TransferError> {
        let file = File::open(path)
            .await
            .map_err(|e| TransferError::io(path, e))?;
        let mut reader = BufReader::with_capacity(self.buffer_size, file);
        let mut buffer = vec![0u8; self.buffer_size];

        match checksum_type {
            ChecksumType::Sha256 => {
                let mut hasher = Sha256::new();
                loop {
                    let n = reader
                        .read(&mut buffer)
                        .await
                        .map_err(|e| TransferError::io(path, e))?;
                    if n == 0 {
                        break;
                    }
                    hasher.update(&buffer[..n]);
                }
                Ok(format!("{:x}", hasher.finalize()))
            }
            ChecksumType::Md5 => {
                let mut context = md5::Context::new();
                loop {
                    let n = reader
                        .read(&mut buffer)
                        .await
                        .map_err(|e| TransferError::io(path, e))?;
                    if n == 0 {
                        break;
                    }
                    context.consume(&buffer[..n]);
                }
                Ok(format!("{:x}", context.compute()))
            }
        }
    }

    async fn compare(
        &self,
        local: &Path,
        group: &str,
        options: &VerifyOptions,
    ) -> Result<(), TransferError> {
        let group_dir = self.group_dir(group);
        for (source, rel) in self.collect_files(local).await? {
            let remote = group_dir.join(&rel);
            let remote_meta = match fs::metadata(&remote).await {
                Ok(meta) => meta,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(TransferError::verification_failed(format!(
                        "{} missing on remote",
                        rel.display()
                    )))
                }
                Err(e) => return Err(TransferError::io(&remote, e)),
            };
            let local_len = fs::metadata(&source)
                .await
                .map_err(|e| TransferError::io(&source, e))?
                .len();
            if local_len != remote_meta.len() {
                return Err(TransferError::verification_failed(format!(
                    "size mismatch for {}: local {} bytes, remote {} bytes",
                    rel.display(),
                    local_len,
                    remote_meta.len()
                )));
            }

            if options.use_full_hash {
                let expected = self.calculate_checksum(&source, options.checksum).await?;
                let actual = self.calculate_checksum(&remote, options.checksum).await?;
                if expected != actual {
                    return Err(TransferError::verification_failed(format!(
                        "checksum mismatch for {}: expected {}, got {}",
                        rel.display(),
                        expected,
                        actual
                    )));
                }
            }
            debug!("Verified {}", remote.display());
        }
        Ok(())
    }
}

#[async_trait]
impl Uploader for FsRemote {
    fn name(&self) -> &str {
        "filesystem"
    }

    fn destination(&self, group: &str) -> String {
        self.group_dir(group).display().to_string()
    }

    async fn check_ready(&self) -> Result<(), TransferError> {
        match fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            _ => Err(TransferError::RemoteNotConfigured {
                name: self.root.display().to_string(),
            }),
        }
    }

    async fn upload(&self, local: &Path, group: &str) -> Result<(), TransferError> {
        let group_dir = self.group_dir(group);
        let mut total = 0u64;
        for (source, rel) in self.collect_files(local).await? {
            total += self.copy_file(&source, &group_dir.join(rel)).await?;
        }
        info!(
            "Copied {} ({} bytes) to {}",
            local.display(),
            total,
            group_dir.display()
        );
        Ok(())
    }

    async fn verify(
        &self,
        local: &Path,
        group: &str,
        options: &VerifyOptions,
    ) -> Result<(), TransferError> {
        timeout(options.timeout, self.compare(local, group, options))
            .await
            .map_err(|_| TransferError::Timeout {
                operation: "verify".to_string(),
                timeout_secs: options.timeout.as_secs(),
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as std_fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, TempDir, FsRemote) {
        let local = TempDir::new().unwrap();
        let remote = TempDir::new().unwrap();
        let fs_remote = FsRemote::new(remote.path(), "Videos").with_buffer_size(7);
        (local, remote, fs_remote)
    }

    fn full_hash(checksum: ChecksumType) -> VerifyOptions {
        VerifyOptions {
            use_full_hash: true,
            checksum,
            ..VerifyOptions::default()
        }
    }

    #[tokio::test]
    async fn test_upload_and_verify_file() {
        let (local, remote, fs_remote) = setup();
        let file = local.path().join("ep1.mp4");
        std_fs::write(&file, b"some video bytes").unwrap();

        fs_remote.upload(&file, "Show").await.unwrap();

        let copied = remote.path().join("Videos/Show/ep1.mp4");
        assert_eq!(std_fs::read(&copied).unwrap(), b"some video bytes");
        assert_eq!(names_in(&remote.path().join("Videos/Show")), vec!["ep1.mp4"]);

        fs_remote
            .verify(&file, "Show", &VerifyOptions::default())
            .await
            .unwrap();
        fs_remote
            .verify(&file, "Show", &full_hash(ChecksumType::Md5))
            .await
            .unwrap();
    }

    fn names_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std_fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_concurrent_uploads_of_same_name_stay_whole() {
        let (local, remote, fs_remote) = setup();
        let first = local.path().join("a").join("video.bin");
        let second = local.path().join("b").join("video.bin");
        std_fs::create_dir_all(first.parent().unwrap()).unwrap();
        std_fs::create_dir_all(second.parent().unwrap()).unwrap();
        std_fs::write(&first, vec![b'a'; 64 * 1024]).unwrap();
        std_fs::write(&second, vec![b'b'; 64 * 1024]).unwrap();

        let (a, b) = tokio::join!(
            fs_remote.upload(&first, "Show"),
            fs_remote.upload(&second, "Show")
        );
        a.unwrap();
        b.unwrap();

        let copied = std_fs::read(remote.path().join("Videos/Show/video.bin")).unwrap();
        assert_eq!(copied.len(), 64 * 1024);
        assert!(copied.iter().all(|&c| c == copied[0]));
        assert_eq!(names_in(&remote.path().join("Videos/Show")), vec!["video.bin"]);
    }

    #[tokio::test]
    async fn test_upload_directory_contents() {
        let (local, remote, fs_remote) = setup();
        let season = local.path().join("season1");
        std_fs::create_dir_all(season.join("extras")).unwrap();
        std_fs::write(season.join("a.mkv"), b"aaa").unwrap();
        std_fs::write(season.join("extras/b.mkv"), b"bbbb").unwrap();

        fs_remote.upload(&season, "Show").await.unwrap();

        assert!(remote.path().join("Videos/Show/a.mkv").is_file());
        assert!(remote.path().join("Videos/Show/extras/b.mkv").is_file());
        fs_remote
            .verify(&season, "Show", &full_hash(ChecksumType::Sha256))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_verify_detects_size_mismatch() {
        let (local, remote, fs_remote) = setup();
        let file = local.path().join("ep1.mp4");
        std_fs::write(&file, b"0123456789").unwrap();
        fs_remote.upload(&file, "Show").await.unwrap();
        std_fs::write(remote.path().join("Videos/Show/ep1.mp4"), b"01234").unwrap();

        let err = fs_remote
            .verify(&file, "Show", &VerifyOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("size mismatch"));
    }

    #[tokio::test]
    async fn test_full_hash_catches_same_size_corruption() {
        let (local, remote, fs_remote) = setup();
        let file = local.path().join("ep1.mp4");
        std_fs::write(&file, b"0123456789").unwrap();
        fs_remote.upload(&file, "Show").await.unwrap();
        std_fs::write(remote.path().join("Videos/Show/ep1.mp4"), b"9876543210").unwrap();

        assert!(fs_remote
            .verify(&file, "Show", &VerifyOptions::default())
            .await
            .is_ok());
        let err = fs_remote
            .verify(&file, "Show", &full_hash(ChecksumType::Sha256))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::VerificationFailed { .. }));
    }

    #[tokio::test]
    async fn test_verify_missing_remote() {
        let (local, _remote, fs_remote) = setup();
        let file = local.path().join("never-uploaded.bin");
        std_fs::write(&file, b"x").unwrap();

        let err = fs_remote
            .verify(&file, "Show", &VerifyOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing on remote"));
    }

    #[tokio::test]
    async fn test_upload_missing_artifact() {
        let (local, _remote, fs_remote) = setup();
        let err = fs_remote
            .upload(&local.path().join("nope"), "Show")
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::ArtifactMissing { .. }));
    }

    #[tokio::test]
    async fn test_check_ready() {
        let (_local, remote, fs_remote) = setup();
        assert!(fs_remote.check_ready().await.is_ok());

        let missing = FsRemote::new(remote.path().join("not-mounted"), "Videos");
        assert!(matches!(
            missing.check_ready().await.unwrap_err(),
            TransferError::RemoteNotConfigured { .. }
        ));
    }
}
