//! Mock uploader for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::ActiveGuard;
use crate::transfer::{TransferError, Uploader, VerifyOptions};

/// A recorded upload for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedUpload {
    pub local: PathBuf,
    pub group: String,
    pub success: bool,
}

/// A recorded verification for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedVerify {
    pub local: PathBuf,
    pub group: String,
    pub use_full_hash: bool,
    pub success: bool,
}

/// Mock implementation of the Uploader trait.
///
/// Provides controllable behavior for testing:
/// - Track uploads and verifications for assertions
/// - Queue one-off failures or fail permanently
/// - Report the remote as not configured
/// - Simulate slow uploads
#[derive(Debug)]
pub struct MockUploader {
    uploads: Arc<RwLock<Vec<RecordedUpload>>>,
    verifies: Arc<RwLock<Vec<RecordedVerify>>>,
    upload_errors: Arc<RwLock<VecDeque<TransferError>>>,
    verify_errors: Arc<RwLock<VecDeque<TransferError>>>,
    upload_fail_always: Arc<RwLock<Option<String>>>,
    verify_fail_always: Arc<RwLock<Option<String>>>,
    not_ready: Arc<RwLock<Option<String>>>,
    upload_delay: Arc<RwLock<Duration>>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl Default for MockUploader {
    fn default() -> Self {
        Self::new()
    }
}

impl MockUploader {
    pub fn new() -> Self {
        Self {
            uploads: Arc::new(RwLock::new(Vec::new())),
            verifies: Arc::new(RwLock::new(Vec::new())),
            upload_errors: Arc::new(RwLock::new(VecDeque::new())),
            verify_errors: Arc::new(RwLock::new(VecDeque::new())),
            upload_fail_always: Arc::new(RwLock::new(None)),
            verify_fail_always: Arc::new(RwLock::new(None)),
            not_ready: Arc::new(RwLock::new(None)),
            upload_delay: Arc::new(RwLock::new(Duration::ZERO)),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn recorded_uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.read().await.clone()
    }

    pub async fn upload_count(&self) -> usize {
        self.uploads.read().await.len()
    }

    pub async fn recorded_verifies(&self) -> Vec<RecordedVerify> {
        self.verifies.read().await.clone()
    }

    pub async fn verify_count(&self) -> usize {
        self.verifies.read().await.len()
    }

    /// Fail the next upload with `error`.
    pub async fn queue_upload_error(&self, error: TransferError) {
        self.upload_errors.write().await.push_back(error);
    }

    /// Fail the next verification with `error`.
    pub async fn queue_verify_error(&self, error: TransferError) {
        self.verify_errors.write().await.push_back(error);
    }

    /// Fail every upload with `message` until cleared.
    pub async fn fail_uploads(&self, message: impl Into<String>) {
        *self.upload_fail_always.write().await = Some(message.into());
    }

    /// Fail every verification with `message` until cleared.
    pub async fn fail_verifies(&self, message: impl Into<String>) {
        *self.verify_fail_always.write().await = Some(message.into());
    }

    pub async fn clear_failures(&self) {
        self.upload_errors.write().await.clear();
        self.verify_errors.write().await.clear();
        *self.upload_fail_always.write().await = None;
        *self.verify_fail_always.write().await = None;
    }

    /// Make `check_ready` report the named remote as missing.
    pub async fn set_not_ready(&self, remote: impl Into<String>) {
        *self.not_ready.write().await = Some(remote.into());
    }

    /// Simulated upload duration.
    pub async fn set_upload_delay(&self, delay: Duration) {
        *self.upload_delay.write().await = delay;
    }

    /// Highest number of uploads observed running at the same time.
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Uploader for MockUploader {
    fn name(&self) -> &str {
        "mock"
    }

    fn destination(&self, group: &str) -> String {
        format!("mock:{}", group)
    }

    async fn check_ready(&self) -> Result<(), TransferError> {
        match self.not_ready.read().await.clone() {
            Some(name) => Err(TransferError::RemoteNotConfigured { name }),
            None => Ok(()),
        }
    }

    async fn upload(&self, local: &Path, group: &str) -> Result<(), TransferError> {
        let _guard = ActiveGuard::enter(&self.active, &self.max_active);

        let delay = *self.upload_delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let queued = self.upload_errors.write().await.pop_front();
        let result = match queued {
            Some(err) => Err(err),
            None => match self.upload_fail_always.read().await.clone() {
                Some(message) => Err(TransferError::CommandFailed {
                    command: "mock upload".to_string(),
                    status: "exit status: 1".to_string(),
                    stderr: message,
                }),
                None => Ok(()),
            },
        };

        self.uploads.write().await.push(RecordedUpload {
            local: local.to_path_buf(),
            group: group.to_string(),
            success: result.is_ok(),
        });
        result
    }

    async fn verify(
        &self,
        local: &Path,
        group: &str,
        options: &VerifyOptions,
    ) -> Result<(), TransferError> {
        let queued = self.verify_errors.write().await.pop_front();
        let result = match queued {
            Some(err) => Err(err),
            None => match self.verify_fail_always.read().await.clone() {
                Some(message) => Err(TransferError::verification_failed(message)),
                None => Ok(()),
            },
        };

        self.verifies.write().await.push(RecordedVerify {
            local: local.to_path_buf(),
            group: group.to_string(),
            use_full_hash: options.use_full_hash,
            success: result.is_ok(),
        });
        result
    }
}
