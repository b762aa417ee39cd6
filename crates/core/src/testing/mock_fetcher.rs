//! Mock fetcher for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::ActiveGuard;
use crate::transfer::{FetchedArtifact, Fetcher, TransferError};

/// A recorded fetch call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedFetch {
    pub source: String,
    pub dest_dir: PathBuf,
    pub success: bool,
}

/// Mock implementation of the Fetcher trait.
///
/// Writes a small real file into the destination directory so the rest of
/// the pipeline sees an artifact on disk. Failures can be queued one at a
/// time or made permanent.
///
/// # Example
///
/// ```rust,ignore
/// use ferry_core::testing::MockFetcher;
///
/// let fetcher = MockFetcher::new();
/// fetcher.queue_error(TransferError::Request("reset".into())).await;
///
/// // First fetch fails, the next succeeds
/// assert_eq!(fetcher.fetch_count().await, 0);
/// ```
#[derive(Debug)]
pub struct MockFetcher {
    fetches: Arc<RwLock<Vec<RecordedFetch>>>,
    queued_errors: Arc<RwLock<VecDeque<TransferError>>>,
    always_fail: Arc<RwLock<Option<String>>>,
    content: Arc<RwLock<Vec<u8>>>,
    file_name: Arc<RwLock<Option<String>>>,
    skip_write: Arc<RwLock<bool>>,
    delay: Arc<RwLock<Duration>>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            fetches: Arc::new(RwLock::new(Vec::new())),
            queued_errors: Arc::new(RwLock::new(VecDeque::new())),
            always_fail: Arc::new(RwLock::new(None)),
            content: Arc::new(RwLock::new(b"mock artifact".to_vec())),
            file_name: Arc::new(RwLock::new(None)),
            skip_write: Arc::new(RwLock::new(false)),
            delay: Arc::new(RwLock::new(Duration::ZERO)),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Get all recorded fetches.
    pub async fn recorded_fetches(&self) -> Vec<RecordedFetch> {
        self.fetches.read().await.clone()
    }

    pub async fn fetch_count(&self) -> usize {
        self.fetches.read().await.len()
    }

    /// Fail the next fetch with `error`; queued errors are used in order.
    pub async fn queue_error(&self, error: TransferError) {
        self.queued_errors.write().await.push_back(error);
    }

    /// Fail every fetch with `message` until cleared.
    pub async fn fail_always(&self, message: impl Into<String>) {
        *self.always_fail.write().await = Some(message.into());
    }

    pub async fn clear_failures(&self) {
        self.queued_errors.write().await.clear();
        *self.always_fail.write().await = None;
    }

    /// Bytes written for each successful fetch.
    pub async fn set_content(&self, content: impl Into<Vec<u8>>) {
        *self.content.write().await = content.into();
    }

    /// Name of the written file. Defaults to the last URL path segment.
    pub async fn set_file_name(&self, name: impl Into<String>) {
        *self.file_name.write().await = Some(name.into());
    }

    /// Report success without writing anything to disk.
    pub async fn set_skip_write(&self, skip: bool) {
        *self.skip_write.write().await = skip;
    }

    /// Simulated fetch duration.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = delay;
    }

    /// Highest number of fetches observed running at the same time.
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    async fn next_error(&self) -> Option<TransferError> {
        if let Some(err) = self.queued_errors.write().await.pop_front() {
            return Some(err);
        }
        self.always_fail
            .read()
            .await
            .clone()
            .map(TransferError::Request)
    }

    async fn write_artifact(
        &self,
        source: &str,
        dest_dir: &Path,
    ) -> Result<FetchedArtifact, TransferError> {
        let name = match self.file_name.read().await.clone() {
            Some(name) => name,
            None => source
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .filter(|s| !s.is_empty() && !s.contains(':'))
                .unwrap_or("file.bin")
                .to_string(),
        };
        let path = dest_dir.join(name);
        let content = self.content.read().await.clone();

        if !*self.skip_write.read().await {
            tokio::fs::create_dir_all(dest_dir)
                .await
                .map_err(|e| TransferError::io(dest_dir, e))?;
            tokio::fs::write(&path, &content)
                .await
                .map_err(|e| TransferError::io(&path, e))?;
        }

        Ok(FetchedArtifact {
            path,
            bytes: content.len() as u64,
        })
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch(&self, source: &str, dest_dir: &Path) -> Result<FetchedArtifact, TransferError> {
        let _guard = ActiveGuard::enter(&self.active, &self.max_active);

        let delay = *self.delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let result = match self.next_error().await {
            Some(err) => Err(err),
            None => self.write_artifact(source, dest_dir).await,
        };

        self.fetches.write().await.push(RecordedFetch {
            source: source.to_string(),
            dest_dir: dest_dir.to_path_buf(),
            success: result.is_ok(),
        });
        result
    }
}
