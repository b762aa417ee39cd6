//! Testing utilities: mock transfer backends and fixtures.
//!
//! The mocks record every call and can be scripted to fail, so manager
//! behaviour can be exercised without a network or an rclone install.
//!
//! # Example
//!
//! ```rust,ignore
//! use ferry_core::testing::{MockFetcher, MockUploader};
//!
//! let fetcher = Arc::new(MockFetcher::new());
//! let uploader = Arc::new(MockUploader::new());
//! uploader.fail_uploads("quota exceeded").await;
//!
//! let manager = BulkManager::new(config, state, fetcher.clone(), uploader.clone());
//! ```

mod mock_fetcher;
mod mock_uploader;

pub use mock_fetcher::{MockFetcher, RecordedFetch};
pub use mock_uploader::{MockUploader, RecordedUpload, RecordedVerify};

use std::sync::atomic::{AtomicUsize, Ordering};

/// Tracks how many calls are running, keeping the high-water mark.
pub(crate) struct ActiveGuard<'a> {
    active: &'a AtomicUsize,
}

impl<'a> ActiveGuard<'a> {
    pub(crate) fn enter(active: &'a AtomicUsize, max_active: &AtomicUsize) -> Self {
        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
        max_active.fetch_max(now, Ordering::SeqCst);
        Self { active }
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use crate::manager::ManagerConfig;
    use crate::retry::RetryPolicy;
    use crate::state::StateBook;
    use crate::transfer::VerifyOptions;

    /// Write a backlog file with one identity per line.
    pub fn write_backlog(dir: &Path, lines: &[&str]) -> PathBuf {
        let path = dir.join("need_to_download_url.txt");
        let mut body = lines.join("\n");
        body.push('\n');
        std::fs::write(&path, body).expect("write backlog");
        path
    }

    /// Manager config rooted at `dir` with no backend retries and a short
    /// cycle interval.
    pub fn manager_config(dir: &Path) -> ManagerConfig {
        ManagerConfig {
            working_dir: dir.join("downloads"),
            backlog_file: dir.join("need_to_download_url.txt"),
            cycle_interval: Duration::from_millis(20),
            failure_ceiling: 3,
            auto_delete: true,
            continue_on_health_failure: false,
            max_concurrent_items: 1,
            item_timeout: None,
            verification_enabled: true,
            verify: VerifyOptions {
                timeout: Duration::from_secs(5),
                ..VerifyOptions::default()
            },
            fetch_retry: RetryPolicy::no_retry(),
            upload_retry: RetryPolicy::no_retry(),
            metrics_textfile: None,
        }
    }

    /// Open a state book under `dir/state`.
    pub fn open_state(dir: &Path) -> StateBook {
        let state_dir = dir.join("state");
        StateBook::open(
            &state_dir.join("processed_urls.json"),
            &state_dir.join("failed_downloads.json"),
        )
        .expect("open state")
    }
}
