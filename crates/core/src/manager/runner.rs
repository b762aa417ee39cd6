//! Bulk manager implementation.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::{broadcast, Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::backlog::{load_backlog, BacklogError};
use crate::health::{HealthGate, HealthReport};
use crate::identity::{group_label, IdentityHash};
use crate::metrics;
use crate::retry::retry_async;
use crate::state::{Claim, CompletionRecord, StateBook};
use crate::transfer::{Fetcher, TransferError, Uploader};

use super::config::ManagerConfig;
use super::types::{CycleReport, ItemOutcome, ManagerError, Stage};

const DEADLINE_EXCEEDED: &str = "item deadline exceeded";

/// A verified upload waiting to be recorded.
struct Delivered {
    local_path: PathBuf,
    /// Per-item directory the artifact was fetched into.
    item_dir: PathBuf,
    group: String,
}

/// Holds an in-flight claim and releases it when dropped, so a panicking
/// item task cannot leave its identity claimed for the rest of the process.
struct ClaimGuard {
    state: Arc<Mutex<StateBook>>,
    hash: Option<IdentityHash>,
}

impl ClaimGuard {
    fn new(state: &Arc<Mutex<StateBook>>, hash: &IdentityHash) -> Self {
        metrics::ITEMS_IN_FLIGHT.inc();
        Self {
            state: Arc::clone(state),
            hash: Some(hash.clone()),
        }
    }

    async fn release(mut self) {
        if let Some(hash) = self.hash.take() {
            self.state.lock().await.release(&hash);
            metrics::ITEMS_IN_FLIGHT.dec();
        }
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        let Some(hash) = self.hash.take() else {
            return;
        };
        metrics::ITEMS_IN_FLIGHT.dec();
        if let Ok(mut state) = self.state.try_lock() {
            state.release(&hash);
            return;
        }
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            state.lock().await.release(&hash);
        });
    }
}

/// Triggers a clean shutdown of a [`BulkManager`] from another task.
#[derive(Clone)]
pub struct ShutdownHandle {
    stopping: Arc<AtomicBool>,
    tx: broadcast::Sender<()>,
}

impl ShutdownHandle {
    /// Wake the inter-cycle sleep and abandon in-flight items.
    pub fn trigger(&self) {
        if !self.stopping.swap(true, Ordering::SeqCst) {
            info!("Shutdown requested");
        }
        let _ = self.tx.send(());
    }

    pub fn is_triggered(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }
}

/// The bulk manager. Cheap to clone; clones share state and shutdown.
#[derive(Clone)]
pub struct BulkManager {
    config: ManagerConfig,
    state: Arc<Mutex<StateBook>>,
    fetcher: Arc<dyn Fetcher>,
    uploader: Arc<dyn Uploader>,
    health: HealthGate,

    // Runtime state
    running: Arc<AtomicBool>,
    stopping: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl BulkManager {
    /// Create a new manager over an opened state book.
    pub fn new(
        config: ManagerConfig,
        state: StateBook,
        fetcher: Arc<dyn Fetcher>,
        uploader: Arc<dyn Uploader>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let health = HealthGate::new(Arc::clone(&uploader), config.backlog_file.clone());

        Self {
            config,
            state: Arc::new(Mutex::new(state)),
            fetcher,
            uploader,
            health,
            running: Arc::new(AtomicBool::new(false)),
            stopping: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            stopping: Arc::clone(&self.stopping),
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Identities currently claimed by a running item.
    pub async fn in_flight_count(&self) -> usize {
        self.state.lock().await.in_flight_count()
    }

    fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Run the health gate and apply the startup policy.
    pub async fn preflight(&self) -> Result<HealthReport, ManagerError> {
        let report = self.health.check().await;
        if report.ok {
            return Ok(report);
        }
        if self.config.continue_on_health_failure {
            warn!(
                "Health checks failed ({} reasons), continuing because continue_on_health_failure is set",
                report.reasons.len()
            );
            return Ok(report);
        }
        Err(ManagerError::HealthGateRefused {
            reasons: report.reasons,
        })
    }

    /// Preflight, then a single cycle.
    pub async fn run_once(&self) -> Result<CycleReport, ManagerError> {
        self.preflight().await?;
        Ok(self.run_cycle().await)
    }

    /// Preflight, then cycle and sleep until shutdown is triggered.
    pub async fn run_forever(&self) -> Result<(), ManagerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ManagerError::AlreadyRunning);
        }

        let result = self.cycle_loop().await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn cycle_loop(&self) -> Result<(), ManagerError> {
        self.preflight().await?;
        info!(
            "Starting bulk manager, cycle interval {}s",
            self.config.cycle_interval.as_secs()
        );

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            if self.is_stopping() {
                break;
            }
            self.run_cycle().await;
            if self.is_stopping() {
                break;
            }

            info!(
                "Sleeping for {} seconds",
                self.config.cycle_interval.as_secs()
            );
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Manager loop received shutdown signal");
                    break;
                }
                _ = tokio::time::sleep(self.config.cycle_interval) => {}
            }
        }
        info!("Bulk manager stopped");
        Ok(())
    }

    /// One full cycle: failure sweep, then backlog sweep.
    pub async fn run_cycle(&self) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport::default();
        let mut attempted = HashSet::new();

        let retries: Vec<String> = {
            let mut state = self.state.lock().await;
            if let Err(e) = state.ledger_mut().prune_unidentified() {
                error!("Failed to prune failure records: {}", e);
            }
            state
                .ledger()
                .pending(self.config.failure_ceiling)
                .into_iter()
                .map(|(_, record)| record.identity)
                .collect()
        };
        if !retries.is_empty() {
            info!("Retrying {} previously failed items", retries.len());
        }
        report.retried = retries.len();
        self.process_batch(retries, &mut attempted, &mut report).await;

        if !self.is_stopping() {
            let backlog = match load_backlog(&self.config.backlog_file).await {
                Ok(items) => items,
                Err(BacklogError::NotFound(path)) => {
                    warn!("Backlog file not found: {}", path.display());
                    Vec::new()
                }
                Err(e) => {
                    error!("Error loading backlog: {}", e);
                    Vec::new()
                }
            };
            if backlog.is_empty() {
                warn!("No URLs to process");
            }
            report.backlog = backlog.len();
            self.process_batch(backlog, &mut attempted, &mut report).await;
        }

        report.duration = started.elapsed();
        metrics::CYCLES_TOTAL.inc();
        metrics::CYCLE_DURATION
            .with_label_values(&[])
            .observe(report.duration.as_secs_f64());
        self.publish_metrics().await;

        info!(
            completed = report.completed,
            failed = report.failed,
            skipped = report.already_done + report.exhausted + report.in_flight,
            abandoned = report.abandoned,
            duration_ms = report.duration.as_millis() as u64,
            "Cycle finished"
        );
        report
    }

    /// Process identities not yet attempted this cycle, at most
    /// `max_concurrent_items` at a time.
    async fn process_batch(
        &self,
        identities: Vec<String>,
        attempted: &mut HashSet<IdentityHash>,
        report: &mut CycleReport,
    ) {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_items.max(1)));
        let mut tasks = JoinSet::new();

        for identity in identities {
            if self.is_stopping() {
                break;
            }
            if !attempted.insert(IdentityHash::of(&identity)) {
                continue;
            }

            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let manager = self.clone();
            tasks.spawn(async move {
                let outcome = manager.process_item(&identity).await;
                drop(permit);
                outcome
            });

            while let Some(joined) = tasks.try_join_next() {
                Self::tally(joined, report);
            }
        }

        while let Some(joined) = tasks.join_next().await {
            Self::tally(joined, report);
        }
    }

    fn tally(joined: Result<ItemOutcome, tokio::task::JoinError>, report: &mut CycleReport) {
        match joined {
            Ok(outcome) => report.record(&outcome),
            Err(e) => {
                error!("Item task failed: {}", e);
                report.failed += 1;
            }
        }
    }

    /// Drive one identity through fetch, upload, verify and completion.
    pub async fn process_item(&self, identity: &str) -> ItemOutcome {
        let identity = identity.trim();
        let hash = IdentityHash::of(identity);

        let claim = self
            .state
            .lock()
            .await
            .claim(&hash, self.config.failure_ceiling);
        let outcome = match claim {
            Claim::AlreadyDone => {
                debug!("Skipping already processed URL: {}", identity);
                ItemOutcome::AlreadyDone
            }
            Claim::Exhausted => {
                warn!(
                    "Skipping URL that failed {} times: {}",
                    self.config.failure_ceiling, identity
                );
                ItemOutcome::Exhausted
            }
            Claim::InFlight => {
                debug!("URL already being processed: {}", identity);
                ItemOutcome::InFlight
            }
            Claim::Claimed => {
                let guard = ClaimGuard::new(&self.state, &hash);
                let outcome = self.process_claimed(identity, &hash).await;
                guard.release().await;
                outcome
            }
        };

        metrics::ITEMS_TOTAL
            .with_label_values(&[outcome.label()])
            .inc();
        outcome
    }

    async fn process_claimed(&self, identity: &str, hash: &IdentityHash) -> ItemOutcome {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        if self.is_stopping() {
            return ItemOutcome::Abandoned;
        }

        info!("Processing URL: {}", identity);
        let started = Instant::now();
        let attempt = AssertUnwindSafe(self.attempt_with_deadline(identity)).catch_unwind();

        let result = tokio::select! {
            result = attempt => match result {
                Ok(result) => result,
                Err(panic) => Err((Stage::Internal, panic_message(panic.as_ref()))),
            },
            _ = shutdown_rx.recv() => {
                info!("Abandoning {} due to shutdown", identity);
                return ItemOutcome::Abandoned;
            }
        };

        let outcome = match result {
            Ok(delivered) => self.complete(identity, hash, delivered).await,
            Err((stage, reason)) => self.fail(identity, stage, reason).await,
        };
        metrics::ITEM_DURATION
            .with_label_values(&[if outcome.is_success() { "success" } else { "failure" }])
            .observe(started.elapsed().as_secs_f64());
        outcome
    }

    async fn attempt_with_deadline(&self, identity: &str) -> Result<Delivered, (Stage, String)> {
        match self.config.item_timeout {
            Some(limit) => tokio::time::timeout(limit, self.attempt(identity))
                .await
                .unwrap_or_else(|_| Err((Stage::Deadline, DEADLINE_EXCEEDED.to_string()))),
            None => self.attempt(identity).await,
        }
    }

    /// Fetch, upload and verify. Touches no durable state.
    async fn attempt(&self, identity: &str) -> Result<Delivered, (Stage, String)> {
        let group = group_label(identity);
        let item_dir = self
            .config
            .working_dir
            .join(&group)
            .join(IdentityHash::of(identity).short());

        let artifact = retry_async(
            &self.config.fetch_retry,
            "fetch",
            |_| self.fetcher.fetch(identity, &item_dir),
            TransferError::is_retryable,
        )
        .await
        .map_err(|e| (Stage::Fetch, e.to_string()))?;

        if tokio::fs::symlink_metadata(&artifact.path).await.is_err() {
            return Err((
                Stage::Fetch,
                format!("Downloaded path not found: {}", artifact.path.display()),
            ));
        }
        info!("Download successful: {}", artifact.path.display());

        retry_async(
            &self.config.upload_retry,
            "upload",
            |_| self.uploader.upload(&artifact.path, &group),
            TransferError::is_retryable,
        )
        .await
        .map_err(|e| (Stage::Upload, e.to_string()))?;

        if self.config.verification_enabled {
            info!("Verifying upload for: {}", artifact.path.display());
            self.uploader
                .verify(&artifact.path, &group, &self.config.verify)
                .await
                .map_err(|e| (Stage::Verify, format!("Upload verification failed: {}", e)))?;
        } else {
            debug!("Verification disabled, accepting upload of {}", artifact.path.display());
        }

        Ok(Delivered {
            local_path: artifact.path,
            item_dir,
            group,
        })
    }

    async fn complete(
        &self,
        identity: &str,
        hash: &IdentityHash,
        delivered: Delivered,
    ) -> ItemOutcome {
        let persisted = {
            let mut state = self.state.lock().await;
            let record = CompletionRecord {
                identity: identity.to_string(),
                completed_at: Utc::now(),
                local_path: delivered.local_path.clone(),
                group: delivered.group.clone(),
            };
            let persisted = match state.completions_mut().record(hash.clone(), record) {
                Ok(_) => true,
                Err(e) => {
                    error!("Failed to persist completion of {}: {}", identity, e);
                    false
                }
            };
            if let Err(e) = state.ledger_mut().clear(hash) {
                error!("Failed to clear failure record of {}: {}", identity, e);
            }
            persisted
        };

        let destination = self.uploader.destination(&delivered.group);
        info!("Successfully processed {} into {}", identity, destination);

        if self.config.auto_delete {
            if persisted {
                delete_artifact(&delivered.local_path).await;
                // Only succeeds once the directory is empty
                let _ = tokio::fs::remove_dir(&delivered.item_dir).await;
            } else {
                warn!(
                    "Keeping {} because its completion could not be persisted",
                    delivered.local_path.display()
                );
            }
        }
        ItemOutcome::Completed
    }

    async fn fail(&self, identity: &str, stage: Stage, reason: String) -> ItemOutcome {
        metrics::ITEM_FAILURES
            .with_label_values(&[stage.as_str()])
            .inc();

        let recorded = self
            .state
            .lock()
            .await
            .ledger_mut()
            .record_failure(identity, &reason);
        match recorded {
            Ok(failures) if failures >= self.config.failure_ceiling => error!(
                failures,
                stage = %stage,
                "Giving up on {} after {} failures: {}",
                identity,
                failures,
                reason
            ),
            Ok(failures) => warn!(
                failures,
                stage = %stage,
                "Failed to process {}: {}",
                identity,
                reason
            ),
            Err(e) => error!(
                "Failed to persist failure of {} ({}): {}",
                identity, reason, e
            ),
        }
        ItemOutcome::Failed { stage, reason }
    }

    async fn publish_metrics(&self) {
        {
            let state = self.state.lock().await;
            let ceiling = self.config.failure_ceiling;
            let exhausted = state.ledger().exhausted(ceiling).len();
            metrics::RECORDS
                .with_label_values(&["completed"])
                .set(state.completions().len() as i64);
            metrics::RECORDS
                .with_label_values(&["failed"])
                .set((state.ledger().len() - exhausted) as i64);
            metrics::RECORDS
                .with_label_values(&["exhausted"])
                .set(exhausted as i64);
        }

        if let Some(path) = &self.config.metrics_textfile {
            if let Err(e) = metrics::write_textfile(path) {
                warn!("Failed to write metrics to {}: {}", path.display(), e);
            }
        }
    }
}

/// Remove a file or directory tree. Failures are logged only.
async fn delete_artifact(path: &Path) {
    let meta = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) => meta,
        Err(_) => {
            warn!("Cannot delete nonexistent path: {}", path.display());
            return;
        }
    };

    let result = if meta.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    match result {
        Ok(()) => {
            metrics::ARTIFACTS_DELETED.inc();
            info!("Deleted local copy: {}", path.display());
        }
        Err(e) => error!("Error deleting {}: {}", path.display(), e),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("internal error: {}", detail)
}
