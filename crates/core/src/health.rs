//! Pre-flight readiness checks.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use crate::metrics::HEALTH_CHECKS;
use crate::transfer::Uploader;

/// Outcome of a health gate evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub ok: bool,
    /// Every failing check, in evaluation order.
    pub reasons: Vec<String>,
}

/// Decides whether the manager may start: the upload target must be ready
/// and the backlog file readable.
#[derive(Clone)]
pub struct HealthGate {
    uploader: Arc<dyn Uploader>,
    backlog_path: PathBuf,
}

impl HealthGate {
    pub fn new(uploader: Arc<dyn Uploader>, backlog_path: impl Into<PathBuf>) -> Self {
        Self {
            uploader,
            backlog_path: backlog_path.into(),
        }
    }

    /// Run all checks; does not stop at the first failure.
    pub async fn check(&self) -> HealthReport {
        let mut reasons = Vec::new();

        if let Err(e) = self.uploader.check_ready().await {
            reasons.push(format!(
                "Upload backend '{}' is not ready: {}",
                self.uploader.name(),
                e
            ));
        }

        match tokio::fs::metadata(&self.backlog_path).await {
            Ok(meta) if meta.is_file() => {
                if let Err(e) = tokio::fs::File::open(&self.backlog_path).await {
                    reasons.push(format!(
                        "Backlog file {} is not readable: {}",
                        self.backlog_path.display(),
                        e
                    ));
                }
            }
            Ok(_) => reasons.push(format!(
                "Backlog path {} is not a regular file",
                self.backlog_path.display()
            )),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => reasons.push(format!(
                "Backlog file not found: {}",
                self.backlog_path.display()
            )),
            Err(e) => reasons.push(format!(
                "Backlog file {} is not accessible: {}",
                self.backlog_path.display(),
                e
            )),
        }

        let ok = reasons.is_empty();
        if ok {
            info!("Health checks passed");
            HEALTH_CHECKS.with_label_values(&["ok"]).inc();
        } else {
            for reason in &reasons {
                error!("Health check failed: {}", reason);
            }
            HEALTH_CHECKS.with_label_values(&["failed"]).inc();
        }
        HealthReport { ok, reasons }
    }
}
