//! Types for the bulk manager.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::state::StoreError;

/// Errors that stop the manager from running.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// Health gate failed and the override flag is not set.
    #[error("health checks failed: {}", reasons.join("; "))]
    HealthGateRefused { reasons: Vec<String> },

    /// `run_forever` called while a loop is already active.
    #[error("manager is already running")]
    AlreadyRunning,

    /// State store error.
    #[error("state store error: {0}")]
    Store(#[from] StoreError),
}

/// Where an item attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Upload,
    Verify,
    Deadline,
    /// Unexpected fault inside the item boundary (e.g. a panic).
    Internal,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Upload => "upload",
            Self::Verify => "verify",
            Self::Deadline => "deadline",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of considering one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Uploaded, verified, recorded.
    Completed,
    /// A completion record already exists; no backend call was made.
    AlreadyDone,
    /// The failure ceiling was reached earlier; no backend call was made.
    Exhausted,
    /// Another worker holds the claim for this identity.
    InFlight,
    /// The attempt failed and was counted in the retry ledger.
    Failed { stage: Stage, reason: String },
    /// Shutdown interrupted the attempt; nothing was recorded.
    Abandoned,
}

impl ItemOutcome {
    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::AlreadyDone => "already_done",
            Self::Exhausted => "exhausted",
            Self::InFlight => "in_flight",
            Self::Failed { .. } => "failed",
            Self::Abandoned => "abandoned",
        }
    }

    /// Completed or already done.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed | Self::AlreadyDone)
    }
}

/// Tally of one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Ledger entries retried in the failure sweep.
    pub retried: usize,
    /// Identities read from the backlog.
    pub backlog: usize,
    pub completed: usize,
    pub already_done: usize,
    pub exhausted: usize,
    pub in_flight: usize,
    pub failed: usize,
    pub abandoned: usize,
    #[serde(skip)]
    pub duration: Duration,
}

impl CycleReport {
    pub fn record(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Completed => self.completed += 1,
            ItemOutcome::AlreadyDone => self.already_done += 1,
            ItemOutcome::Exhausted => self.exhausted += 1,
            ItemOutcome::InFlight => self.in_flight += 1,
            ItemOutcome::Failed { .. } => self.failed += 1,
            ItemOutcome::Abandoned => self.abandoned += 1,
        }
    }

    /// Items that reached a backend.
    pub fn attempted(&self) -> usize {
        self.completed + self.failed + self.abandoned
    }
}
