//! Persisted record types.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Proof that an item was uploaded and verified. Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRecord {
    /// Source reference.
    pub identity: String,
    /// When verification succeeded.
    pub completed_at: DateTime<Utc>,
    /// Local artifact path at the time of completion.
    pub local_path: PathBuf,
    /// Remote group label the artifact was uploaded under.
    pub group: String,
}

/// Failure history of an item that has not completed yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Source reference. Empty only in hand-edited or legacy files.
    #[serde(default)]
    pub identity: String,
    pub first_failure: DateTime<Utc>,
    pub last_failure: DateTime<Utc>,
    /// Cumulative recorded failures.
    pub failures: u32,
    pub last_error: String,
}

impl FailureRecord {
    pub fn new(identity: &str, error: &str) -> Self {
        let now = Utc::now();
        Self {
            identity: identity.to_string(),
            first_failure: now,
            last_failure: now,
            failures: 1,
            last_error: error.to_string(),
        }
    }

    /// Whether this record has reached the failure ceiling.
    pub fn is_exhausted(&self, ceiling: u32) -> bool {
        self.failures >= ceiling
    }
}
