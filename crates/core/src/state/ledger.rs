use std::path::PathBuf;

use chrono::Utc;
use tracing::{debug, warn};

use super::json_store::{JsonStore, RecordMap, StoreError};
use super::records::FailureRecord;
use crate::identity::IdentityHash;

/// Durable failure counts for items that have not completed.
///
/// Every mutation is persisted before returning. The in-memory view is
/// updated first, so a failed save still leaves this process consistent
/// with what it observed.
pub struct RetryLedger {
    store: JsonStore<FailureRecord>,
    records: RecordMap<FailureRecord>,
}

impl RetryLedger {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = JsonStore::new(path);
        let records = store.load()?;
        debug!(
            "Loaded {} failure records from {}",
            records.len(),
            store.path().display()
        );
        Ok(Self { store, records })
    }

    /// Count one failure against `identity`. Returns the new total.
    pub fn record_failure(&mut self, identity: &str, error: &str) -> Result<u32, StoreError> {
        let hash = IdentityHash::of(identity);
        let failures = match self.records.get_mut(&hash) {
            Some(record) => {
                record.failures = record.failures.saturating_add(1);
                record.last_failure = Utc::now();
                record.last_error = error.to_string();
                if record.identity.is_empty() {
                    record.identity = identity.trim().to_string();
                }
                record.failures
            }
            None => {
                self.records
                    .insert(hash, FailureRecord::new(identity.trim(), error));
                1
            }
        };
        self.store.save(&self.records)?;
        Ok(failures)
    }

    /// Drop the failure record for an item, e.g. after it completed.
    pub fn clear(&mut self, hash: &IdentityHash) -> Result<bool, StoreError> {
        if self.records.remove(hash).is_none() {
            return Ok(false);
        }
        self.store.save(&self.records)?;
        Ok(true)
    }

    /// Operator reset: forget the history so the item gets a fresh budget.
    pub fn reset(&mut self, hash: &IdentityHash) -> Result<bool, StoreError> {
        self.clear(hash)
    }

    pub fn get(&self, hash: &IdentityHash) -> Option<&FailureRecord> {
        self.records.get(hash)
    }

    pub fn is_exhausted(&self, hash: &IdentityHash, ceiling: u32) -> bool {
        self.records
            .get(hash)
            .map(|r| r.is_exhausted(ceiling))
            .unwrap_or(false)
    }

    /// Failures still under the ceiling, oldest first.
    pub fn pending(&self, ceiling: u32) -> Vec<(IdentityHash, FailureRecord)> {
        let mut pending: Vec<_> = self
            .records
            .iter()
            .filter(|(_, r)| !r.is_exhausted(ceiling) && !r.identity.is_empty())
            .map(|(h, r)| (h.clone(), r.clone()))
            .collect();
        pending.sort_by_key(|(_, r)| r.first_failure);
        pending
    }

    /// Failures that reached the ceiling and are no longer retried.
    pub fn exhausted(&self, ceiling: u32) -> Vec<(IdentityHash, FailureRecord)> {
        self.records
            .iter()
            .filter(|(_, r)| r.is_exhausted(ceiling))
            .map(|(h, r)| (h.clone(), r.clone()))
            .collect()
    }

    /// Remove records that carry no identity and so can never be retried.
    pub fn prune_unidentified(&mut self) -> Result<usize, StoreError> {
        let before = self.records.len();
        self.records.retain(|hash, record| {
            if record.identity.is_empty() {
                warn!("Removing failure record {} with no identity", hash);
                false
            } else {
                true
            }
        });
        let removed = before - self.records.len();
        if removed > 0 {
            self.store.save(&self.records)?;
        }
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IdentityHash, &FailureRecord)> {
        self.records.iter()
    }
}
