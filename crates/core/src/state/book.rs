use std::collections::HashSet;
use std::path::Path;

use super::completions::CompletionLog;
use super::json_store::StoreError;
use super::ledger::RetryLedger;
use crate::identity::IdentityHash;

/// Result of trying to claim an item for processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// The caller now owns the item until it calls [`StateBook::release`].
    Claimed,
    AlreadyDone,
    Exhausted,
    InFlight,
}

/// All mutable per-item state behind one lock: both durable stores and the
/// set of items currently being processed.
pub struct StateBook {
    completions: CompletionLog,
    ledger: RetryLedger,
    in_flight: HashSet<IdentityHash>,
}

impl StateBook {
    pub fn open(completions_path: &Path, failures_path: &Path) -> Result<Self, StoreError> {
        Ok(Self {
            completions: CompletionLog::open(completions_path)?,
            ledger: RetryLedger::open(failures_path)?,
            in_flight: HashSet::new(),
        })
    }

    /// Check-and-claim in one step.
    pub fn claim(&mut self, hash: &IdentityHash, ceiling: u32) -> Claim {
        if self.completions.contains(hash) {
            return Claim::AlreadyDone;
        }
        if self.ledger.is_exhausted(hash, ceiling) {
            return Claim::Exhausted;
        }
        if !self.in_flight.insert(hash.clone()) {
            return Claim::InFlight;
        }
        Claim::Claimed
    }

    pub fn release(&mut self, hash: &IdentityHash) {
        self.in_flight.remove(hash);
    }

    pub fn is_in_flight(&self, hash: &IdentityHash) -> bool {
        self.in_flight.contains(hash)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn completions(&self) -> &CompletionLog {
        &self.completions
    }

    pub fn completions_mut(&mut self) -> &mut CompletionLog {
        &mut self.completions
    }

    pub fn ledger(&self) -> &RetryLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut RetryLedger {
        &mut self.ledger
    }
}
