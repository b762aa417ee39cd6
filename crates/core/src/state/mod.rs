//! Durable per-item state.
//!
//! Two independent JSON documents live in the state directory:
//! - completions: items uploaded, verified and (optionally) cleaned up
//! - failures: the retry ledger, capped at the configured failure ceiling
//!
//! Both are written through [`JsonStore`], which replaces the target file
//! atomically so a crash mid-write leaves the previous document intact.

mod book;
mod completions;
mod json_store;
mod ledger;
mod records;

pub use book::{Claim, StateBook};
pub use completions::CompletionLog;
pub use json_store::{atomic_write, JsonStore, RecordMap, StoreError};
pub use ledger::RetryLedger;
pub use records::{CompletionRecord, FailureRecord};
