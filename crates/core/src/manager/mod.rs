//! Bulk manager: the fetch, upload, verify and clean-up control loop.
//!
//! Each cycle first retries items in the retry ledger that are still under
//! the failure ceiling, then walks the backlog. Items are claimed under the
//! state lock before any work starts, so no identity is ever processed by
//! two workers at once.

mod config;
mod runner;
mod types;

pub use config::ManagerConfig;
pub use runner::{BulkManager, ShutdownHandle};
pub use types::{CycleReport, ItemOutcome, ManagerError, Stage};
