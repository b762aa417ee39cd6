//! Core of `ferry`: a bulk fetch, upload, verify and clean-up manager with
//! durable per-item state and a bounded retry ledger.

pub mod backlog;
pub mod config;
pub mod health;
pub mod identity;
pub mod manager;
pub mod metrics;
pub mod retry;
pub mod state;
pub mod testing;
pub mod transfer;

pub use backlog::{load_backlog, parse_backlog, BacklogError};
pub use config::{
    load_config, load_config_from_str, validate_config, write_default_config, Config, ConfigError,
    RemoteBackend,
};
pub use health::{HealthGate, HealthReport};
pub use identity::{group_label, IdentityHash, FALLBACK_GROUP};
pub use manager::{
    BulkManager, CycleReport, ItemOutcome, ManagerConfig, ManagerError, ShutdownHandle, Stage,
};
pub use retry::{retry_async, RetryPolicy};
pub use state::{
    CompletionLog, CompletionRecord, FailureRecord, RetryLedger, StateBook, StoreError,
};
pub use transfer::{
    ChecksumType, FetchedArtifact, Fetcher, FsRemote, HttpFetcher, RcloneUploader, TransferError,
    Uploader, VerifyOptions,
};
