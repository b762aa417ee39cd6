//! Retry and backoff policy.
//!
//! Backend call sites build a `RetryPolicy` from configuration and run the
//! operation through `retry_async`, passing a predicate that decides which
//! errors are worth another attempt.

mod policy;
mod run;

pub use policy::RetryPolicy;
pub use run::retry_async;
