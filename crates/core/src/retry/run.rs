//! Retry loop: run an async operation until success or the policy says stop.

use std::future::Future;

use tracing::{error, warn};

use super::policy::RetryPolicy;

/// Runs `operation` until it succeeds, returns an error `is_retryable` rejects,
/// or the policy's attempts are used up. The last error is returned.
pub async fn retry_async<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    op_name: &str,
    mut operation: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 1u32;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retryable(&err) {
                    return Err(err);
                }
                if !policy.should_retry(attempt) {
                    error!(
                        op = op_name,
                        attempts = attempt,
                        error = %err,
                        "All retries failed"
                    );
                    return Err(err);
                }
                let delay = policy.delay_for(attempt);
                warn!(
                    op = op_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Attempt failed, retrying"
                );
                crate::metrics::RETRY_ATTEMPTS
                    .with_label_values(&[op_name])
                    .inc();
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
