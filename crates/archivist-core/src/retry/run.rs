//! Async retry loop: run an operation until success or the policy says stop.

use std::future::Future;

use super::policy::{ErrorKind, RetryDecision, RetryPolicy};

/// The operation failed on its last allowed attempt (or with a non-retryable error).
#[derive(Debug)]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub last: E,
}

/// Runs `op` until it succeeds or the retry policy says to stop, sleeping the
/// fixed backoff between attempts. `op` receives the 1-based attempt number.
pub async fn run_with_retry<T, E, F, Fut, C>(
    policy: &RetryPolicy,
    classify: C,
    mut op: F,
) -> Result<T, Exhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> ErrorKind,
    E: std::fmt::Display,
{
    let mut attempt = 1u32;
    loop {
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) => match policy.decide(attempt, classify(&e)) {
                RetryDecision::NoRetry => return Err(Exhausted { attempts: attempt, last: e }),
                RetryDecision::RetryAfter(d) => {
                    tracing::warn!(attempt, error = %e, "retrying in {:?}", d);
                    tokio::time::sleep(d).await;
                    attempt += 1;
                }
            },
        }
    }
}
