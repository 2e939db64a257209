//! Retry loop: run an async attempt until success, policy says stop, or the run is stopped.

use std::future::Future;

use super::classify;
use super::error::FetchError;
use super::policy::{ErrorKind, RetryDecision, RetryPolicy};
use crate::control::StopSignal;

/// How a retried operation ended.
#[derive(Debug)]
pub enum RetryOutcome<T> {
    Done(T),
    /// Gave up: the last error, its kind, and how many attempts were made.
    Failed {
        error: FetchError,
        kind: ErrorKind,
        attempts: u32,
    },
    /// A stop was requested while an attempt or backoff was pending.
    Interrupted,
}

/// Runs `attempt_fn` until it succeeds or the retry policy says to stop.
/// Both the attempt and the backoff sleep are abandoned as soon as `stop` fires.
pub async fn fetch_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    stop: &StopSignal,
    mut attempt_fn: F,
) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempt = 1u32;
    loop {
        if stop.is_stopped() {
            return RetryOutcome::Interrupted;
        }
        let result = tokio::select! {
            r = attempt_fn(attempt) => r,
            _ = stop.stopped() => return RetryOutcome::Interrupted,
        };
        match result {
            Ok(v) => return RetryOutcome::Done(v),
            Err(error) => {
                let kind = classify::classify(&error);
                match policy.decide(attempt, kind) {
                    RetryDecision::NoRetry => {
                        return RetryOutcome::Failed {
                            error,
                            kind,
                            attempts: attempt,
                        }
                    }
                    RetryDecision::RetryAfter(d) => {
                        tracing::debug!(attempt, ?kind, delay_ms = d.as_millis() as u64, "retrying: {}", error);
                        tokio::select! {
                            _ = tokio::time::sleep(d) => {}
                            _ = stop.stopped() => return RetryOutcome::Interrupted,
                        }
                        attempt += 1;
                    }
                }
            }
        }
    }
}
