//! Retry and backoff policy for tile fetches.
//!
//! This module encapsulates error classification (timeouts, throttling,
//! connection failures, auth rejections) and exponential backoff decisions so
//! the engine and every tile source share one policy.

mod classify;
mod error;
mod policy;
mod run;

pub use classify::{classify, classify_curl_error, classify_http_status};
pub use error::FetchError;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::{fetch_with_retry, RetryOutcome};
