//! Retry and backoff policy for resource transfers.
//!
//! Classifies transfer failures (timeouts, throttling, connection failures,
//! redirects, storage) and decides whether and when to try again, so the
//! negotiation and download phases share one policy.

mod classify;
mod error;
mod policy;
mod run;

pub use classify::{classify, classify_curl_error, classify_http_status};
pub use error::FetchError;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::run_with_retry;
