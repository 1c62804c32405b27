//! Transfer error type used for retry classification.

use thiserror::Error;

/// Error from a single HEAD/GET exchange or the cache write that follows it.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Curl reported an error (timeout, connection, etc.).
    #[error("{0}")]
    Curl(#[from] curl::Error),
    /// Response had a non-2xx status.
    #[error("HTTP {0}")]
    Http(u32),
    /// Server redirected while the global redirect policy forbids following.
    #[error("{from} is being redirected ({status}) to {to}; redirects are disabled")]
    RedirectDisallowed { from: String, to: String, status: u32 },
    /// Body was shorter than the advertised `Content-Length`.
    #[error("partial transfer: expected {expected} bytes, got {received}")]
    PartialTransfer { expected: u64, received: u64 },
    /// Server-reported version does not satisfy the requested range.
    #[error("server sent version {got}, requested {requested}")]
    VersionMismatch { requested: String, got: String },
    /// Writing the cache slot failed. Not retried.
    #[error("storage: {0}")]
    Storage(#[source] std::io::Error),
    /// Gzip or pack200 decoding failed. Not retried.
    #[error("decode: {0}")]
    Decode(String),
}
