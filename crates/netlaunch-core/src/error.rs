//! Public error types for launching and class/resource resolution.

use thiserror::Error;
use url::Url;

use crate::security::PromptKind;

/// Errors that abort application startup.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("jar {location} is unsigned but the descriptor requests elevated permissions")]
    UnsignedJarWithSecurity { location: Url },

    #[error("main class {0} was not found in any available or extension resource")]
    MainClassNotFound(String),

    #[error("no main class is declared and the main jar manifest names none")]
    MainClassUnknown,

    #[error("signed descriptor does not match the launching descriptor: {0}")]
    SignedJnlpMismatch(String),

    #[error("launch denied by user: the application mixes signed and unsigned code")]
    MixedSigningDenied,

    #[error("launch denied by user ({0:?})")]
    UserDenied(PromptKind),

    #[error("extension {location} could not be resolved: {reason}")]
    Extension { location: Url, reason: String },

    #[error("resource tracking failed: {0}")]
    Tracker(String),
}

/// Not-found outcomes surfaced to callers of the loader. Never fatal to a launch.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("class not found: {0}")]
    ClassNotFound(String),

    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("failed to read {name} from {location}: {source}")]
    Read {
        name: String,
        location: String,
        #[source]
        source: std::io::Error,
    },
}
