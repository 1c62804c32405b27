//! User trust decisions.

use serde::Serialize;

use crate::descriptor::JnlpDescriptor;
use crate::verify::VerifierResult;

/// Which trust dialog the user is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    /// Signed, but the chain does not end at a trusted root.
    Unverified,
    /// Signed by a trusted chain.
    Verified,
    /// Trusted chain with problems (expired, not yet valid, ...).
    SigningError,
}

/// Synchronous yes/no oracle. A `false` answer aborts the launch.
pub trait TrustPrompter: Send + Sync {
    fn confirm(&self, kind: PromptKind, desc: &JnlpDescriptor, result: &VerifierResult) -> bool;

    /// Some jars are signed and some are not.
    fn confirm_mixed_signing(&self, desc: &JnlpDescriptor) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl TrustPrompter for AcceptAll {
    fn confirm(&self, kind: PromptKind, _desc: &JnlpDescriptor, _result: &VerifierResult) -> bool {
        tracing::info!(?kind, "trust prompt accepted");
        true
    }

    fn confirm_mixed_signing(&self, _desc: &JnlpDescriptor) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

impl TrustPrompter for DenyAll {
    fn confirm(&self, kind: PromptKind, _desc: &JnlpDescriptor, _result: &VerifierResult) -> bool {
        tracing::info!(?kind, "trust prompt denied");
        false
    }

    fn confirm_mixed_signing(&self, _desc: &JnlpDescriptor) -> bool {
        false
    }
}
