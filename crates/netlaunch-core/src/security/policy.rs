//! From signing outcome and declared security to a launch decision and
//! per-code-source domains.

use std::path::PathBuf;
use std::sync::Arc;

use url::Url;

use super::{
    Permission, PermissionSet, PromptKind, SecurityDomain, SecurityType, TrustPolicy,
    TrustPrompter,
};
use crate::descriptor::JnlpDescriptor;
use crate::error::LaunchError;
use crate::verify::VerifierResult;

/// Where a piece of code came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeSource {
    pub location: Url,
    /// Cached copy, if the code was downloaded.
    pub local_file: Option<PathBuf>,
}

impl CodeSource {
    pub fn new(location: Url, local_file: Option<PathBuf>) -> Self {
        Self {
            location,
            local_file,
        }
    }
}

pub struct SecurityPolicyBuilder {
    prompter: Arc<dyn TrustPrompter>,
    policy: Option<Arc<dyn TrustPolicy>>,
    prompt_for_verified: bool,
}

impl SecurityPolicyBuilder {
    pub fn new(prompter: Arc<dyn TrustPrompter>) -> Self {
        Self {
            prompter,
            policy: None,
            prompt_for_verified: false,
        }
    }

    pub fn with_policy(mut self, policy: Option<Arc<dyn TrustPolicy>>) -> Self {
        self.policy = policy;
        self
    }

    pub fn prompt_for_verified(mut self, prompt: bool) -> Self {
        self.prompt_for_verified = prompt;
        self
    }

    /// Security level granted to the signed code of `desc`.
    ///
    /// | signed | declared | outcome                  |
    /// |--------|----------|--------------------------|
    /// | yes    | elevated | declared level, after any prompt |
    /// | yes    | none     | sandbox                  |
    /// | no     | elevated | [`LaunchError::UnsignedJarWithSecurity`] |
    /// | no     | none     | sandbox                  |
    ///
    /// A mixed set asks the user first; unsigned jars of an accepted mixed
    /// set still run sandboxed.
    pub fn decide(
        &self,
        desc: &JnlpDescriptor,
        result: &VerifierResult,
    ) -> Result<SecurityType, LaunchError> {
        let declared = match desc.security {
            Some(t) if desc.requests_elevated() => t,
            _ => return Ok(SecurityType::Sandbox),
        };

        if !result.any_jars_signed {
            return match result.unsigned_jars.first() {
                Some(location) => Err(LaunchError::UnsignedJarWithSecurity {
                    location: location.clone(),
                }),
                None => {
                    tracing::warn!("elevated security declared but no jars to grant it to");
                    Ok(SecurityType::Sandbox)
                }
            };
        }
        if result.is_mixed() {
            if !self.prompter.confirm_mixed_signing(desc) {
                return Err(LaunchError::MixedSigningDenied);
            }
            tracing::info!(unsigned = result.unsigned_jars.len(), "mixed signing accepted");
        }

        let kind = if !result.root_in_cacerts {
            PromptKind::Unverified
        } else if !result.no_signing_issues {
            PromptKind::SigningError
        } else {
            PromptKind::Verified
        };
        let ask = kind != PromptKind::Verified || self.prompt_for_verified;
        if ask && !self.prompter.confirm(kind, desc, result) {
            return Err(LaunchError::UserDenied(kind));
        }
        tracing::info!(level = ?declared, ?kind, "security granted");
        Ok(declared)
    }

    /// Domain for one code source at `security_type`. ALL is replaced by
    /// the external policy when it covers the source.
    pub fn build_domain(
        &self,
        security_type: SecurityType,
        requested: Option<SecurityType>,
        origin_host: Option<&str>,
        source: &CodeSource,
    ) -> SecurityDomain {
        let mut permissions = match security_type {
            SecurityType::Sandbox => PermissionSet::sandbox(origin_host),
            SecurityType::J2ee => PermissionSet::j2ee(origin_host),
            SecurityType::All => {
                match self
                    .policy
                    .as_ref()
                    .and_then(|p| p.permissions_for(&source.location))
                {
                    Some(granted) => {
                        let mut set = PermissionSet::sandbox(origin_host);
                        set.extend(granted.iter().cloned());
                        set
                    }
                    None => PermissionSet::all(),
                }
            }
        };

        let mut resource_permissions = Vec::new();
        if let Some(host) = source.location.host_str() {
            resource_permissions.push(Permission::connect(host));
        }
        if let Some(path) = source.local_file.as_ref().and_then(|p| p.to_str()) {
            resource_permissions.push(Permission::read_file(path));
        }
        permissions.extend(resource_permissions.iter().cloned());

        SecurityDomain {
            security_type,
            requested,
            origin_host: origin_host.map(str::to_string),
            code_source: source.location.clone(),
            permissions: Arc::new(permissions),
            resource_permissions,
        }
    }
}
