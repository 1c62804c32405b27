//! Security levels, per-origin domains and the launch trust decision.

mod elevate;
mod external;
mod permission;
mod policy;
mod prompt;

pub use elevate::{check, current, with_capability, AccessDenied};
pub use external::{TomlTrustPolicy, TrustPolicy};
pub use permission::{Permission, PermissionSet};
pub use policy::{CodeSource, SecurityPolicyBuilder};
pub use prompt::{AcceptAll, DenyAll, PromptKind, TrustPrompter};

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use url::Url;

/// Declared `<security>` level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityType {
    Sandbox,
    /// `j2ee-application-client-permissions`.
    J2ee,
    /// `all-permissions`.
    All,
}

impl SecurityType {
    fn rank(self) -> u8 {
        match self {
            Self::Sandbox => 0,
            Self::J2ee => 1,
            Self::All => 2,
        }
    }
}

/// Permissions granted to one code source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityDomain {
    pub security_type: SecurityType,
    /// What the descriptor asked for; `None` when it declared nothing.
    pub requested: Option<SecurityType>,
    pub origin_host: Option<String>,
    pub code_source: Url,
    /// Effective grant, including `resource_permissions`.
    pub permissions: Arc<PermissionSet>,
    /// Access to the code source itself (its host and local copy).
    pub resource_permissions: Vec<Permission>,
}

/// Code source → domain, memoized for one loader's lifetime. A `None`
/// value records a failed resolution so it is not retried.
#[derive(Debug, Default)]
pub struct DomainMap {
    map: DashMap<Url, Option<Arc<SecurityDomain>>>,
}

impl DomainMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` when never resolved, `Some(None)` for a cached failure.
    pub fn get(&self, code_source: &Url) -> Option<Option<Arc<SecurityDomain>>> {
        self.map.get(code_source).map(|d| d.value().clone())
    }

    /// Inserts `domain` unless an entry exists. An existing domain is only
    /// replaced by a higher security level; it never drops from ALL to
    /// SANDBOX. Returns the domain now stored.
    pub fn insert(&self, domain: SecurityDomain) -> Arc<SecurityDomain> {
        let domain = Arc::new(domain);
        match self.map.entry(domain.code_source.clone()) {
            Entry::Vacant(v) => {
                v.insert(Some(Arc::clone(&domain)));
                domain
            }
            Entry::Occupied(mut o) => {
                let kept = match o.get() {
                    Some(existing) if existing.security_type.rank() >= domain.security_type.rank() => {
                        Some(Arc::clone(existing))
                    }
                    _ => None,
                };
                match kept {
                    Some(existing) => {
                        if existing.security_type != domain.security_type {
                            tracing::warn!(
                                code_source = %domain.code_source,
                                kept = ?existing.security_type,
                                refused = ?domain.security_type,
                                "not lowering security domain"
                            );
                        }
                        existing
                    }
                    None => {
                        o.insert(Some(Arc::clone(&domain)));
                        domain
                    }
                }
            }
        }
    }

    /// Records that `code_source` could not be resolved. An existing domain wins.
    pub fn insert_negative(&self, code_source: &Url) {
        self.map.entry(code_source.clone()).or_insert(None);
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
