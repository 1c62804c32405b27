//! Externally configured trust policy.
//!
//! ```toml
//! [[grant]]
//! origin = "https://apps.example.com/"
//! permissions = [
//!     { kind = "socket_connect", host = "*.example.com" },
//!     { kind = "file_read", path = "/opt/shared/-" },
//! ]
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use url::Url;

use super::{Permission, PermissionSet};

/// Replaces the full-trust grant for the origins it covers.
pub trait TrustPolicy: Send + Sync {
    /// Permissions for code from `origin`, or `None` when the policy is
    /// silent about it.
    fn permissions_for(&self, origin: &Url) -> Option<PermissionSet>;
}

#[derive(Debug, Clone, Deserialize)]
struct Grant {
    origin: String,
    #[serde(default)]
    permissions: Vec<Permission>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlTrustPolicy {
    #[serde(default, rename = "grant")]
    grants: Vec<Grant>,
}

impl TomlTrustPolicy {
    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read trust policy {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parse trust policy {}", path.display()))
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

impl TrustPolicy for TomlTrustPolicy {
    /// Union of every grant whose origin is a prefix of `origin`.
    fn permissions_for(&self, origin: &Url) -> Option<PermissionSet> {
        let origin = origin.as_str();
        let mut matched = false;
        let mut set = PermissionSet::new();
        for grant in self.grants.iter().filter(|g| origin.starts_with(&g.origin)) {
            matched = true;
            set.extend(grant.permissions.iter().cloned());
        }
        matched.then_some(set)
    }
}
