//! Trust anchors ("cacerts").

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use x509_parser::pem::Pem;

use super::signer::{self, CertInfo, CertPath};

#[derive(Debug, Clone, Default)]
pub struct TrustStore {
    anchors: Vec<CertInfo>,
    fingerprints: HashSet<String>,
}

impl TrustStore {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Loads every PEM or DER certificate in `dir`. Unreadable files are
    /// logged and skipped.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut store = Self::default();
        let entries =
            std::fs::read_dir(dir).with_context(|| format!("read trust dir {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let data = std::fs::read(&path)?;
            let loaded = if data.starts_with(b"-----BEGIN") {
                store.add_pem(&data)
            } else {
                CertInfo::from_der(&data).map(|c| {
                    store.add(c);
                    1
                })
            };
            match loaded {
                Ok(n) => tracing::debug!(path = %path.display(), certs = n, "loaded trust anchors"),
                Err(e) => tracing::warn!(path = %path.display(), "skipping trust anchor: {:#}", e),
            }
        }
        Ok(store)
    }

    fn add_pem(&mut self, data: &[u8]) -> Result<usize> {
        let mut n = 0;
        for pem in Pem::iter_from_buffer(data) {
            let pem = pem.map_err(|e| anyhow::anyhow!("bad PEM: {:?}", e))?;
            if pem.label == "CERTIFICATE" {
                self.add(CertInfo::from_der(&pem.contents)?);
                n += 1;
            }
        }
        Ok(n)
    }

    /// Anchors known only by fingerprint.
    pub fn from_fingerprints<I, S>(fingerprints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            anchors: Vec::new(),
            fingerprints: fingerprints.into_iter().map(Into::into).collect(),
        }
    }

    pub fn add(&mut self, cert: CertInfo) {
        self.fingerprints.insert(cert.fingerprint.clone());
        self.anchors.push(cert);
    }

    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.fingerprints.contains(fingerprint)
    }

    /// A path is anchored when any of its certificates is an anchor, or its
    /// last certificate was issued by one.
    pub fn anchors_path(&self, path: &CertPath) -> bool {
        if path.certs.iter().any(|c| self.contains(&c.fingerprint)) {
            return true;
        }
        let Some(last) = path.root() else {
            return false;
        };
        self.anchors
            .iter()
            .filter(|a| a.subject == last.issuer)
            .any(|a| signer::signed_by(&last.der, &a.der))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cert(fp: &str, issuer: &str) -> CertInfo {
        CertInfo {
            subject: format!("CN={}", fp),
            issuer: issuer.to_string(),
            serial: "01".to_string(),
            fingerprint: fp.to_string(),
            not_before: 0,
            not_after: i64::MAX,
            der: Vec::new(),
        }
    }

    #[test]
    fn any_certificate_in_path_anchors_it() {
        let store = TrustStore::from_fingerprints(["root"]);
        let path = CertPath {
            certs: vec![cert("leaf", "CN=root"), cert("root", "CN=root")],
            chain_verified: true,
        };
        assert!(store.anchors_path(&path));
        let other = CertPath {
            certs: vec![cert("self", "CN=self")],
            chain_verified: true,
        };
        assert!(!store.anchors_path(&other));
    }

    #[test]
    fn unreadable_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("junk.der"), b"junk").unwrap();
        let store = TrustStore::load_dir(dir.path()).unwrap();
        assert!(store.is_empty());
    }
}
