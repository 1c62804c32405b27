//! Jar signature verification and aggregation over a jar set.

mod digest;
mod jar_check;
mod pkcs7;
mod signer;
mod trust;

pub use digest::DigestAlg;
pub use jar_check::{check_jar, is_signable, Coverage, JarReport};
pub use signer::{fingerprint, signed_by, CertInfo, CertPath, Pkcs7Extractor, SignerExtractor};
pub use trust::TrustStore;

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use url::Url;

use crate::descriptor::JarDesc;
use crate::jar::JarFile;
use crate::tracker::ResourceTracker;

/// Certificates expiring within this window are reported.
const EXPIRY_WARNING_SECS: i64 = 182 * 24 * 60 * 60;

/// Something wrong with an otherwise usable signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigningIssue {
    Expired { subject: String },
    NotYetValid { subject: String },
    ExpiringSoon { subject: String },
    /// Chain links do not verify, or the chain ends short of a root.
    BrokenChain { subject: String },
    /// A jar failed verification outright (tampered or malformed).
    JarError { location: Url, reason: String },
}

impl fmt::Display for SigningIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expired { subject } => write!(f, "certificate {} has expired", subject),
            Self::NotYetValid { subject } => write!(f, "certificate {} is not yet valid", subject),
            Self::ExpiringSoon { subject } => {
                write!(f, "certificate {} expires within six months", subject)
            }
            Self::BrokenChain { subject } => {
                write!(f, "certificate chain of {} could not be verified", subject)
            }
            Self::JarError { location, reason } => write!(f, "{}: {}", location, reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JarStatus {
    Unsigned,
    /// Some signable entries lack a signature.
    Partial,
    Signed,
    Error(String),
}

#[derive(Debug, Clone)]
pub struct JarVerification {
    pub location: Url,
    pub status: JarStatus,
    /// Keys of signers covering every signable entry.
    pub signers: Vec<String>,
    pub signable: usize,
}

impl JarVerification {
    /// Signed with at least one entry actually covered.
    pub fn has_signed_content(&self) -> bool {
        self.status == JarStatus::Signed && self.signable > 0
    }
}

/// Aggregate signing state of every jar added so far.
#[derive(Debug, Clone, Default)]
pub struct VerifierResult {
    pub all_jars_signed: bool,
    pub any_jars_signed: bool,
    pub fully_signed_by_single_cert: bool,
    pub root_in_cacerts: bool,
    pub no_signing_issues: bool,
    /// The common signer, when there is one.
    pub signer: Option<CertPath>,
    pub issues: Vec<SigningIssue>,
    /// Jars not fully signed, in the order they were added.
    pub unsigned_jars: Vec<Url>,
}

impl VerifierResult {
    /// Every jar is signed and at least one has signed content.
    pub fn is_signed(&self) -> bool {
        self.all_jars_signed && self.any_jars_signed
    }

    /// Some jars signed, some not.
    pub fn is_mixed(&self) -> bool {
        self.any_jars_signed && !self.all_jars_signed
    }
}

/// Verifies jars one at a time and keeps per-jar results for aggregation.
pub struct SignatureVerifier {
    extractor: Arc<dyn SignerExtractor>,
    trust: Arc<TrustStore>,
    jars: Vec<JarVerification>,
    by_location: HashMap<Url, usize>,
    paths: HashMap<String, CertPath>,
}

impl SignatureVerifier {
    pub fn new(extractor: Arc<dyn SignerExtractor>, trust: Arc<TrustStore>) -> Self {
        Self {
            extractor,
            trust,
            jars: Vec::new(),
            by_location: HashMap::new(),
            paths: HashMap::new(),
        }
    }

    pub fn trust(&self) -> &Arc<TrustStore> {
        &self.trust
    }

    /// Verifies every listed jar the tracker can produce a file for. Jars
    /// that failed to download are skipped; the caller drops them.
    pub fn add(&mut self, tracker: &ResourceTracker, jars: &[JarDesc]) {
        for desc in jars {
            if self.by_location.contains_key(&desc.location) {
                continue;
            }
            match tracker.cache_file(&desc.location) {
                Ok(Some(path)) => {
                    self.add_file(&desc.location, &path);
                }
                Ok(None) => {
                    tracing::warn!(jar = %desc.location, "not verified: no local copy")
                }
                Err(e) => tracing::warn!(jar = %desc.location, "not verified: {:#}", e),
            }
        }
    }

    /// Verifies one local jar recorded under `location`.
    pub fn add_file(&mut self, location: &Url, path: &Path) -> &JarVerification {
        let report = JarFile::open(path).and_then(|jar| check_jar(&jar, self.extractor.as_ref()));
        let verification = match report {
            Ok(report) => {
                let signers = report
                    .full_signers
                    .iter()
                    .map(|p| p.key().to_string())
                    .collect();
                for p in report.full_signers {
                    self.paths.entry(p.key().to_string()).or_insert(p);
                }
                let status = match report.coverage {
                    Coverage::Unsigned => JarStatus::Unsigned,
                    Coverage::Partial => JarStatus::Partial,
                    Coverage::Signed => JarStatus::Signed,
                };
                JarVerification {
                    location: location.clone(),
                    status,
                    signers,
                    signable: report.signable_entries,
                }
            }
            Err(e) => {
                tracing::warn!(jar = %location, "signature verification failed: {:#}", e);
                JarVerification {
                    location: location.clone(),
                    status: JarStatus::Error(format!("{:#}", e)),
                    signers: Vec::new(),
                    signable: 0,
                }
            }
        };
        tracing::debug!(jar = %location, status = ?verification.status, "verified");
        let index = match self.by_location.get(location) {
            Some(&i) => {
                self.jars[i] = verification;
                i
            }
            None => {
                self.jars.push(verification);
                self.by_location.insert(location.clone(), self.jars.len() - 1);
                self.jars.len() - 1
            }
        };
        &self.jars[index]
    }

    pub fn jar(&self, location: &Url) -> Option<&JarVerification> {
        self.by_location.get(location).map(|&i| &self.jars[i])
    }

    pub fn jars(&self) -> &[JarVerification] {
        &self.jars
    }

    pub fn is_empty(&self) -> bool {
        self.jars.is_empty()
    }

    /// Signer keys of every jar with signed content added so far.
    pub fn signer_keys(&self) -> BTreeSet<String> {
        self.jars
            .iter()
            .filter(|j| j.has_signed_content())
            .flat_map(|j| j.signers.iter().cloned())
            .collect()
    }

    pub fn result(&self) -> VerifierResult {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        self.result_at(now)
    }

    /// Aggregates as of `now` (unix seconds).
    pub fn result_at(&self, now: i64) -> VerifierResult {
        let mut result = VerifierResult {
            all_jars_signed: self.jars.iter().all(|j| j.status == JarStatus::Signed),
            any_jars_signed: self
                .jars
                .iter()
                .any(|j| j.has_signed_content() || j.status == JarStatus::Partial),
            ..Default::default()
        };
        for j in &self.jars {
            if j.status != JarStatus::Signed {
                result.unsigned_jars.push(j.location.clone());
            }
            if let JarStatus::Error(reason) = &j.status {
                result.issues.push(SigningIssue::JarError {
                    location: j.location.clone(),
                    reason: reason.clone(),
                });
            }
        }

        let mut common: Option<BTreeSet<&str>> = None;
        for j in self.jars.iter().filter(|j| j.has_signed_content()) {
            let keys: BTreeSet<&str> = j.signers.iter().map(String::as_str).collect();
            common = Some(match common {
                None => keys,
                Some(c) => c.intersection(&keys).copied().collect(),
            });
        }
        let candidates: Vec<&CertPath> = common
            .unwrap_or_default()
            .into_iter()
            .filter_map(|k| self.paths.get(k))
            .collect();
        let signer = candidates
            .iter()
            .find(|p| self.trust.anchors_path(p))
            .or_else(|| candidates.first())
            .copied();

        result.fully_signed_by_single_cert = result.is_signed() && signer.is_some();
        if let Some(path) = signer {
            result.root_in_cacerts = self.trust.anchors_path(path);
            result.issues.extend(path_issues(path, result.root_in_cacerts, now));
            result.signer = Some(path.clone());
        }
        result.no_signing_issues = result.issues.is_empty();
        result
    }
}

fn path_issues(path: &CertPath, anchored: bool, now: i64) -> Vec<SigningIssue> {
    let mut issues = Vec::new();
    for cert in &path.certs {
        if cert.not_after < now {
            issues.push(SigningIssue::Expired {
                subject: cert.subject.clone(),
            });
        } else if cert.not_before > now {
            issues.push(SigningIssue::NotYetValid {
                subject: cert.subject.clone(),
            });
        }
    }
    if let Some(cert) = path.signer() {
        if cert.not_after >= now && cert.not_after - now < EXPIRY_WARNING_SECS {
            issues.push(SigningIssue::ExpiringSoon {
                subject: cert.subject.clone(),
            });
        }
        let complete = path.root().map_or(false, CertInfo::is_self_issued) || anchored;
        if !path.chain_verified || !complete {
            issues.push(SigningIssue::BrokenChain {
                subject: cert.subject.clone(),
            });
        }
    }
    issues
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use anyhow::{bail, Result};
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    const DAY: i64 = 24 * 60 * 60;
    const NOW: i64 = 1_700_000_000;

    /// Block bytes are `<key>` or `<key>;<not_after>`.
    pub(crate) struct FakeExtractor;

    impl SignerExtractor for FakeExtractor {
        fn extract(&self, block: &[u8], _signed: &[u8]) -> Result<CertPath> {
            let text = String::from_utf8_lossy(block);
            let (key, not_after) = match text.split_once(';') {
                Some((k, t)) => (k.to_string(), t.parse().unwrap_or(i64::MAX)),
                None => (text.to_string(), i64::MAX),
            };
            if key.is_empty() {
                bail!("empty block");
            }
            Ok(CertPath {
                certs: vec![CertInfo {
                    subject: format!("CN={}", key),
                    issuer: format!("CN={}", key),
                    serial: "01".into(),
                    fingerprint: key,
                    not_before: 0,
                    not_after,
                    der: Vec::new(),
                }],
                chain_verified: true,
            })
        }
    }

    pub(crate) fn write_signed_jar(path: &Path, block: &[u8]) {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;
        let alg = DigestAlg::Sha256;
        let body = b"class-bytes";
        let section = format!("Name: p/A.class\r\nSHA-256-Digest: {}\r\n\r\n", STANDARD.encode(alg.digest(body)));
        let mf = format!("Manifest-Version: 1.0\r\n\r\n{}", section);
        let sf = format!(
            "Signature-Version: 1.0\r\nSHA-256-Digest-Manifest: {}\r\n\r\n",
            STANDARD.encode(alg.digest(mf.as_bytes()))
        );
        let mut zip = zip::ZipWriter::new(std::fs::File::create(path).unwrap());
        for (name, data) in [
            ("META-INF/MANIFEST.MF", mf.as_bytes()),
            ("META-INF/S.SF", sf.as_bytes()),
            ("META-INF/S.RSA", block),
            ("p/A.class", body.as_slice()),
        ] {
            zip.start_file(name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    pub(crate) fn write_unsigned_jar(path: &Path) {
        let mut zip = zip::ZipWriter::new(std::fs::File::create(path).unwrap());
        zip.start_file("p/B.class", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"b").unwrap();
        zip.finish().unwrap();
    }

    fn url(name: &str) -> Url {
        Url::parse(&format!("https://apps.example.com/{}", name)).unwrap()
    }

    fn verifier(trusted: &[&str]) -> SignatureVerifier {
        SignatureVerifier::new(
            Arc::new(FakeExtractor),
            Arc::new(TrustStore::from_fingerprints(trusted.iter().copied())),
        )
    }

    #[test]
    fn single_trusted_signer_over_two_jars() {
        let dir = tempfile::tempdir().unwrap();
        let mut v = verifier(&["corp"]);
        for name in ["a.jar", "b.jar"] {
            let p = dir.path().join(name);
            write_signed_jar(&p, b"corp");
            v.add_file(&url(name), &p);
        }
        let r = v.result_at(NOW);
        assert!(r.is_signed());
        assert!(r.fully_signed_by_single_cert);
        assert!(r.root_in_cacerts);
        assert!(r.no_signing_issues, "{:?}", r.issues);
        assert_eq!(r.signer.unwrap().key(), "corp");
    }

    #[test]
    fn different_signers_are_not_single_cert() {
        let dir = tempfile::tempdir().unwrap();
        let mut v = verifier(&[]);
        for (name, key) in [("a.jar", "one"), ("b.jar", "two")] {
            let p = dir.path().join(name);
            write_signed_jar(&p, key.as_bytes());
            v.add_file(&url(name), &p);
        }
        let r = v.result_at(NOW);
        assert!(r.all_jars_signed);
        assert!(!r.fully_signed_by_single_cert);
        assert!(r.signer.is_none());
    }

    #[test]
    fn mixed_set_and_unsigned_set() {
        let dir = tempfile::tempdir().unwrap();
        let signed = dir.path().join("a.jar");
        let unsigned = dir.path().join("b.jar");
        write_signed_jar(&signed, b"corp");
        write_unsigned_jar(&unsigned);

        let mut v = verifier(&[]);
        v.add_file(&url("b.jar"), &unsigned);
        let r = v.result_at(NOW);
        assert!(!r.any_jars_signed && !r.all_jars_signed);

        v.add_file(&url("a.jar"), &signed);
        let r = v.result_at(NOW);
        assert!(r.is_mixed());
        assert_eq!(v.jar(&url("b.jar")).unwrap().status, JarStatus::Unsigned);
    }

    #[test]
    fn expiring_and_expired_certificates_are_issues() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("a.jar");
        write_signed_jar(&p, format!("corp;{}", NOW + 30 * DAY).as_bytes());
        let mut v = verifier(&["corp"]);
        v.add_file(&url("a.jar"), &p);
        let r = v.result_at(NOW);
        assert!(r.is_signed());
        assert!(matches!(r.issues.as_slice(), [SigningIssue::ExpiringSoon { .. }]));

        let r = v.result_at(NOW + 60 * DAY);
        assert!(r.issues.iter().any(|i| matches!(i, SigningIssue::Expired { .. })));
        assert!(!r.no_signing_issues);
    }

    #[test]
    fn jar_set_is_verified_through_a_tracker() {
        use crate::cache::DiskCache;
        use crate::config::NetlaunchConfig;
        use crate::descriptor::DownloadOptions;
        use crate::tracker::DownloadContext;

        let dir = tempfile::tempdir().unwrap();
        let signed = dir.path().join("a.jar");
        let unsigned = dir.path().join("b.jar");
        write_signed_jar(&signed, b"corp");
        write_unsigned_jar(&unsigned);
        let missing = dir.path().join("gone.jar");

        let cache = Arc::new(DiskCache::open(&dir.path().join("cache")).unwrap());
        let ctx = Arc::new(DownloadContext::new(&NetlaunchConfig::default(), cache));
        let tracker = ResourceTracker::new(&ctx, false);
        let jars: Vec<JarDesc> = [&signed, &unsigned, &missing]
            .into_iter()
            .map(|p| JarDesc::new(Url::from_file_path(p).unwrap()))
            .collect();
        for j in &jars {
            tracker
                .add_resource(&j.location, None, DownloadOptions::default(), None)
                .unwrap();
        }

        let mut v = verifier(&["corp"]);
        v.add(&tracker, &jars);
        assert_eq!(v.jars().len(), 2, "jars without a local copy are skipped");
        assert_eq!(v.jar(&jars[0].location).unwrap().status, JarStatus::Signed);
        assert_eq!(v.jar(&jars[1].location).unwrap().status, JarStatus::Unsigned);
        assert!(v.jar(&jars[2].location).is_none());
        assert!(v.result_at(NOW).is_mixed());
        assert_eq!(v.signer_keys().into_iter().collect::<Vec<_>>(), ["corp"]);

        // Already verified jars are not checked again.
        v.add(&tracker, &jars[..1]);
        assert_eq!(v.jars().len(), 2);
    }

    #[test]
    fn bad_block_is_recorded_and_others_still_verified() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.jar");
        let good = dir.path().join("good.jar");
        write_signed_jar(&bad, b"");
        write_signed_jar(&good, b"corp");
        let mut v = verifier(&["corp"]);
        v.add_file(&url("bad.jar"), &bad);
        v.add_file(&url("good.jar"), &good);
        assert!(matches!(v.jar(&url("bad.jar")).unwrap().status, JarStatus::Error(_)));
        assert_eq!(v.jar(&url("good.jar")).unwrap().status, JarStatus::Signed);
        let r = v.result_at(NOW);
        assert!(!r.all_jars_signed);
        assert!(r.issues.iter().any(|i| matches!(i, SigningIssue::JarError { .. })));
    }
}
