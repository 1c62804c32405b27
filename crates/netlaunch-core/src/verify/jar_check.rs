//! Per-jar signature checking: `.SF` against the manifest, manifest digests
//! against entry bodies, and signer extraction for every signature file.

use std::collections::HashSet;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::digest::{alg_for_attr, DigestAlg};
use super::signer::{CertPath, SignerExtractor};
use crate::jar::{JarFile, Manifest, Section};

const BLOCK_EXTENSIONS: [&str; 3] = ["RSA", "DSA", "EC"];

/// Signing coverage of one jar's signable entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coverage {
    /// No entry is signed.
    Unsigned,
    /// Some entries are signed, some are not.
    Partial,
    /// Every signable entry is signed (trivially so for a jar without any).
    Signed,
}

#[derive(Debug, Clone)]
pub struct JarReport {
    pub coverage: Coverage,
    /// Signers whose signatures cover every signable entry.
    pub full_signers: Vec<CertPath>,
    pub signable_entries: usize,
}

struct SignatureFile {
    path: CertPath,
    /// Entry names this signer vouches for.
    names: HashSet<String>,
}

/// Entries outside `META-INF/` take part in signing.
pub fn is_signable(name: &str) -> bool {
    !name.starts_with("META-INF/") && !name.ends_with('/')
}

/// Checks every signature in `jar`. An error means the jar is tampered with
/// or malformed; unsigned entries are not errors.
pub fn check_jar(jar: &JarFile, extractor: &dyn SignerExtractor) -> Result<JarReport> {
    let signable: Vec<&str> = jar
        .names()
        .iter()
        .map(String::as_str)
        .filter(|n| is_signable(n))
        .collect();
    let manifest = jar.manifest()?;
    let signers = match &manifest {
        Some(m) => signature_files(jar, m, extractor)?,
        None => Vec::new(),
    };
    let (Some(manifest), false) = (manifest, signers.is_empty()) else {
        let coverage = if signable.is_empty() {
            Coverage::Signed
        } else {
            Coverage::Unsigned
        };
        return Ok(JarReport {
            coverage,
            full_signers: Vec::new(),
            signable_entries: signable.len(),
        });
    };

    let mut covered = vec![0usize; signers.len()];
    let mut unsigned = 0usize;
    for name in &signable {
        let verified = match manifest.entry(name) {
            Some(section) => verify_entry(jar, name, section)?,
            None => false,
        };
        let mut any = false;
        if verified {
            for (i, s) in signers.iter().enumerate() {
                if s.names.contains(*name) {
                    covered[i] += 1;
                    any = true;
                }
            }
        }
        if !any {
            unsigned += 1;
        }
    }

    let coverage = if unsigned == 0 {
        Coverage::Signed
    } else if unsigned == signable.len() {
        Coverage::Unsigned
    } else {
        Coverage::Partial
    };
    let full_signers = signers
        .into_iter()
        .zip(covered)
        .filter(|(_, n)| *n == signable.len() && !signable.is_empty())
        .map(|(s, _)| s.path)
        .collect();
    Ok(JarReport {
        coverage,
        full_signers,
        signable_entries: signable.len(),
    })
}

/// Validates each `META-INF/<NAME>.SF` against the manifest and extracts
/// its signer from the matching block file.
fn signature_files(
    jar: &JarFile,
    manifest: &Manifest,
    extractor: &dyn SignerExtractor,
) -> Result<Vec<SignatureFile>> {
    let mut out = Vec::new();
    for name in jar.names() {
        let Some(stem) = name
            .strip_prefix("META-INF/")
            .filter(|rest| !rest.contains('/'))
            .and_then(|rest| rest.strip_suffix(".SF").or_else(|| rest.strip_suffix(".sf")))
        else {
            continue;
        };
        let block = BLOCK_EXTENSIONS
            .iter()
            .map(|ext| format!("META-INF/{}.{}", stem, ext))
            .find(|b| jar.contains(b));
        let Some(block_name) = block else {
            tracing::warn!(jar = %jar.path().display(), "{} has no signature block", name);
            continue;
        };
        let sf_bytes = jar.read(name)?.unwrap_or_default();
        let block_bytes = jar.read(&block_name)?.unwrap_or_default();
        let sf = Manifest::parse(sf_bytes.clone()).with_context(|| format!("parse {}", name))?;
        let names = signed_names(manifest, &sf).with_context(|| format!("check {}", name))?;
        let path = extractor
            .extract(&block_bytes, &sf_bytes)
            .with_context(|| format!("signer of {}", name))?;
        out.push(SignatureFile { path, names });
    }
    Ok(out)
}

/// Names covered by one signature file. A matching whole-manifest digest
/// covers every manifest section; otherwise each section digest must match.
fn signed_names(manifest: &Manifest, sf: &Manifest) -> Result<HashSet<String>> {
    let all_sections = || {
        manifest
            .entries()
            .iter()
            .filter_map(Section::name)
            .map(str::to_string)
            .collect::<HashSet<_>>()
    };
    for (key, value) in sf.main().attrs() {
        if let Some(alg) = alg_for_attr(key, "-Digest-Manifest") {
            if digest_matches(alg, manifest.bytes(), value) {
                return Ok(all_sections());
            }
        }
    }
    for (key, value) in sf.main().attrs() {
        if let Some(alg) = alg_for_attr(key, "-Digest-Manifest-Main-Attributes") {
            if !digest_matches(alg, manifest.section_bytes(manifest.main()), value) {
                bail!("manifest main attributes were modified after signing");
            }
        }
    }
    let mut names = HashSet::new();
    for section in sf.entries() {
        let Some(name) = section.name() else { continue };
        let Some(entry) = manifest.entry(name) else {
            bail!("signature file names {} which the manifest lacks", name);
        };
        let mut checked = false;
        for (key, value) in section.attrs() {
            if let Some(alg) = alg_for_attr(key, "-Digest") {
                if !digest_matches(alg, manifest.section_bytes(entry), value) {
                    bail!("manifest section for {} was modified after signing", name);
                }
                checked = true;
            }
        }
        if checked {
            names.insert(name.to_string());
        }
    }
    Ok(names)
}

/// True when the entry carries at least one known digest and all known
/// digests match its body.
fn verify_entry(jar: &JarFile, name: &str, section: &Section) -> Result<bool> {
    let digests: Vec<(DigestAlg, &str)> = section
        .attrs()
        .filter_map(|(k, v)| alg_for_attr(k, "-Digest").map(|a| (a, v)))
        .collect();
    if digests.is_empty() {
        return Ok(false);
    }
    let body = jar.read(name)?.unwrap_or_default();
    for (alg, expected) in digests {
        if !digest_matches(alg, &body, expected) {
            bail!("entry {} has been tampered with", name);
        }
    }
    Ok(true)
}

fn digest_matches(alg: DigestAlg, data: &[u8], expected_b64: &str) -> bool {
    match STANDARD.decode(expected_b64.trim()) {
        Ok(expected) => expected == alg.digest(data),
        Err(_) => false,
    }
}
