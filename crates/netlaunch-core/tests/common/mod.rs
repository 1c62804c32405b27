//! Shared fixtures: jar writers, a fake signer extractor and context setup.

#![allow(dead_code)]

pub mod jar_server;

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use netlaunch_core::cache::DiskCache;
use netlaunch_core::config::NetlaunchConfig;
use netlaunch_core::retry::RetryPolicy;
use netlaunch_core::verify::{CertInfo, CertPath, DigestAlg, SignerExtractor};
use netlaunch_core::DownloadContext;
use sha2::{Digest, Sha256};
use zip::write::SimpleFileOptions;

/// Signature blocks in test jars are just the signer's name.
pub struct FakeExtractor;

impl SignerExtractor for FakeExtractor {
    fn extract(&self, block: &[u8], _signed: &[u8]) -> Result<CertPath> {
        let key = String::from_utf8_lossy(block).to_string();
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
                not_after: i64::MAX,
                der: Vec::new(),
            }],
            chain_verified: true,
        })
    }
}

/// Class entries get a recognisable body: the class name itself.
pub fn class_entry(name: &str) -> (String, Vec<u8>) {
    (format!("{}.class", name.replace('.', "/")), name.as_bytes().to_vec())
}

/// Writes a plain jar. `main_class` goes into the manifest when given.
pub fn write_jar(path: &Path, main_class: Option<&str>, entries: &[(String, Vec<u8>)]) {
    match main_class {
        Some(main) => write_jar_with_manifest(path, &[("Main-Class", main)], entries),
        None => write_entries(zip::ZipWriter::new(std::fs::File::create(path).unwrap()), entries),
    }
}

/// Writes a jar whose manifest carries `attributes` (e.g. `Class-Path`).
pub fn write_jar_with_manifest(path: &Path, attributes: &[(&str, &str)], entries: &[(String, Vec<u8>)]) {
    let mut mf = String::from("Manifest-Version: 1.0\r\n");
    for (name, value) in attributes {
        mf.push_str(&format!("{}: {}\r\n", name, value));
    }
    mf.push_str("\r\n");
    let mut zip = zip::ZipWriter::new(std::fs::File::create(path).unwrap());
    zip.start_file("META-INF/MANIFEST.MF", SimpleFileOptions::default()).unwrap();
    zip.write_all(mf.as_bytes()).unwrap();
    write_entries(zip, entries);
}

fn write_entries(mut zip: zip::ZipWriter<std::fs::File>, entries: &[(String, Vec<u8>)]) {
    for (name, body) in entries {
        zip.start_file(name.as_str(), SimpleFileOptions::default()).unwrap();
        zip.write_all(body).unwrap();
    }
    zip.finish().unwrap();
}

/// Writes a jar whose every entry is signed by `signer`.
pub fn write_signed_jar(path: &Path, signer: &str, entries: &[(String, Vec<u8>)]) {
    let alg = DigestAlg::Sha256;
    let mut mf = String::from("Manifest-Version: 1.0\r\n\r\n");
    for (name, body) in entries {
        mf.push_str(&format!(
            "Name: {}\r\nSHA-256-Digest: {}\r\n\r\n",
            name,
            STANDARD.encode(alg.digest(body))
        ));
    }
    let sf = format!(
        "Signature-Version: 1.0\r\nSHA-256-Digest-Manifest: {}\r\n\r\n",
        STANDARD.encode(alg.digest(mf.as_bytes()))
    );
    let mut zip = zip::ZipWriter::new(std::fs::File::create(path).unwrap());
    for (name, data) in [
        ("META-INF/MANIFEST.MF", mf.as_bytes()),
        ("META-INF/SIGNER.SF", sf.as_bytes()),
        ("META-INF/SIGNER.RSA", signer.as_bytes()),
    ] {
        zip.start_file(name, SimpleFileOptions::default()).unwrap();
        zip.write_all(data).unwrap();
    }
    for (name, body) in entries {
        zip.start_file(name.as_str(), SimpleFileOptions::default()).unwrap();
        zip.write_all(body).unwrap();
    }
    zip.finish().unwrap();
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Download context over a fresh disk cache in `dir`; one attempt per
/// transfer so failing tests fail fast.
pub fn download_context(dir: &Path, config: &NetlaunchConfig) -> Arc<DownloadContext> {
    let cache = Arc::new(DiskCache::open(&dir.join("cache")).unwrap());
    Arc::new(DownloadContext::new(config, cache).with_retry(RetryPolicy::single_attempt()))
}
