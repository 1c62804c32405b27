//! `netlaunch verify` – check jar signatures.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use netlaunch_core::config::NetlaunchConfig;
use netlaunch_core::verify::{JarStatus, Pkcs7Extractor, SignatureVerifier, TrustStore};
use url::Url;

pub fn run_verify(cfg: &NetlaunchConfig, jars: &[PathBuf]) -> Result<()> {
    let trust = match &cfg.trusted_certs_dir {
        Some(dir) => TrustStore::load_dir(dir)?,
        None => TrustStore::empty(),
    };
    let mut verifier = SignatureVerifier::new(Arc::new(Pkcs7Extractor), Arc::new(trust));
    for path in jars {
        let abs = std::fs::canonicalize(path).with_context(|| format!("open {}", path.display()))?;
        let url = Url::from_file_path(&abs).map_err(|_| anyhow!("not a local path: {}", abs.display()))?;
        let checked = verifier.add_file(&url, &abs);
        println!("{:<10} {}", status_label(&checked.status), path.display());
    }

    let result = verifier.result();
    println!();
    println!("all signed:        {}", result.all_jars_signed);
    println!("single signer:     {}", result.fully_signed_by_single_cert);
    println!("trusted root:      {}", result.root_in_cacerts);
    if let Some(path) = &result.signer {
        for cert in &path.certs {
            println!("chain:             {} (issuer {})", cert.subject, cert.issuer);
        }
    }
    for issue in &result.issues {
        println!("issue:             {}", issue);
    }
    Ok(())
}

pub(crate) fn status_label(status: &JarStatus) -> String {
    match status {
        JarStatus::Unsigned => "unsigned".to_string(),
        JarStatus::Partial => "partial".to_string(),
        JarStatus::Signed => "signed".to_string(),
        JarStatus::Error(reason) => format!("error: {}", reason),
    }
}
