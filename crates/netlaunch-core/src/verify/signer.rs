//! Signer certificates and chains.

use std::borrow::Cow;

use anyhow::{anyhow, bail, Context, Result};
use sha2::{Digest, Sha256};
use x509_parser::der_parser::asn1_rs::BitString;
use x509_parser::der_parser::Oid;
use x509_parser::oid_registry::OID_PKCS1_RSAENCRYPTION;
use x509_parser::prelude::*;

use super::pkcs7::{self, SignerInfoParts};
use super::digest::DigestAlg;

/// The parts of a certificate that signing decisions look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertInfo {
    pub subject: String,
    pub issuer: String,
    /// Hex serial number.
    pub serial: String,
    /// Hex SHA-256 of the DER encoding.
    pub fingerprint: String,
    /// Validity window, unix seconds.
    pub not_before: i64,
    pub not_after: i64,
    pub der: Vec<u8>,
}

impl CertInfo {
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, cert) =
            parse_x509_certificate(der).map_err(|e| anyhow!("invalid certificate: {}", e))?;
        Ok(Self::from_parsed(der, &cert))
    }

    fn from_parsed(der: &[u8], cert: &X509Certificate<'_>) -> Self {
        Self {
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            serial: hex::encode(cert.raw_serial()),
            fingerprint: fingerprint(der),
            not_before: cert.validity().not_before.timestamp(),
            not_after: cert.validity().not_after.timestamp(),
            der: der.to_vec(),
        }
    }

    pub fn is_self_issued(&self) -> bool {
        self.subject == self.issuer
    }
}

pub fn fingerprint(der: &[u8]) -> String {
    hex::encode(Sha256::digest(der))
}

/// Signer certificate first, then each issuer up to the last one found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertPath {
    pub certs: Vec<CertInfo>,
    /// Every link's signature verified against the next certificate's key.
    pub chain_verified: bool,
}

impl CertPath {
    pub fn signer(&self) -> Option<&CertInfo> {
        self.certs.first()
    }

    pub fn root(&self) -> Option<&CertInfo> {
        self.certs.last()
    }

    /// Identity used to compare signers across jars.
    pub fn key(&self) -> &str {
        self.signer().map(|c| c.fingerprint.as_str()).unwrap_or("")
    }
}

/// Pulls the signer chain out of a signature block and checks that the block
/// signs `signed_content` (the `.SF` file).
pub trait SignerExtractor: Send + Sync {
    fn extract(&self, block: &[u8], signed_content: &[u8]) -> Result<CertPath>;
}

/// PKCS#7 `SignedData` blocks as written by `jarsigner`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pkcs7Extractor;

impl SignerExtractor for Pkcs7Extractor {
    fn extract(&self, block: &[u8], signed_content: &[u8]) -> Result<CertPath> {
        let parts = pkcs7::parse_signed_data(block)?;
        let info = parts
            .signers
            .first()
            .context("signature block has no signer")?;
        let certs = parts
            .certificates
            .iter()
            .map(|raw| {
                parse_x509_certificate(raw)
                    .map(|(_, c)| (*raw, c))
                    .map_err(|e| anyhow!("invalid certificate in signature block: {}", e))
            })
            .collect::<Result<Vec<_>>>()?;

        let signer = certs
            .iter()
            .position(|(_, c)| c.raw_serial() == info.serial && c.issuer().as_raw() == info.issuer)
            .context("signer certificate not present in signature block")?;
        verify_content(info, &certs[signer].1, signed_content)?;

        let mut chain = vec![signer];
        let mut chain_verified = true;
        loop {
            let current = &certs[chain[chain.len() - 1]].1;
            if current.subject().as_raw() == current.issuer().as_raw() {
                break;
            }
            let next = certs.iter().enumerate().position(|(i, (_, c))| {
                !chain.contains(&i) && c.subject().as_raw() == current.issuer().as_raw()
            });
            let Some(next) = next else { break };
            if current
                .verify_signature(Some(certs[next].1.public_key()))
                .is_err()
            {
                chain_verified = false;
                break;
            }
            chain.push(next);
        }

        Ok(CertPath {
            certs: chain
                .into_iter()
                .map(|i| CertInfo::from_parsed(certs[i].0, &certs[i].1))
                .collect(),
            chain_verified,
        })
    }
}

/// Checks the signer's signature over the `.SF` bytes, going through the
/// signed attributes when present.
fn verify_content(
    info: &SignerInfoParts<'_>,
    cert: &X509Certificate<'_>,
    signed_content: &[u8],
) -> Result<()> {
    let digest = DigestAlg::from_oid(info.digest_oid).context("unsupported digest algorithm")?;
    let data: Cow<'_, [u8]> = match info.signed_attrs_der() {
        Some(attrs) => {
            let expected = info
                .message_digest()?
                .context("signed attributes lack a message digest")?;
            if expected != digest.digest(signed_content).as_slice() {
                bail!("signature file does not match its signature block");
            }
            Cow::Owned(attrs)
        }
        None => Cow::Borrowed(signed_content),
    };
    let oid = Oid::new(Cow::Borrowed(info.signature_oid));
    let algorithm = if oid == OID_PKCS1_RSAENCRYPTION {
        digest.with_rsa()
    } else {
        oid
    };
    x509_parser::verify::verify_signature(
        cert.public_key(),
        &AlgorithmIdentifier::new(algorithm, None),
        &BitString::new(0, info.signature),
        &data,
    )
    .map_err(|e| anyhow!("signature block does not verify: {:?}", e))
}

/// True when `child` carries a valid signature by `issuer`'s key.
pub fn signed_by(child_der: &[u8], issuer_der: &[u8]) -> bool {
    let (Ok((_, child)), Ok((_, issuer))) = (
        parse_x509_certificate(child_der),
        parse_x509_certificate(issuer_der),
    ) else {
        return false;
    };
    child.issuer().as_raw() == issuer.subject().as_raw()
        && child.verify_signature(Some(issuer.public_key())).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_block_is_rejected() {
        assert!(Pkcs7Extractor.extract(b"not der", b"sf").is_err());
    }

    #[test]
    fn block_without_matching_certificate_is_rejected() {
        // Walkable SignedData whose "certificates" are not X.509.
        let block = super::super::pkcs7::tests::sample_block();
        assert!(Pkcs7Extractor.extract(&block, b"sf").is_err());
    }

    #[test]
    fn path_accessors() {
        let cert = |name: &str, fp: &str| CertInfo {
            subject: name.to_string(),
            issuer: "CN=root".to_string(),
            serial: "01".to_string(),
            fingerprint: fp.to_string(),
            not_before: 0,
            not_after: i64::MAX,
            der: Vec::new(),
        };
        let path = CertPath {
            certs: vec![cert("CN=leaf", "aa"), cert("CN=root", "bb")],
            chain_verified: true,
        };
        assert_eq!(path.key(), "aa");
        assert!(path.root().unwrap().is_self_issued());
        assert!(!path.signer().unwrap().is_self_issued());
    }
}
