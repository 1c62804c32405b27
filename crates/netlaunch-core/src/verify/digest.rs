//! Digest algorithms named in manifests and signer infos.

use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use x509_parser::der_parser::Oid;
use x509_parser::oid_registry::{
    OID_PKCS1_SHA1WITHRSA, OID_PKCS1_SHA256WITHRSA, OID_PKCS1_SHA384WITHRSA,
    OID_PKCS1_SHA512WITHRSA,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlg {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlg {
    /// Manifest attribute prefix, e.g. `SHA-256` in `SHA-256-Digest`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "SHA1" | "SHA-1" => Some(DigestAlg::Sha1),
            "SHA-256" => Some(DigestAlg::Sha256),
            "SHA-384" => Some(DigestAlg::Sha384),
            "SHA-512" => Some(DigestAlg::Sha512),
            _ => None,
        }
    }

    /// Algorithm OID content octets as found in a `SignerInfo`.
    pub fn from_oid(oid: &[u8]) -> Option<Self> {
        const SHA1: &[u8] = &[0x2B, 0x0E, 0x03, 0x02, 0x1A];
        const NIST: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02];
        if oid == SHA1 {
            return Some(DigestAlg::Sha1);
        }
        match oid.strip_prefix(NIST) {
            Some([1]) => Some(DigestAlg::Sha256),
            Some([2]) => Some(DigestAlg::Sha384),
            Some([3]) => Some(DigestAlg::Sha512),
            _ => None,
        }
    }

    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            DigestAlg::Sha1 => Sha1::digest(data).to_vec(),
            DigestAlg::Sha256 => Sha256::digest(data).to_vec(),
            DigestAlg::Sha384 => Sha384::digest(data).to_vec(),
            DigestAlg::Sha512 => Sha512::digest(data).to_vec(),
        }
    }

    /// `<digest>WithRSAEncryption` for a bare `rsaEncryption` signer.
    pub fn with_rsa(self) -> Oid<'static> {
        match self {
            DigestAlg::Sha1 => OID_PKCS1_SHA1WITHRSA,
            DigestAlg::Sha256 => OID_PKCS1_SHA256WITHRSA,
            DigestAlg::Sha384 => OID_PKCS1_SHA384WITHRSA,
            DigestAlg::Sha512 => OID_PKCS1_SHA512WITHRSA,
        }
    }
}

/// Splits `SHA-256-Digest` into its algorithm; `suffix` is `-Digest`,
/// `-Digest-Manifest` or `-Digest-Manifest-Main-Attributes`.
pub fn alg_for_attr(key: &str, suffix: &str) -> Option<DigestAlg> {
    let lower = key.to_ascii_lowercase();
    let prefix_len = lower.strip_suffix(&suffix.to_ascii_lowercase())?.len();
    DigestAlg::from_name(&key[..prefix_len])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_and_oids() {
        assert_eq!(DigestAlg::from_name("sha-256"), Some(DigestAlg::Sha256));
        assert_eq!(DigestAlg::from_name("MD5"), None);
        assert_eq!(
            DigestAlg::from_oid(&[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x03]),
            Some(DigestAlg::Sha512)
        );
        assert_eq!(DigestAlg::from_oid(&[0x2B, 0x0E, 0x03, 0x02, 0x1A]), Some(DigestAlg::Sha1));
    }

    #[test]
    fn attribute_suffixes() {
        assert_eq!(alg_for_attr("SHA-256-Digest", "-Digest"), Some(DigestAlg::Sha256));
        assert_eq!(
            alg_for_attr("SHA1-Digest-Manifest", "-Digest-Manifest"),
            Some(DigestAlg::Sha1)
        );
        assert_eq!(alg_for_attr("Created-By", "-Digest"), None);
    }

    #[test]
    fn digest_lengths() {
        assert_eq!(DigestAlg::Sha1.digest(b"x").len(), 20);
        assert_eq!(DigestAlg::Sha384.digest(b"x").len(), 48);
    }
}
