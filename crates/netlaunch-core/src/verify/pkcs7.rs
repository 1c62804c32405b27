//! Certificates and signer info of a PKCS#7 `SignedData` block
//! (`META-INF/*.RSA`, `*.DSA`, `*.EC`).
//!
//! Elements are read with `asn1-rs`; this module only knows the layout.

use anyhow::{anyhow, bail, Context, Result};
use x509_parser::der_parser::asn1_rs::{Any, Class, FromDer, Tag};

/// 1.2.840.113549.1.7.2
const OID_SIGNED_DATA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x02];
/// 1.2.840.113549.1.9.4
const OID_MESSAGE_DIGEST: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x09, 0x04];

/// Universal `SET` identifier octet, used to re-tag signed attributes.
const SET_IDENTIFIER: u8 = 0x31;

/// A parsed element together with its full encoding.
#[derive(Debug, Clone)]
struct Element<'a> {
    any: Any<'a>,
    raw: &'a [u8],
}

impl<'a> Element<'a> {
    fn is(&self, class: Class, tag: Tag) -> bool {
        self.any.header.class() == class && self.any.header.tag() == tag
    }

    fn is_universal(&self, tag: Tag) -> bool {
        self.is(Class::Universal, tag)
    }

    fn is_context(&self, n: u32) -> bool {
        self.is(Class::ContextSpecific, Tag(n))
    }

    fn content(&self) -> &'a [u8] {
        self.any.data
    }

    fn children(&self) -> Result<Vec<Element<'a>>> {
        elements(self.any.data)
    }
}

fn element(input: &[u8]) -> Result<(Element<'_>, &[u8])> {
    let (rest, any) = Any::from_der(input).map_err(|e| anyhow!("malformed DER: {}", e))?;
    let raw = &input[..input.len() - rest.len()];
    Ok((Element { any, raw }, rest))
}

fn elements(mut input: &[u8]) -> Result<Vec<Element<'_>>> {
    let mut out = Vec::new();
    while !input.is_empty() {
        let (e, rest) = element(input)?;
        out.push(e);
        input = rest;
    }
    Ok(out)
}

fn expect<'a>(e: Option<&Element<'a>>, tag: Tag, what: &str) -> Result<Element<'a>> {
    match e {
        Some(e) if e.is_universal(tag) => Ok(e.clone()),
        Some(e) => bail!("{}: unexpected {:?}", what, e.any.header.tag()),
        None => bail!("{}: missing", what),
    }
}

/// One `SignerInfo` identified by issuer and serial number.
#[derive(Debug, Clone)]
pub struct SignerInfoParts<'a> {
    /// Raw DER `Name` of the issuer.
    pub issuer: &'a [u8],
    /// Content octets of the serial `INTEGER`.
    pub serial: &'a [u8],
    pub digest_oid: &'a [u8],
    /// Full encoding of `[0] IMPLICIT SET OF Attribute`, when present.
    signed_attrs: Option<&'a [u8]>,
    pub signature_oid: &'a [u8],
    pub signature: &'a [u8],
}

impl SignerInfoParts<'_> {
    /// Bytes the signature covers when signed attributes are present: the
    /// attribute set re-tagged as a universal `SET`.
    pub fn signed_attrs_der(&self) -> Option<Vec<u8>> {
        self.signed_attrs.map(|raw| {
            let mut der = raw.to_vec();
            der[0] = SET_IDENTIFIER;
            der
        })
    }

    /// Value of the `messageDigest` signed attribute.
    pub fn message_digest(&self) -> Result<Option<&[u8]>> {
        let Some(raw) = self.signed_attrs else {
            return Ok(None);
        };
        let (attrs, _) = element(raw)?;
        for attr in attrs.children()? {
            let parts = attr.children()?;
            let oid = expect(parts.first(), Tag::Oid, "attribute type")?;
            if oid.content() != OID_MESSAGE_DIGEST {
                continue;
            }
            let values = expect(parts.get(1), Tag::Set, "attribute values")?.children()?;
            let digest = expect(values.first(), Tag::OctetString, "messageDigest")?;
            return Ok(Some(digest.content()));
        }
        Ok(None)
    }
}

#[derive(Debug, Clone)]
pub struct SignedDataParts<'a> {
    /// Raw DER of every embedded certificate.
    pub certificates: Vec<&'a [u8]>,
    pub signers: Vec<SignerInfoParts<'a>>,
}

/// Walks `ContentInfo { signedData, [0] SignedData }`.
pub fn parse_signed_data(der: &[u8]) -> Result<SignedDataParts<'_>> {
    let (info, _) = element(der)?;
    if !info.is_universal(Tag::Sequence) {
        bail!("PKCS#7 block is not a SEQUENCE");
    }
    let info = info.children()?;
    let oid = expect(info.first(), Tag::Oid, "contentType")?;
    if oid.content() != OID_SIGNED_DATA {
        bail!("PKCS#7 block is not SignedData");
    }
    let wrapper = match info.get(1) {
        Some(e) if e.is_context(0) => e,
        _ => bail!("SignedData content missing"),
    };
    let (signed_data, _) = element(wrapper.content())?;
    let fields = signed_data.children()?;

    let mut certificates = Vec::new();
    let mut signer_set = None;
    // version, digestAlgorithms, encapContentInfo, then optional parts.
    for field in fields.iter().skip(3) {
        if field.is_context(0) {
            certificates = field
                .children()?
                .into_iter()
                .filter(|c| c.is_universal(Tag::Sequence))
                .map(|c| c.raw)
                .collect();
        } else if field.is_context(1) {
            // CRLs
        } else if field.is_universal(Tag::Set) {
            signer_set = Some(field.clone());
        } else {
            bail!("unexpected SignedData field {:?}", field.any.header.tag());
        }
    }
    let signer_set = signer_set.context("SignedData has no signerInfos")?;
    let signers = signer_set
        .children()?
        .iter()
        .map(parse_signer_info)
        .collect::<Result<Vec<_>>>()?;
    Ok(SignedDataParts {
        certificates,
        signers,
    })
}

fn parse_signer_info<'a>(info: &Element<'a>) -> Result<SignerInfoParts<'a>> {
    let fields = info.children()?;
    let mut it = fields.iter().skip(1).peekable();
    let sid = expect(it.next(), Tag::Sequence, "issuerAndSerialNumber")?.children()?;
    let issuer = expect(sid.first(), Tag::Sequence, "issuer")?;
    let serial = expect(sid.get(1), Tag::Integer, "serialNumber")?;
    let digest_alg = expect(it.next(), Tag::Sequence, "digestAlgorithm")?.children()?;
    let digest_oid = expect(digest_alg.first(), Tag::Oid, "digest OID")?;
    let signed_attrs = match it.peek() {
        Some(e) if e.is_context(0) => it.next().map(|e| e.raw),
        _ => None,
    };
    let sig_alg = expect(it.next(), Tag::Sequence, "signatureAlgorithm")?.children()?;
    let signature_oid = expect(sig_alg.first(), Tag::Oid, "signature OID")?;
    let signature = expect(it.next(), Tag::OctetString, "signature")?;
    Ok(SignerInfoParts {
        issuer: issuer.raw,
        serial: serial.content(),
        digest_oid: digest_oid.content(),
        signed_attrs,
        signature_oid: signature_oid.content(),
        signature: signature.content(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    const SEQUENCE: u8 = 0x30;
    const SET: u8 = 0x31;
    const INTEGER: u8 = 0x02;
    const OCTET_STRING: u8 = 0x04;
    const OID: u8 = 0x06;
    const CONTEXT_0: u8 = 0xA0;

    /// Encodes one element; test fixtures only.
    pub(crate) fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
        let mut out = vec![tag];
        if content.len() < 0x80 {
            out.push(content.len() as u8);
        } else {
            let len = (content.len() as u32).to_be_bytes();
            let skip = len.iter().take_while(|&&b| b == 0).count();
            out.push(0x80 | (4 - skip) as u8);
            out.extend_from_slice(&len[skip..]);
        }
        out.extend_from_slice(content);
        out
    }

    /// SignedData with two opaque "certificates" and one signer.
    pub(crate) fn sample_block() -> Vec<u8> {
        let sha256 = [0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01];
        let rsa = [0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x01];
        let cert_a = tlv(SEQUENCE, &tlv(INTEGER, &[1]));
        let cert_b = tlv(SEQUENCE, &tlv(OCTET_STRING, &[0x55; 200]));
        let issuer = tlv(SEQUENCE, &tlv(SET, &tlv(OCTET_STRING, b"issuer")));
        let attrs = tlv(
            CONTEXT_0,
            &tlv(
                SEQUENCE,
                &[
                    tlv(OID, OID_MESSAGE_DIGEST),
                    tlv(SET, &tlv(OCTET_STRING, b"digest")),
                ]
                .concat(),
            ),
        );
        let signer = tlv(
            SEQUENCE,
            &[
                tlv(INTEGER, &[1]),
                tlv(SEQUENCE, &[issuer, tlv(INTEGER, &[0x00, 0x9f])].concat()),
                tlv(SEQUENCE, &tlv(OID, &sha256)),
                attrs,
                tlv(SEQUENCE, &tlv(OID, &rsa)),
                tlv(OCTET_STRING, b"sig"),
            ]
            .concat(),
        );
        let signed_data = tlv(
            SEQUENCE,
            &[
                tlv(INTEGER, &[1]),
                tlv(SET, &[]),
                tlv(SEQUENCE, &tlv(OID, &[0x2A])),
                tlv(CONTEXT_0, &[cert_a, cert_b].concat()),
                tlv(SET, &signer),
            ]
            .concat(),
        );
        tlv(
            SEQUENCE,
            &[tlv(OID, OID_SIGNED_DATA), tlv(CONTEXT_0, &signed_data)].concat(),
        )
    }

    #[test]
    fn walks_signed_data() {
        let block = sample_block();
        let parts = parse_signed_data(&block).unwrap();
        assert_eq!(parts.certificates.len(), 2);
        assert_eq!(parts.certificates[1].len(), 206);
        assert_eq!(parts.signers.len(), 1);
        let signer = &parts.signers[0];
        assert_eq!(signer.serial, &[0x00, 0x9f]);
        assert_eq!(signer.signature, b"sig");
        assert_eq!(signer.message_digest().unwrap(), Some(&b"digest"[..]));
        assert_eq!(signer.signed_attrs_der().unwrap()[0], SET);
    }

    #[test]
    fn not_signed_data() {
        let der = tlv(SEQUENCE, &tlv(OID, &[0x2A, 0x03]));
        assert!(parse_signed_data(&der).is_err());
    }

    #[test]
    fn truncated_blocks_are_rejected() {
        let block = sample_block();
        assert!(parse_signed_data(&block[..block.len() - 4]).is_err());
        assert!(parse_signed_data(&[0x30, 0x80, 0x00, 0x00]).is_err());
    }
}
