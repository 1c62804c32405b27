//! JNLP version strings.
//!
//! A version string is a space separated list of alternatives. Each
//! alternative is a version id, optionally suffixed with `+` (this version or
//! anything greater) or `*` (any version starting with this prefix).

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Modifier {
    Exact,
    OrGreater,
    Prefix,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct VersionId {
    parts: Vec<String>,
    modifier: Modifier,
}

fn split_parts(id: &str) -> Vec<String> {
    id.split(['.', '-', '_'])
        .map(|s| s.to_string())
        .collect()
}

fn compare_part(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

/// Compares two version ids, padding the shorter one with `0`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let pa = split_parts(a);
    let pb = split_parts(b);
    let len = pa.len().max(pb.len());
    for i in 0..len {
        let x = pa.get(i).map(String::as_str).unwrap_or("0");
        let y = pb.get(i).map(String::as_str).unwrap_or("0");
        match compare_part(x, y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

impl VersionId {
    fn parse(raw: &str) -> Self {
        let (body, modifier) = if let Some(b) = raw.strip_suffix('+') {
            (b, Modifier::OrGreater)
        } else if let Some(b) = raw.strip_suffix('*') {
            (b, Modifier::Prefix)
        } else {
            (raw, Modifier::Exact)
        };
        Self {
            parts: split_parts(body.trim_end_matches(['.', '-', '_'])),
            modifier,
        }
    }

    fn body(&self) -> String {
        self.parts.join(".")
    }

    fn matches(&self, candidate: &str) -> bool {
        match self.modifier {
            Modifier::Exact => compare_versions(&self.body(), candidate) == Ordering::Equal,
            Modifier::OrGreater => compare_versions(candidate, &self.body()) != Ordering::Less,
            Modifier::Prefix => {
                let cand = split_parts(candidate);
                self.parts.iter().enumerate().all(|(i, p)| {
                    let c = cand.get(i).map(String::as_str).unwrap_or("0");
                    compare_part(p, c) == Ordering::Equal
                })
            }
        }
    }
}

/// A parsed version string such as `"1.4+ 2.0*"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionString {
    raw: String,
    ids: Vec<VersionId>,
}

impl VersionString {
    pub fn parse(raw: &str) -> Option<Self> {
        let ids: Vec<VersionId> = raw.split_whitespace().map(VersionId::parse).collect();
        if ids.is_empty() {
            return None;
        }
        Some(Self {
            raw: raw.trim().to_string(),
            ids,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True when `version` satisfies any alternative.
    pub fn contains(&self, version: &str) -> bool {
        self.ids.iter().any(|id| id.matches(version))
    }

    /// A single exact id without modifiers; only such versions can be
    /// substituted into download URLs.
    pub fn exact(&self) -> Option<&str> {
        match self.ids.as_slice() {
            [only] if only.modifier == Modifier::Exact => Some(self.raw.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for VersionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for VersionString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for VersionString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        VersionString::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom("empty version string"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_and_padded_comparison() {
        assert_eq!(compare_versions("1.10", "1.9"), Ordering::Greater);
        assert_eq!(compare_versions("1.0", "1"), Ordering::Equal);
        assert_eq!(compare_versions("1.2_05", "1.2.5"), Ordering::Equal);
        assert_eq!(compare_versions("1.2-beta", "1.2-alpha"), Ordering::Greater);
    }

    #[test]
    fn exact_or_greater_and_prefix() {
        let v = VersionString::parse("1.4+").unwrap();
        assert!(v.contains("1.4"));
        assert!(v.contains("1.5.1"));
        assert!(!v.contains("1.3.9"));

        let p = VersionString::parse("1.4*").unwrap();
        assert!(p.contains("1.4"));
        assert!(p.contains("1.4.2"));
        assert!(!p.contains("1.5"));

        let e = VersionString::parse("2.0").unwrap();
        assert!(e.contains("2.0.0"));
        assert!(!e.contains("2.0.1"));
    }

    #[test]
    fn alternatives() {
        let v = VersionString::parse("1.1 2.0*").unwrap();
        assert!(v.contains("1.1"));
        assert!(v.contains("2.0.3"));
        assert!(!v.contains("1.2"));
        assert!(v.exact().is_none());
        assert_eq!(VersionString::parse("3.1").unwrap().exact(), Some("3.1"));
        assert!(VersionString::parse("   ").is_none());
    }

    #[test]
    fn serde_as_plain_string() {
        let v: VersionString = serde_json::from_str("\"1.2+\"").unwrap();
        assert_eq!(v.as_str(), "1.2+");
        assert_eq!(serde_json::to_string(&v).unwrap(), "\"1.2+\"");
    }
}
