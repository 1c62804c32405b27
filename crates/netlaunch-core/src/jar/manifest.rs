//! `MANIFEST.MF` and `.SF` parsing.
//!
//! Both files are sequences of header sections separated by blank lines.
//! Each section keeps the byte range it occupies (including its terminating
//! blank line) because signature files digest sections byte-for-byte.

use std::collections::HashMap;
use std::ops::Range;

use anyhow::{bail, Result};

/// One header section. The first section of a file is the main section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    attrs: Vec<(String, String)>,
    raw: Range<usize>,
}

impl Section {
    /// Attribute lookup; names compare case-insensitively.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn name(&self) -> Option<&str> {
        self.get("Name")
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn raw_range(&self) -> Range<usize> {
        self.raw.clone()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Manifest {
    bytes: Vec<u8>,
    main: Section,
    entries: Vec<Section>,
    by_name: HashMap<String, usize>,
}

impl Manifest {
    pub fn parse(bytes: Vec<u8>) -> Result<Self> {
        let mut sections = Vec::new();
        let mut current = Section::default();
        let mut start = 0usize;
        let mut pos = 0usize;

        while pos < bytes.len() {
            let (line, next) = next_line(&bytes, pos);
            if line.is_empty() {
                if !current.attrs.is_empty() {
                    current.raw = start..next;
                    sections.push(std::mem::take(&mut current));
                }
                start = next;
            } else if line[0] == b' ' {
                let Some((_, value)) = current.attrs.last_mut() else {
                    bail!("continuation line without a header at byte {}", pos);
                };
                value.push_str(&String::from_utf8_lossy(&line[1..]));
            } else {
                let text = String::from_utf8_lossy(line);
                let Some((key, value)) = text.split_once(':') else {
                    bail!("malformed header line {:?}", text);
                };
                current
                    .attrs
                    .push((key.trim().to_string(), value.strip_prefix(' ').unwrap_or(value).to_string()));
            }
            pos = next;
        }
        if !current.attrs.is_empty() {
            current.raw = start..bytes.len();
            sections.push(current);
        }

        let mut sections = sections.into_iter();
        let main = sections.next().unwrap_or_default();
        let mut entries = Vec::new();
        let mut by_name = HashMap::new();
        for section in sections {
            if let Some(name) = section.name() {
                by_name.insert(name.to_string(), entries.len());
            }
            entries.push(section);
        }
        Ok(Self {
            bytes,
            main,
            entries,
            by_name,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn main(&self) -> &Section {
        &self.main
    }

    pub fn main_attr(&self, key: &str) -> Option<&str> {
        self.main.get(key)
    }

    pub fn main_class(&self) -> Option<&str> {
        self.main_attr("Main-Class").map(str::trim).filter(|s| !s.is_empty())
    }

    /// `Class-Path` entries, relative to the jar that declares them.
    pub fn class_path(&self) -> Vec<String> {
        self.main_attr("Class-Path")
            .map(|cp| cp.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn entry(&self, name: &str) -> Option<&Section> {
        self.by_name.get(name).map(|&i| &self.entries[i])
    }

    pub fn entries(&self) -> &[Section] {
        &self.entries
    }

    pub fn section_bytes(&self, section: &Section) -> &[u8] {
        &self.bytes[section.raw.clone()]
    }
}

/// Returns the line starting at `pos` without its terminator, and the
/// offset just past the terminator (`\r\n`, `\n` or `\r`).
fn next_line(bytes: &[u8], pos: usize) -> (&[u8], usize) {
    let rest = &bytes[pos..];
    match rest.iter().position(|&b| b == b'\n' || b == b'\r') {
        None => (rest, bytes.len()),
        Some(i) => {
            let skip = if rest[i] == b'\r' && rest.get(i + 1) == Some(&b'\n') { 2 } else { 1 };
            (&rest[..i], pos + i + skip)
        }
    }
}
