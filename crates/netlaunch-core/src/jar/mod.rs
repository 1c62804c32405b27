//! Read access to downloaded jars.

mod index;
mod manifest;

pub use index::JarIndex;
pub use manifest::{Manifest, Section};

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use zip::ZipArchive;

pub const MANIFEST_NAME: &str = "META-INF/MANIFEST.MF";
pub const INDEX_NAME: &str = "META-INF/INDEX.LIST";

/// An open jar. Entry names are read once; entry bodies on demand.
#[derive(Debug)]
pub struct JarFile {
    path: PathBuf,
    names: Vec<String>,
    lookup: HashSet<String>,
    archive: Mutex<ZipArchive<BufReader<File>>>,
}

impl JarFile {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("open jar {}", path.display()))?;
        let archive = ZipArchive::new(BufReader::new(file))
            .with_context(|| format!("read jar {}", path.display()))?;
        let names: Vec<String> = archive
            .file_names()
            .filter(|n| !n.ends_with('/'))
            .map(str::to_string)
            .collect();
        let lookup = names.iter().cloned().collect();
        Ok(Self {
            path: path.to_path_buf(),
            names,
            lookup,
            archive: Mutex::new(archive),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File entries (directories excluded).
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup.contains(name)
    }

    /// Body of entry `name`, or `None` when the jar has no such entry.
    pub fn read(&self, name: &str) -> Result<Option<Vec<u8>>> {
        if !self.contains(name) {
            return Ok(None);
        }
        let mut archive = self.archive.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entry = archive
            .by_name(name)
            .with_context(|| format!("{} in {}", name, self.path.display()))?;
        let mut buf = Vec::with_capacity(initial_capacity(entry.size()));
        entry
            .read_to_end(&mut buf)
            .with_context(|| format!("read {} from {}", name, self.path.display()))?;
        Ok(Some(buf))
    }

    /// Copies entry `name` to `dest`; returns false when absent.
    pub fn extract(&self, name: &str, dest: &Path) -> Result<bool> {
        if !self.contains(name) {
            return Ok(false);
        }
        let mut archive = self.archive.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entry = archive.by_name(name)?;
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(dest).with_context(|| format!("create {}", dest.display()))?;
        io::copy(&mut entry, &mut out)?;
        Ok(true)
    }

    pub fn manifest(&self) -> Result<Option<Manifest>> {
        self.read(MANIFEST_NAME)?.map(Manifest::parse).transpose()
    }

    pub fn index(&self) -> Result<Option<JarIndex>> {
        Ok(self
            .read(INDEX_NAME)?
            .map(|b| JarIndex::parse(&String::from_utf8_lossy(&b))))
    }

    /// Entries that are themselves jars.
    pub fn nested_jars(&self) -> impl Iterator<Item = &str> {
        self.names
            .iter()
            .map(String::as_str)
            .filter(|n| n.ends_with(".jar") && !n.starts_with("META-INF/"))
    }
}

/// Entry sizes come from the archive header; reads grow past this on demand.
const MAX_PREALLOCATION: u64 = 1 << 20;

fn initial_capacity(declared: u64) -> usize {
    declared.min(MAX_PREALLOCATION) as usize
}

/// `com.example.Main` -> `com/example/Main.class`.
pub fn class_entry_name(class_name: &str) -> String {
    format!("{}.class", class_name.replace('.', "/"))
}

/// Native library file names for `name` across platforms.
pub fn native_file_names(name: &str) -> [String; 4] {
    [
        format!("lib{}.so", name),
        format!("{}.dll", name),
        format!("lib{}.dylib", name),
        format!("lib{}.jnilib", name),
    ]
}

pub fn is_native_library(entry: &str) -> bool {
    [".so", ".dll", ".dylib", ".jnilib"]
        .iter()
        .any(|ext| entry.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn build(path: &Path, entries: &[(&str, &[u8])]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, body) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(body).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn reads_entries_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.jar");
        build(
            &path,
            &[
                (MANIFEST_NAME, b"Manifest-Version: 1.0\nMain-Class: app.Main\n\n"),
                ("app/Main.class", b"\xca\xfe\xba\xbe"),
                ("lib/inner.jar", b"PK"),
            ],
        );
        let jar = JarFile::open(&path).unwrap();
        assert!(jar.contains("app/Main.class"));
        assert_eq!(jar.read("app/Main.class").unwrap().unwrap(), b"\xca\xfe\xba\xbe");
        assert_eq!(jar.read("missing").unwrap(), None);
        assert_eq!(jar.manifest().unwrap().unwrap().main_class(), Some("app.Main"));
        assert_eq!(jar.nested_jars().collect::<Vec<_>>(), ["lib/inner.jar"]);
    }

    #[test]
    fn not_a_jar() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.jar");
        std::fs::write(&path, b"not a zip").unwrap();
        assert!(JarFile::open(&path).is_err());
    }

    #[test]
    fn declared_sizes_do_not_drive_allocation() {
        assert_eq!(initial_capacity(512), 512);
        assert_eq!(initial_capacity(u64::MAX), 1 << 20);
        assert_eq!(initial_capacity(1 << 20), 1 << 20);
    }

    #[test]
    fn names() {
        assert_eq!(class_entry_name("a.b.C"), "a/b/C.class");
        assert!(is_native_library("libfoo.so"));
        assert!(!is_native_library("foo.class"));
        assert_eq!(native_file_names("gl")[0], "libgl.so");
    }
}
