//! Jars embedded inside other jars.

use std::path::{Path, PathBuf};

use url::Url;

use crate::cache::{filename_from_url_path, sanitize_filename};
use crate::jar::JarFile;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestedJar {
    /// Synthetic location standing in for the embedded entry.
    pub location: Url,
    pub path: PathBuf,
}

/// `{outer}!/{entry}`.
pub fn nested_location(outer: &Url, entry: &str) -> Option<Url> {
    Url::parse(&format!("{}!/{}", outer, entry)).ok()
}

/// Extracts every embedded jar of `jar` under `dir/nested`. Entries that
/// fail to extract are logged and left out.
pub fn extract_nested(outer: &Url, jar: &JarFile, dir: &Path) -> Vec<NestedJar> {
    let prefix = filename_from_url_path(outer).unwrap_or_else(|| "jar".to_string());
    let mut out = Vec::new();
    for entry in jar.nested_jars() {
        let Some(location) = nested_location(outer, entry) else {
            continue;
        };
        let dest = dir
            .join("nested")
            .join(sanitize_filename(&format!("{}-{}", prefix, entry)));
        match jar.extract(entry, &dest) {
            Ok(true) => out.push(NestedJar {
                location,
                path: dest,
            }),
            Ok(false) => {}
            Err(e) => tracing::warn!(jar = %outer, entry, "cannot extract nested jar: {:#}", e),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    #[test]
    fn embedded_jars_get_fake_locations() {
        let dir = tempfile::tempdir().unwrap();
        let outer = dir.path().join("outer.jar");
        let mut zip = zip::ZipWriter::new(std::fs::File::create(&outer).unwrap());
        zip.start_file("lib/inner.jar", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"inner-bytes").unwrap();
        zip.start_file("META-INF/signed.jar", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"ignored").unwrap();
        zip.finish().unwrap();

        let location = Url::parse("https://apps.example.com/outer.jar").unwrap();
        let jar = JarFile::open(&outer).unwrap();
        let nested = extract_nested(&location, &jar, &dir.path().join("x"));
        assert_eq!(nested.len(), 1);
        assert_eq!(
            nested[0].location.as_str(),
            "https://apps.example.com/outer.jar!/lib/inner.jar"
        );
        assert_eq!(std::fs::read(&nested[0].path).unwrap(), b"inner-bytes");
    }
}
