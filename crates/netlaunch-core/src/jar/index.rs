//! `META-INF/INDEX.LIST`: which jar holds which package.

use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JarIndex {
    packages: HashMap<String, Vec<String>>,
}

impl JarIndex {
    /// Parses the index text. The version header block is skipped; every
    /// following block starts with a jar name and lists its packages.
    pub fn parse(text: &str) -> Self {
        let mut packages: HashMap<String, Vec<String>> = HashMap::new();
        let mut blocks = text.split("\n\n").flat_map(|b| b.split("\r\n\r\n"));
        let _header = blocks.next();
        for block in blocks {
            let mut lines = block.lines().map(str::trim).filter(|l| !l.is_empty());
            let Some(jar) = lines.next() else { continue };
            for package in lines {
                let jars = packages.entry(package.trim_end_matches('/').to_string()).or_default();
                if !jars.iter().any(|j| j == jar) {
                    jars.push(jar.to_string());
                }
            }
        }
        Self { packages }
    }

    /// Jars that may contain entry `name` (e.g. `com/foo/Bar.class`).
    pub fn jars_for(&self, name: &str) -> &[String] {
        let package = match name.rfind('/') {
            Some(i) => &name[..i],
            None => name,
        };
        self.packages.get(package).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_packages_to_jars() {
        let idx = JarIndex::parse(
            "JarIndex-Version: 1.0\n\nmain.jar\ncom/example\n\nextra.jar\ncom/example/extra\norg/lib/\n",
        );
        assert_eq!(idx.jars_for("com/example/Main.class"), ["main.jar"]);
        assert_eq!(idx.jars_for("org/lib/Thing.class"), ["extra.jar"]);
        assert!(idx.jars_for("net/Nope.class").is_empty());
    }
}
