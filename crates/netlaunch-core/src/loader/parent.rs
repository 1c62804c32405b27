//! The loader every resource graph delegates to before its own jars.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use url::Url;

use super::LoadedClass;
use crate::jar::{class_entry_name, JarFile};

pub trait ParentLoader: Send + Sync {
    fn load_class(&self, name: &str) -> Option<LoadedClass>;
    fn find_resource(&self, name: &str) -> Option<Url>;
}

/// Delegates nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyParent;

impl ParentLoader for EmptyParent {
    fn load_class(&self, _name: &str) -> Option<LoadedClass> {
        None
    }

    fn find_resource(&self, _name: &str) -> Option<Url> {
        None
    }
}

/// A fixed class path of local jars, searched in order.
#[derive(Debug, Default)]
pub struct JarParent {
    jars: Vec<(Url, JarFile)>,
}

impl JarParent {
    pub fn open<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut jars = Vec::new();
        for path in paths {
            let path = std::fs::canonicalize(path.as_ref())?;
            let url = Url::from_file_path(&path)
                .map_err(|_| anyhow::anyhow!("not an absolute path: {}", path.display()))?;
            jars.push((url, JarFile::open(&path)?));
        }
        Ok(Self { jars })
    }

    pub fn len(&self) -> usize {
        self.jars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jars.is_empty()
    }
}

impl ParentLoader for JarParent {
    fn load_class(&self, name: &str) -> Option<LoadedClass> {
        let entry = class_entry_name(name);
        self.jars.iter().find_map(|(url, jar)| {
            let bytes = jar.read(&entry).ok().flatten()?;
            Some(LoadedClass {
                name: name.to_string(),
                bytes: Arc::from(bytes),
                code_source: url.clone(),
                domain: None,
            })
        })
    }

    fn find_resource(&self, name: &str) -> Option<Url> {
        self.jars
            .iter()
            .find(|(_, jar)| jar.contains(name))
            .and_then(|(_, jar)| super::entry_url(jar.path(), name))
    }
}
