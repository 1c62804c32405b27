//! Per-loader extraction directories and their teardown.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use tempfile::TempDir;

/// Extraction directories that must not outlive the launch.
#[derive(Debug, Default)]
pub struct Teardown {
    dirs: Mutex<Vec<PathBuf>>,
}

impl Teardown {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, dir: PathBuf) {
        self.dirs.lock().unwrap_or_else(PoisonError::into_inner).push(dir);
    }

    pub fn forget(&self, dir: &Path) {
        self.dirs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|d| d != dir);
    }

    pub fn pending(&self) -> Vec<PathBuf> {
        self.dirs.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Removes every registered directory.
    pub fn run(&self) {
        let dirs = std::mem::take(&mut *self.dirs.lock().unwrap_or_else(PoisonError::into_inner));
        for dir in dirs {
            match std::fs::remove_dir_all(&dir) {
                Ok(()) => tracing::debug!(dir = %dir.display(), "removed extraction dir"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(dir = %dir.display(), "cannot remove extraction dir: {}", e),
            }
        }
    }
}

/// Created on first use under `root`.
#[derive(Debug)]
pub struct NativeDir {
    root: PathBuf,
    dir: Mutex<Option<TempDir>>,
    /// Directories taken over from merged loaders.
    adopted: Mutex<Vec<TempDir>>,
    teardown: Arc<Teardown>,
}

impl NativeDir {
    pub fn new(root: PathBuf, teardown: Arc<Teardown>) -> Self {
        Self {
            root,
            dir: Mutex::new(None),
            adopted: Mutex::new(Vec::new()),
            teardown,
        }
    }

    pub fn path(&self) -> Result<PathBuf> {
        let mut dir = self.dir.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(d) = dir.as_ref() {
            return Ok(d.path().to_path_buf());
        }
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("create {}", self.root.display()))?;
        let created = tempfile::Builder::new()
            .prefix("natives-")
            .tempdir_in(&self.root)
            .with_context(|| format!("create extraction dir in {}", self.root.display()))?;
        let path = created.path().to_path_buf();
        self.teardown.register(path.clone());
        *dir = Some(created);
        Ok(path)
    }

    pub fn existing(&self) -> Option<PathBuf> {
        self.dir
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|d| d.path().to_path_buf())
    }

    /// Own directory first, then adopted ones.
    pub fn dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self.existing().into_iter().collect();
        dirs.extend(
            self.adopted
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .map(|d| d.path().to_path_buf()),
        );
        dirs
    }

    /// Takes ownership of everything `other` extracted.
    pub fn adopt(&self, other: &NativeDir) {
        let mut taken: Vec<TempDir> = other
            .dir
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .into_iter()
            .collect();
        taken.append(&mut other.adopted.lock().unwrap_or_else(PoisonError::into_inner));
        self.adopted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(taken);
    }

    /// Deletes every directory now.
    pub fn release(&self) {
        let mut dirs: Vec<TempDir> = self
            .dir
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .into_iter()
            .collect();
        dirs.append(&mut self.adopted.lock().unwrap_or_else(PoisonError::into_inner));
        for dir in dirs {
            self.teardown.forget(dir.path());
            if let Err(e) = dir.close() {
                tracing::warn!("cannot remove extraction dir: {}", e);
            }
        }
    }
}
