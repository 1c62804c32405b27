//! On-disk cache: `<root>/<scheme>/<host>/<digest>/<file>` plus an
//! `entry.json` sidecar and a `.lock` file per slot.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use url::Url;

use super::lock::{EntryLock, LockTable};
use super::naming::{filename_from_url_path, sanitize_filename};
use super::{now_secs, CacheEntry, CacheStore};

const INFO_FILE: &str = "entry.json";
const LOCK_FILE: &str = ".lock";
const DEFAULT_NAME: &str = "resource.bin";

#[derive(Debug)]
pub struct DiskCache {
    root: PathBuf,
    locks: Arc<LockTable>,
    session_start: u64,
}

impl DiskCache {
    pub fn open(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)
            .with_context(|| format!("create cache root {}", root.display()))?;
        Ok(Self {
            root: root.to_path_buf(),
            locks: LockTable::new(),
            session_start: now_secs(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn slot_dir(&self, location: &Url, version: Option<&str>) -> PathBuf {
        let mut key = location.clone();
        key.set_fragment(None);
        let mut hasher = Sha256::new();
        hasher.update(key.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(version.unwrap_or("").as_bytes());
        let digest = hex::encode(hasher.finalize());
        let host = match (location.host_str(), location.port()) {
            (Some(h), Some(p)) => format!("{}_{}", h, p),
            (Some(h), None) => h.to_string(),
            (None, _) => "local".to_string(),
        };
        self.root
            .join(sanitize_filename(location.scheme()))
            .join(sanitize_filename(&host))
            .join(&digest[..16])
    }

    /// Every slot with a stored entry, for `netlaunch cache list`.
    pub fn entries(&self) -> Result<Vec<(CacheEntry, PathBuf)>> {
        let mut out = Vec::new();
        let mut stack = vec![self.root.clone()];
        while let Some(dir) = stack.pop() {
            let rd = match std::fs::read_dir(&dir) {
                Ok(rd) => rd,
                Err(_) => continue,
            };
            for item in rd.flatten() {
                let path = item.path();
                if path.is_dir() {
                    stack.push(path);
                } else if path.file_name().map_or(false, |n| n == INFO_FILE) {
                    let data = std::fs::read_to_string(&path)?;
                    if let Ok(entry) = serde_json::from_str::<CacheEntry>(&data) {
                        out.push((entry, dir.clone()));
                    }
                }
            }
        }
        out.sort_by(|a, b| a.0.location.cmp(&b.0.location));
        Ok(out)
    }

    /// Removes the whole cache directory tree.
    pub fn clear(&self) -> Result<()> {
        if self.root.exists() {
            std::fs::remove_dir_all(&self.root)
                .with_context(|| format!("remove {}", self.root.display()))?;
        }
        std::fs::create_dir_all(&self.root)?;
        Ok(())
    }
}

impl CacheStore for DiskCache {
    fn is_cacheable(&self, location: &Url, _version: Option<&str>) -> bool {
        !matches!(location.scheme(), "file" | "jar")
    }

    fn slot_path(&self, location: &Url, version: Option<&str>) -> PathBuf {
        let name = filename_from_url_path(location)
            .map(|n| sanitize_filename(&n))
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_NAME.to_string());
        self.slot_dir(location, version).join(name)
    }

    fn entry(&self, location: &Url, version: Option<&str>) -> Option<CacheEntry> {
        let path = self.slot_dir(location, version).join(INFO_FILE);
        let data = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&data).ok()
    }

    fn store_entry(&self, entry: &CacheEntry) -> Result<()> {
        let location = Url::parse(&entry.location).context("cache entry location")?;
        let dir = self.slot_dir(&location, entry.version.as_deref());
        std::fs::create_dir_all(&dir)?;
        let tmp = dir.join(format!("{}.tmp", INFO_FILE));
        std::fs::write(&tmp, serde_json::to_vec_pretty(entry)?)?;
        std::fs::rename(&tmp, dir.join(INFO_FILE))?;
        Ok(())
    }

    fn lock(&self, location: &Url, version: Option<&str>) -> Result<EntryLock> {
        self.locks
            .acquire(&self.slot_dir(location, version).join(LOCK_FILE))
    }

    fn session_start(&self) -> u64 {
        self.session_start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn file_urls_are_not_cacheable() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::open(dir.path()).unwrap();
        assert!(!cache.is_cacheable(&url("file:///opt/app.jar"), None));
        assert!(cache.is_cacheable(&url("https://example.com/app.jar"), None));
    }

    #[test]
    fn slots_differ_by_version_and_keep_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::open(dir.path()).unwrap();
        let loc = url("https://example.com:8443/lib/app.jar");
        let a = cache.slot_path(&loc, Some("1.0"));
        let b = cache.slot_path(&loc, Some("1.1"));
        assert_ne!(a, b);
        assert_eq!(a.file_name().unwrap(), "app.jar");
        assert!(a.starts_with(dir.path().join("https").join("example.com_8443")));
    }

    #[test]
    fn entry_roundtrip_and_listing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::open(dir.path()).unwrap();
        let loc = url("https://example.com/app.jar");
        assert!(cache.entry(&loc, None).is_none());

        let mut entry = CacheEntry::new(&loc, None);
        entry.etag = Some("abc".into());
        entry.size = Some(10);
        cache.store_entry(&entry).unwrap();
        assert_eq!(cache.entry(&loc, None), Some(entry.clone()));

        let listed = cache.entries().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].0, entry);

        cache.clear().unwrap();
        assert!(cache.entries().unwrap().is_empty());
    }

    #[test]
    fn writer_lands_in_slot() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::open(dir.path()).unwrap();
        let loc = url("https://example.com/app.jar");
        let _lock = cache.lock(&loc, None).unwrap();
        let mut w = cache.writer(&loc, None, Some(3)).unwrap();
        w.write_chunk(b"abc").unwrap();
        let slot = cache.slot_path(&loc, None);
        w.finalize(&slot).unwrap();
        assert_eq!(cache.cached_file(&loc, None), Some(slot));
    }
}
