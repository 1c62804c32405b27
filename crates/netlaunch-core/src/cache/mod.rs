//! Local resource cache.
//!
//! The tracker only talks to [`CacheStore`]: cacheability, the slot path for
//! a `(location, version)` pair, the currency metadata stored beside it, and
//! an exclusive per-slot lock held for the duration of a download.

mod disk;
mod lock;
mod naming;
mod writer;

pub use disk::DiskCache;
pub use lock::{EntryLock, LockTable};
pub use naming::{filename_from_url_path, sanitize_filename};
pub use writer::{temp_path, SlotWriter, SlotWriterBuilder};

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::http::ResponseMeta;

/// When a cached copy may be used without asking the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdatePolicy {
    /// Always re-validate with the server before use.
    Always,
    /// Re-validate once per process session.
    #[default]
    Session,
    /// Use any cached copy as-is.
    Never,
}

impl UpdatePolicy {
    /// Whether `entry` must be re-validated before it can be used.
    pub fn should_update(&self, entry: &CacheEntry, session_start: u64) -> bool {
        match self {
            UpdatePolicy::Always => true,
            UpdatePolicy::Never => false,
            UpdatePolicy::Session => entry.last_checked.map_or(true, |t| t < session_start),
        }
    }
}

/// Currency metadata stored beside a cached file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub location: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub last_modified: Option<String>,
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    /// Unix seconds of the last successful server validation.
    #[serde(default)]
    pub last_checked: Option<u64>,
}

impl CacheEntry {
    pub fn new(location: &Url, version: Option<&str>) -> Self {
        Self {
            location: location.to_string(),
            version: version.map(str::to_string),
            ..Self::default()
        }
    }

    /// Compares stored validators with a fresh response. An entry with no
    /// comparable validator is never current.
    pub fn is_current(&self, remote: &ResponseMeta) -> bool {
        if let (Some(ours), Some(theirs)) = (&self.etag, &remote.etag) {
            return ours == theirs;
        }
        if let (Some(ours), Some(theirs)) = (&self.last_modified, &remote.last_modified) {
            return ours == theirs;
        }
        false
    }

    pub fn record_response(&mut self, remote: &ResponseMeta) {
        self.last_modified = remote.last_modified.clone();
        self.etag = remote.etag.clone();
        self.last_checked = Some(now_secs());
    }

    pub fn mark_checked(&mut self) {
        self.last_checked = Some(now_secs());
    }
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Cache collaborator consumed by the resource tracker.
pub trait CacheStore: Send + Sync {
    /// `file:` and `jar:` locations are used in place, never cached.
    fn is_cacheable(&self, location: &Url, version: Option<&str>) -> bool;

    /// Final path of the slot for this pair, whether or not it exists yet.
    fn slot_path(&self, location: &Url, version: Option<&str>) -> PathBuf;

    fn cached_file(&self, location: &Url, version: Option<&str>) -> Option<PathBuf> {
        let path = self.slot_path(location, version);
        path.is_file().then_some(path)
    }

    fn entry(&self, location: &Url, version: Option<&str>) -> Option<CacheEntry>;

    fn store_entry(&self, entry: &CacheEntry) -> Result<()>;

    /// Exclusive lock on the slot; blocks until available.
    fn lock(&self, location: &Url, version: Option<&str>) -> Result<EntryLock>;

    /// Unix seconds when this cache instance was opened.
    fn session_start(&self) -> u64;

    /// Writer for a new slot body (temp file, renamed into place on finalize).
    fn writer(&self, location: &Url, version: Option<&str>, size_hint: Option<u64>) -> Result<SlotWriter> {
        let slot = self.slot_path(location, version);
        if let Some(parent) = slot.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut builder = SlotWriterBuilder::create(&temp_path(&slot))?;
        if let Some(size) = size_hint {
            builder.preallocate(size)?;
        }
        Ok(builder.build())
    }
}
