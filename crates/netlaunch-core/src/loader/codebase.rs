//! Applet-style lookups directly under the codebase URL.

use std::path::PathBuf;

use url::Url;

use crate::cache::UpdatePolicy;
use crate::descriptor::DownloadOptions;
use crate::security::{self, Permission};
use crate::tracker::ResourceTracker;

/// Fetches individual files relative to a codebase. Every lookup costs a
/// network round trip, so loaders consult it last.
pub struct CodebaseLoader {
    codebase: Url,
    tracker: ResourceTracker,
}

impl CodebaseLoader {
    pub fn new(codebase: Url, tracker: ResourceTracker) -> Self {
        Self { codebase, tracker }
    }

    pub fn codebase(&self) -> &Url {
        &self.codebase
    }

    /// Location and local copy of `name`, or `None` when the codebase does
    /// not serve it or the active capability set forbids connecting.
    pub fn fetch(&self, name: &str) -> Option<(Url, PathBuf)> {
        let url = self.codebase.join(name).ok()?;
        if let Some(host) = url.host_str() {
            if let Err(denied) = security::check(&Permission::connect(host)) {
                tracing::warn!(resource = %url, "codebase lookup refused: {}", denied);
                return None;
            }
        }
        if let Err(e) = self.tracker.add_resource(
            &url,
            None,
            DownloadOptions::default(),
            Some(UpdatePolicy::Always),
        ) {
            tracing::debug!(resource = %url, "codebase lookup failed: {:#}", e);
            return None;
        }
        match self.tracker.cache_file(&url) {
            Ok(Some(path)) => Some((url, path)),
            Ok(None) => None,
            Err(e) => {
                tracing::debug!(resource = %url, "codebase lookup failed: {:#}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DiskCache;
    use crate::config::NetlaunchConfig;
    use crate::retry::RetryPolicy;
    use crate::security::{with_capability, PermissionSet};
    use crate::tracker::DownloadContext;
    use std::sync::Arc;

    fn loader(codebase: &str, dir: &std::path::Path) -> CodebaseLoader {
        let cache = Arc::new(DiskCache::open(dir).unwrap());
        let ctx = Arc::new(
            DownloadContext::new(&NetlaunchConfig::default(), cache)
                .with_retry(RetryPolicy::single_attempt()),
        );
        CodebaseLoader::new(Url::parse(codebase).unwrap(), ResourceTracker::new(&ctx, false))
    }

    #[test]
    fn connect_permission_is_checked_first() {
        let dir = tempfile::tempdir().unwrap();
        let loader = loader("https://applets.example.com/demo/", dir.path());
        let sandbox = Arc::new(PermissionSet::sandbox(Some("other.example.com")));
        let hit = with_capability(sandbox, || loader.fetch("demo/Applet.class"));
        assert!(hit.is_none());
        assert!(!loader.tracker.is_tracked(&Url::parse("https://applets.example.com/demo/demo/Applet.class").unwrap()));
    }

    #[test]
    fn local_codebase_serves_files() {
        let dir = tempfile::tempdir().unwrap();
        let served = dir.path().join("served");
        std::fs::create_dir_all(served.join("p")).unwrap();
        std::fs::write(served.join("p/data.txt"), b"hello").unwrap();
        let codebase = format!("{}/", Url::from_file_path(&served).unwrap());
        let loader = loader(&codebase, &dir.path().join("cache"));
        let (url, path) = loader.fetch("p/data.txt").unwrap();
        assert!(url.as_str().ends_with("/p/data.txt"));
        assert_eq!(std::fs::read(path).unwrap(), b"hello");
        assert!(loader.fetch("p/missing.txt").is_none());
    }
}
