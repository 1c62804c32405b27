//! Concurrent download and cache coordination.
//!
//! A [`DownloadContext`] owns everything trackers share: the resource table,
//! the bounded worker pool, the cache and the HTTP settings. Any number of
//! [`ResourceTracker`]s (typically one per loader) register resources against
//! it; callers then block until the resources they need are resolved.

mod codec;
mod download;
mod negotiate;
mod pool;
mod select;

pub use codec::{gunzip_file, Encoding, ExternalUnpack200, Unpacker};
pub use negotiate::{candidate_urls, Negotiated};

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use url::Url;

use crate::cache::{CacheStore, UpdatePolicy};
use crate::config::NetlaunchConfig;
use crate::descriptor::{DownloadOptions, VersionString};
use crate::http::HttpClient;
use crate::resource::{normalize, Resource, ResourceKey, ResourceState, ResourceTable};
use crate::retry::RetryPolicy;
use pool::{Job, WorkerPool};

/// State shared by every tracker of one launch.
pub struct DownloadContext {
    pool: WorkerPool,
    resources: ResourceTable,
    cache: Arc<dyn CacheStore>,
    http: HttpClient,
    connect_timeout: Duration,
    transfer_timeout: Duration,
    unpacker: Option<Arc<dyn Unpacker>>,
    retry: RetryPolicy,
    allow_redirects: bool,
    update_policy: UpdatePolicy,
    next_tracker_id: AtomicU64,
}

impl DownloadContext {
    pub fn new(config: &NetlaunchConfig, cache: Arc<dyn CacheStore>) -> Self {
        let unpacker = config
            .unpack200
            .as_ref()
            .map(|p| Arc::new(ExternalUnpack200::new(p)) as Arc<dyn Unpacker>);
        Self {
            pool: WorkerPool::new(config.max_download_workers),
            resources: ResourceTable::new(),
            cache,
            http: HttpClient::new(
                config.connect_timeout(),
                config.transfer_timeout(),
                unpacker.is_some(),
            ),
            connect_timeout: config.connect_timeout(),
            transfer_timeout: config.transfer_timeout(),
            unpacker,
            retry: config.retry_policy(),
            allow_redirects: config.allow_redirects,
            update_policy: config.update_policy,
            next_tracker_id: AtomicU64::new(1),
        }
    }

    /// Replaces the configured unpacker; pack200 is advertised from now on.
    pub fn with_unpacker(mut self, unpacker: Arc<dyn Unpacker>) -> Self {
        self.unpacker = Some(unpacker);
        self.http = HttpClient::new(self.connect_timeout, self.transfer_timeout, true);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    /// Distinct `(location, version)` pairs seen by any tracker.
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Progress of every resource any tracker registered, without
    /// requesting work for any of them.
    pub fn progress_all(&self) -> Vec<(Url, Progress)> {
        let mut out: Vec<(Url, Progress)> = self
            .resources
            .all()
            .iter()
            .map(|r| {
                let s = r.snapshot();
                (
                    r.location().clone(),
                    Progress {
                        state: s.state,
                        transferred: s.transferred,
                        total: s.size,
                    },
                )
            })
            .collect();
        out.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
        out
    }
}

/// Transfer progress for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub state: ResourceState,
    pub transferred: u64,
    pub total: Option<u64>,
}

pub(crate) struct TrackerShared {
    pub(crate) id: u64,
    pub(crate) prefetch: bool,
    ctx: Arc<DownloadContext>,
    /// In registration order; at most one entry per `(location, version)`.
    resources: Mutex<Vec<Arc<Resource>>>,
}

impl TrackerShared {
    pub(crate) fn resources(&self) -> Vec<Arc<Resource>> {
        self.resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Per-loader view over a download context. Cheap to clone.
#[derive(Clone)]
pub struct ResourceTracker {
    shared: Arc<TrackerShared>,
}

impl ResourceTracker {
    /// A prefetching tracker lets idle workers start its resources before
    /// anyone waits for them.
    pub fn new(ctx: &Arc<DownloadContext>, prefetch: bool) -> Self {
        let shared = Arc::new(TrackerShared {
            id: ctx.next_tracker_id.fetch_add(1, Ordering::Relaxed),
            prefetch,
            ctx: Arc::clone(ctx),
            resources: Mutex::new(Vec::new()),
        });
        if prefetch {
            ctx.pool.lock().trackers.push(Arc::downgrade(&shared));
        }
        Self { shared }
    }

    pub fn context(&self) -> &Arc<DownloadContext> {
        &self.shared.ctx
    }

    /// Starts tracking `location` at `version`. Re-adding a tracked pair is
    /// a no-op; the same location at another version is a second resource.
    ///
    /// Resources with a usable cached copy (per `update_policy`, or the
    /// context default) and resources used in place are resolved on the spot
    /// without network access.
    pub fn add_resource(
        &self,
        location: &Url,
        version: Option<VersionString>,
        options: DownloadOptions,
        update_policy: Option<UpdatePolicy>,
    ) -> Result<()> {
        let ctx = &self.shared.ctx;
        let policy = update_policy.unwrap_or(ctx.update_policy);
        let key = ResourceKey::new(location, version.as_ref());
        let resource = {
            let mut tracked = self
                .shared
                .resources
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if tracked.iter().any(|r| r.key() == &key) {
                return Ok(());
            }
            let resource = ctx.resources.get_or_create(&key.location, version.as_ref());
            tracked.push(Arc::clone(&resource));
            resource
        };

        let resolved = self.check_cache(&resource, options, policy);
        if !resolved && self.shared.prefetch {
            let mut state = ctx.pool.lock();
            pool::ensure_worker(ctx, &mut state);
        }
        Ok(())
    }

    /// Fast path. Only an uninitialized resource is touched; a shared
    /// resource another tracker already resolved stays as it is.
    fn check_cache(&self, resource: &Arc<Resource>, options: DownloadOptions, policy: UpdatePolicy) -> bool {
        let cache = &self.shared.ctx.cache;
        let location = resource.location();
        let version = resource.version_str();
        let mut inner = resource.lock();
        if inner.state != ResourceState::Uninitialized {
            return inner.state.is_terminal();
        }
        inner.options = options;
        inner.update_policy = policy;

        if !cache.is_cacheable(location, version) {
            let size = location
                .to_file_path()
                .ok()
                .and_then(|p| fs::metadata(p).ok())
                .map(|m| m.len());
            inner.size = size;
            inner.transferred = size.unwrap_or(0);
            return resource
                .transition(&mut inner, ResourceState::Downloaded)
                .is_ok();
        }
        if policy == UpdatePolicy::Always {
            return false;
        }
        let Some(file) = cache.cached_file(location, version) else {
            return false;
        };
        let entry = cache.entry(location, version);
        let usable = match (&entry, policy) {
            (_, UpdatePolicy::Never) => true,
            (Some(e), p) => !p.should_update(e, cache.session_start()),
            (None, _) => false,
        };
        if !usable {
            return false;
        }
        let size = entry
            .and_then(|e| e.size)
            .or_else(|| fs::metadata(&file).ok().map(|m| m.len()));
        tracing::debug!(resource = %location, "using cached copy");
        inner.local_file = Some(file);
        inner.size = size;
        inner.transferred = size.unwrap_or(0);
        resource
            .transition(&mut inner, ResourceState::Downloaded)
            .is_ok()
    }

    /// Stops tracking every version of `location`. The shared resources
    /// themselves are unaffected.
    pub fn remove_resource(&self, location: &Url) -> bool {
        let location = normalize(location);
        let mut tracked = self
            .shared
            .resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = tracked.len();
        tracked.retain(|r| r.location() != &location);
        tracked.len() != before
    }

    pub fn is_tracked(&self, location: &Url) -> bool {
        let location = normalize(location);
        self.shared
            .resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|r| r.location() == &location)
    }

    /// Number of `(location, version)` pairs this tracker tracks.
    pub fn len(&self) -> usize {
        self.shared
            .resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First registered resource at `location`, whatever its version.
    fn lookup(&self, location: &Url) -> Result<Arc<Resource>> {
        let key = normalize(location);
        self.shared
            .resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|r| r.location() == &key)
            .cloned()
            .ok_or_else(|| anyhow!("{} is not tracked", location))
    }

    /// Requests work for `resource`: a connect when uninitialized, a body
    /// transfer when `download` is set and it is only connected.
    fn start(&self, resource: &Arc<Resource>, download: bool) {
        let ctx = &self.shared.ctx;
        let mut state = ctx.pool.lock();
        let queue = {
            let mut inner = resource.lock();
            match inner.state {
                ResourceState::Uninitialized => {
                    inner.download_requested |= download;
                    resource
                        .transition(&mut inner, ResourceState::ConnectPending)
                        .is_ok()
                }
                ResourceState::ConnectPending | ResourceState::Connecting => {
                    inner.download_requested |= download;
                    false
                }
                ResourceState::Connected if download => {
                    inner.download_requested = true;
                    resource
                        .transition(&mut inner, ResourceState::DownloadPending)
                        .is_ok()
                }
                _ => false,
            }
        };
        if queue {
            pool::enqueue(
                ctx,
                &mut state,
                Job {
                    tracker: self.shared.id,
                    resource: Arc::clone(resource),
                },
            );
        }
    }

    /// Starts every listed resource, then blocks until all are DOWNLOADED or
    /// ERROR. Returns `Ok(false)` only when `timeout` elapsed first.
    pub fn wait_for_resources(&self, locations: &[Url], timeout: Option<Duration>) -> Result<bool> {
        let resources = locations
            .iter()
            .map(|l| self.lookup(l))
            .collect::<Result<Vec<_>>>()?;
        for r in &resources {
            self.start(r, true);
        }
        let deadline = timeout.map(|t| Instant::now() + t);
        for r in &resources {
            if !r.wait_terminal(deadline) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn wait_for_resource(&self, location: &Url, timeout: Option<Duration>) -> Result<bool> {
        self.wait_for_resources(std::slice::from_ref(location), timeout)
    }

    /// Local file for a tracked resource, downloading it first if needed.
    ///
    /// `None` when the resource ended in ERROR, or is used in place and is
    /// not a local file.
    pub fn cache_file(&self, location: &Url) -> Result<Option<PathBuf>> {
        let resource = self.lookup(location)?;
        self.start(&resource, true);
        resource.wait_terminal(None);
        let inner = resource.lock();
        if inner.state == ResourceState::Error {
            return Ok(None);
        }
        if let Some(file) = &inner.local_file {
            return Ok(Some(file.clone()));
        }
        if location.scheme() == "file" {
            if let Ok(path) = location.to_file_path() {
                if path.exists() {
                    return Ok(Some(path));
                }
            }
        }
        Ok(None)
    }

    /// Content length reported by the server. Only negotiates; the body is
    /// not transferred unless something else requests it.
    pub fn total_size(&self, location: &Url) -> Result<Option<u64>> {
        let resource = self.lookup(location)?;
        self.start(&resource, false);
        resource.wait_until(None, |s| s.is_connected());
        let size = resource.lock().size;
        Ok(size)
    }

    pub fn progress(&self, location: &Url) -> Result<Progress> {
        let snapshot = self.lookup(location)?.snapshot();
        Ok(Progress {
            state: snapshot.state,
            transferred: snapshot.transferred,
            total: snapshot.size,
        })
    }

    pub fn resource_state(&self, location: &Url) -> Option<ResourceState> {
        self.lookup(location).ok().map(|r| r.state())
    }

    /// True once the resource reached DOWNLOADED or ERROR.
    pub fn is_resolved(&self, location: &Url) -> bool {
        self.resource_state(location)
            .map_or(false, ResourceState::is_terminal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DiskCache;

    fn context(dir: &std::path::Path) -> Arc<DownloadContext> {
        let cache = Arc::new(DiskCache::open(dir).unwrap());
        let config = NetlaunchConfig::default();
        Arc::new(DownloadContext::new(&config, cache).with_retry(RetryPolicy::single_attempt()))
    }

    #[test]
    fn file_urls_resolve_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("local.jar");
        fs::write(&jar, b"PK").unwrap();
        let url = Url::from_file_path(&jar).unwrap();
        let ctx = context(&dir.path().join("cache"));
        let tracker = ResourceTracker::new(&ctx, false);
        tracker
            .add_resource(&url, None, DownloadOptions::default(), None)
            .unwrap();
        assert_eq!(tracker.resource_state(&url), Some(ResourceState::Downloaded));
        assert_eq!(tracker.cache_file(&url).unwrap(), Some(jar));
        assert_eq!(tracker.progress(&url).unwrap().total, Some(2));
        let all = ctx.progress_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].0, url);
        assert_eq!(all[0].1.transferred, 2);
    }

    #[test]
    fn re_adding_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let tracker = ResourceTracker::new(&ctx, false);
        let url = Url::parse("http://127.0.0.1:9/app.jar").unwrap();
        tracker
            .add_resource(&url, None, DownloadOptions::default(), None)
            .unwrap();
        tracker
            .add_resource(&url, None, DownloadOptions::default(), None)
            .unwrap();
        assert_eq!(tracker.len(), 1);
        assert_eq!(ctx.resource_count(), 1);
        assert_eq!(tracker.resource_state(&url), Some(ResourceState::Uninitialized));
    }

    #[test]
    fn versions_of_one_location_are_distinct_resources() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let tracker = ResourceTracker::new(&ctx, false);
        let url = Url::parse("http://127.0.0.1:9/lib.jar").unwrap();
        let v1 = VersionString::parse("1.0").unwrap();
        let v2 = VersionString::parse("2.0+").unwrap();
        for version in [Some(v1.clone()), Some(v2), Some(v1)] {
            tracker
                .add_resource(&url, version, DownloadOptions::default(), None)
                .unwrap();
        }
        assert_eq!(tracker.len(), 2);
        assert_eq!(ctx.resource_count(), 2);
        assert!(tracker.is_tracked(&url));

        assert!(tracker.remove_resource(&url));
        assert!(tracker.is_empty());
        assert_eq!(ctx.resource_count(), 2, "shared resources outlive the tracker entry");
    }

    #[test]
    fn fast_path_uses_cached_copy_with_never_policy() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let url = Url::parse("http://127.0.0.1:9/app.jar").unwrap();
        let slot = ctx.cache().slot_path(&url, None);
        fs::create_dir_all(slot.parent().unwrap()).unwrap();
        fs::write(&slot, b"cached").unwrap();

        let tracker = ResourceTracker::new(&ctx, false);
        tracker
            .add_resource(&url, None, DownloadOptions::default(), Some(UpdatePolicy::Never))
            .unwrap();
        assert!(tracker.is_resolved(&url));
        assert_eq!(tracker.cache_file(&url).unwrap(), Some(slot));
    }

    #[test]
    fn untracked_location_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = ResourceTracker::new(&context(dir.path()), false);
        let url = Url::parse("http://127.0.0.1:9/none.jar").unwrap();
        assert!(tracker.cache_file(&url).is_err());
        assert!(tracker.wait_for_resources(&[url], None).is_err());
    }

    #[test]
    fn unreachable_resource_ends_in_error() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = ResourceTracker::new(&context(dir.path()), false);
        // Port 9 (discard) is closed on test machines; connect fails fast.
        let url = Url::parse("http://127.0.0.1:9/missing.jar").unwrap();
        tracker
            .add_resource(&url, None, DownloadOptions::default(), None)
            .unwrap();
        assert!(tracker
            .wait_for_resources(&[url.clone()], Some(Duration::from_secs(30)))
            .unwrap());
        assert_eq!(tracker.resource_state(&url), Some(ResourceState::Error));
        assert_eq!(tracker.cache_file(&url).unwrap(), None);
    }
}
