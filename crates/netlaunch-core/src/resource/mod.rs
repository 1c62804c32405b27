//! Tracked download units.
//!
//! One [`Resource`] exists per normalized `(location, version)` pair and is
//! shared by every tracker that registers the pair. Its state lives behind a
//! per-resource mutex; every change wakes all waiters on the resource's
//! condition variable.

mod state;

pub use state::{ResourceState, TransitionError};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use url::Url;

use crate::cache::UpdatePolicy;
use crate::descriptor::{DownloadOptions, VersionString};

/// Identity of a resource: normalized location plus requested version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    pub location: Url,
    pub version: Option<String>,
}

impl ResourceKey {
    pub fn new(location: &Url, version: Option<&VersionString>) -> Self {
        Self {
            location: normalize(location),
            version: version.map(|v| v.as_str().to_string()),
        }
    }
}

/// Drops fragments and empty queries; `Url` already lowercases the host,
/// strips default ports and resolves dot segments.
pub fn normalize(location: &Url) -> Url {
    let mut u = location.clone();
    u.set_fragment(None);
    if u.query() == Some("") {
        u.set_query(None);
    }
    u
}

/// Mutable part of a resource, guarded by the resource lock.
#[derive(Debug)]
pub struct ResourceInner {
    pub state: ResourceState,
    /// Body transfer was requested (not just a connect).
    pub download_requested: bool,
    pub options: DownloadOptions,
    pub update_policy: UpdatePolicy,
    /// Version the server reported, when it differs from the request.
    pub download_version: Option<String>,
    pub size: Option<u64>,
    pub transferred: u64,
    pub local_file: Option<PathBuf>,
    pub download_url: Option<Url>,
    pub content_encoding: Option<String>,
}

#[derive(Debug)]
pub struct Resource {
    key: ResourceKey,
    requested: Option<VersionString>,
    inner: Mutex<ResourceInner>,
    changed: Condvar,
}

/// Point-in-time copy of a resource's progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSnapshot {
    pub state: ResourceState,
    pub size: Option<u64>,
    pub transferred: u64,
    pub local_file: Option<PathBuf>,
}

impl Resource {
    fn new(key: ResourceKey, requested: Option<VersionString>) -> Self {
        Self {
            key,
            requested,
            inner: Mutex::new(ResourceInner {
                state: ResourceState::Uninitialized,
                download_requested: false,
                options: DownloadOptions::default(),
                update_policy: UpdatePolicy::default(),
                download_version: None,
                size: None,
                transferred: 0,
                local_file: None,
                download_url: None,
                content_encoding: None,
            }),
            changed: Condvar::new(),
        }
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    pub fn location(&self) -> &Url {
        &self.key.location
    }

    pub fn requested_version(&self) -> Option<&VersionString> {
        self.requested.as_ref()
    }

    pub fn version_str(&self) -> Option<&str> {
        self.key.version.as_deref()
    }

    pub fn lock(&self) -> MutexGuard<'_, ResourceInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ResourceState {
        self.lock().state
    }

    pub fn snapshot(&self) -> ResourceSnapshot {
        let inner = self.lock();
        ResourceSnapshot {
            state: inner.state,
            size: inner.size,
            transferred: inner.transferred,
            local_file: inner.local_file.clone(),
        }
    }

    /// Applies a legal transition and wakes all waiters.
    pub fn transition(
        &self,
        inner: &mut ResourceInner,
        to: ResourceState,
    ) -> Result<(), TransitionError> {
        let from = inner.state;
        inner.state = from.transition(to)?;
        tracing::debug!(resource = %self.key.location, %from, %to, "resource state");
        self.changed.notify_all();
        Ok(())
    }

    /// Moves to `to` under the resource lock.
    pub fn set_state(&self, to: ResourceState) -> Result<(), TransitionError> {
        let mut inner = self.lock();
        self.transition(&mut inner, to)
    }

    /// Marks the resource failed unless it already reached a terminal state.
    pub fn fail(&self, reason: &dyn std::fmt::Display) {
        let mut inner = self.lock();
        if inner.state.is_terminal() {
            return;
        }
        tracing::warn!(resource = %self.key.location, "resource failed: {}", reason);
        let _ = self.transition(&mut inner, ResourceState::Error);
    }

    /// Wakes waiters after a progress-only update.
    pub fn notify(&self) {
        self.changed.notify_all();
    }

    /// Blocks until the resource is DOWNLOADED or ERROR, or `deadline`
    /// passes. Returns false only on timeout.
    pub fn wait_terminal(&self, deadline: Option<Instant>) -> bool {
        self.wait_until(deadline, |s| s.is_terminal())
    }

    /// Blocks until `done(state)` holds or `deadline` passes.
    pub fn wait_until<F>(&self, deadline: Option<Instant>, done: F) -> bool
    where
        F: Fn(ResourceState) -> bool,
    {
        let mut inner = self.lock();
        loop {
            if done(inner.state) || inner.state.is_terminal() {
                return true;
            }
            match deadline {
                None => {
                    inner = self
                        .changed
                        .wait(inner)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return false;
                    }
                    inner = self
                        .changed
                        .wait_timeout(inner, d - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
    }
}

/// All resources known to one download context.
#[derive(Debug, Default)]
pub struct ResourceTable {
    resources: Mutex<HashMap<ResourceKey, Arc<Resource>>>,
}

impl ResourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the shared resource for the pair, creating it on first use.
    pub fn get_or_create(&self, location: &Url, version: Option<&VersionString>) -> Arc<Resource> {
        let key = ResourceKey::new(location, version);
        let mut map = self.resources.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            map.entry(key.clone())
                .or_insert_with(|| Arc::new(Resource::new(key, version.cloned()))),
        )
    }

    pub fn all(&self) -> Vec<Arc<Resource>> {
        self.resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn identity_is_normalized_location_and_version() {
        let table = ResourceTable::new();
        let a = table.get_or_create(&url("HTTP://Example.com:80/lib/./app.jar#frag"), None);
        let b = table.get_or_create(&url("http://example.com/lib/app.jar"), None);
        assert!(Arc::ptr_eq(&a, &b));

        let v = VersionString::parse("1.0").unwrap();
        let c = table.get_or_create(&url("http://example.com/lib/app.jar"), Some(&v));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn waiters_see_terminal_state() {
        let table = ResourceTable::new();
        let r = table.get_or_create(&url("http://example.com/a.jar"), None);
        let waiter = {
            let r = Arc::clone(&r);
            std::thread::spawn(move || r.wait_terminal(None))
        };
        std::thread::sleep(Duration::from_millis(20));
        r.set_state(ResourceState::ConnectPending).unwrap();
        r.fail(&"boom");
        assert!(waiter.join().unwrap());
        assert_eq!(r.state(), ResourceState::Error);
    }

    #[test]
    fn error_is_sticky() {
        let table = ResourceTable::new();
        let r = table.get_or_create(&url("http://example.com/a.jar"), None);
        r.fail(&"first");
        assert!(r.set_state(ResourceState::ConnectPending).is_err());
        r.fail(&"second");
        assert_eq!(r.state(), ResourceState::Error);
    }

    #[test]
    fn wait_times_out() {
        let table = ResourceTable::new();
        let r = table.get_or_create(&url("http://example.com/a.jar"), None);
        let deadline = Instant::now() + Duration::from_millis(20);
        assert!(!r.wait_terminal(Some(deadline)));
    }
}
