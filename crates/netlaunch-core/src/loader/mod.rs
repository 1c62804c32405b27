//! Class and resource resolution over a descriptor's jar graph.
//!
//! A [`ResourceGraphLoader`] owns the jars of one descriptor and delegates
//! to the loaders of its extensions (its peers). Lookups walk, in order:
//!
//! 1. classes already defined by this loader or a peer,
//! 2. the parent loader,
//! 3. activated jars of this loader and its peers,
//! 4. pending manifest `Class-Path` entries (activated, then retried),
//! 5. `INDEX.LIST` hints naming a not yet activated jar,
//! 6. the next available jar and the rest of its part,
//!
//! and finally, for applets, the codebase itself.

mod codebase;
mod context;
mod init;
mod jnlp_match;
mod natives;
mod nested;
mod parent;
mod registry;

pub use codebase::CodebaseLoader;
pub use context::{LaunchContext, LaunchContextBuilder};
pub use jnlp_match::{matches_exact, matches_template};
pub use natives::{NativeDir, Teardown};
pub use nested::nested_location;
pub use parent::{EmptyParent, JarParent, ParentLoader};
pub use registry::{LoaderKey, LoaderRegistry};

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};

use anyhow::{anyhow, Result};
use url::Url;

use crate::cache::UpdatePolicy;
use crate::descriptor::{DescriptorKind, DescriptorSource, JarDesc, JnlpDescriptor};
use crate::error::LoadError;
use crate::jar::{class_entry_name, is_native_library, native_file_names, JarFile, JarIndex};
use crate::security::{CodeSource, DomainMap, SecurityDomain, SecurityPolicyBuilder, SecurityType};
use crate::tracker::{DownloadContext, ResourceTracker};
use crate::verify::{JarStatus, SignatureVerifier, SignerExtractor, TrustStore, VerifierResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    Initializing,
    ResourcesLoading,
    Verifying,
    Active,
}

/// Bytes of a class together with where they came from.
#[derive(Debug, Clone)]
pub struct LoadedClass {
    pub name: String,
    pub bytes: Arc<[u8]>,
    pub code_source: Url,
    /// `None` for classes from the parent loader.
    pub domain: Option<Arc<SecurityDomain>>,
}

/// `jar:file:///...!/name`.
pub(crate) fn entry_url(jar: &Path, name: &str) -> Option<Url> {
    let file = Url::from_file_path(jar).ok()?;
    Url::parse(&format!("jar:{}!/{}", file, name)).ok()
}

/// Services shared by every loader of one launch.
pub(crate) struct LoaderEnv {
    pub downloads: Arc<DownloadContext>,
    pub extractor: Arc<dyn SignerExtractor>,
    pub trust: Arc<TrustStore>,
    pub security: SecurityPolicyBuilder,
    pub parent: Arc<dyn ParentLoader>,
    pub descriptors: Arc<dyn DescriptorSource>,
    pub native_root: PathBuf,
    pub teardown: Arc<Teardown>,
}

#[derive(Clone)]
struct ActiveJar {
    location: Url,
    jar: Arc<JarFile>,
    part: Option<String>,
    native: bool,
}

#[derive(Default)]
struct Classpath {
    active: Vec<ActiveJar>,
    /// Declared but not yet activated, in descriptor order.
    available: Vec<JarDesc>,
    class_path_pending: Vec<Url>,
    /// Every location ever registered with this loader.
    seen: HashSet<Url>,
    indexes: Vec<(Url, JarIndex)>,
    classes: HashMap<String, LoadedClass>,
    /// Activation rounds taken from this classpath and not yet finished.
    in_flight: usize,
}

impl Classpath {
    /// Marks `descs` as taken for activation. Every non-empty claim is
    /// settled by `ResourceGraphLoader::activate`.
    fn claim(&mut self, descs: Vec<JarDesc>) -> Vec<JarDesc> {
        if !descs.is_empty() {
            self.in_flight += 1;
        }
        descs
    }

    /// Removes `available[index]` and every other jar of its part.
    fn take_part(&mut self, index: usize) -> Vec<JarDesc> {
        let first = self.available.remove(index);
        let mut taken = vec![first];
        if let Some(part) = taken[0].part.clone() {
            let (same, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.available)
                .into_iter()
                .partition(|d| d.part.as_deref() == Some(part.as_str()));
            self.available = rest;
            taken.extend(same);
        }
        self.claim(taken)
    }
}

pub struct ResourceGraphLoader {
    key: LoaderKey,
    desc: Arc<JnlpDescriptor>,
    env: Arc<LoaderEnv>,
    tracker: ResourceTracker,
    state: RwLock<LoaderState>,
    granted: RwLock<SecurityType>,
    /// Signer keys the launch decision was made for.
    approved: RwLock<BTreeSet<String>>,
    classpath: Mutex<Classpath>,
    settled: Condvar,
    verifier: Mutex<SignatureVerifier>,
    peers: RwLock<Vec<Arc<ResourceGraphLoader>>>,
    domains: DomainMap,
    codebase: Option<CodebaseLoader>,
    natives: NativeDir,
    activations: AtomicUsize,
}

impl ResourceGraphLoader {
    pub(crate) fn new(env: &Arc<LoaderEnv>, key: LoaderKey, desc: JnlpDescriptor) -> Arc<Self> {
        let tracker = ResourceTracker::new(&env.downloads, true);
        let codebase = match (&desc.kind, &desc.codebase) {
            (DescriptorKind::Applet, Some(cb)) => {
                Some(CodebaseLoader::new(cb.clone(), tracker.clone()))
            }
            _ => None,
        };
        Arc::new(Self {
            key,
            desc: Arc::new(desc),
            env: Arc::clone(env),
            tracker,
            state: RwLock::new(LoaderState::Initializing),
            granted: RwLock::new(SecurityType::Sandbox),
            approved: RwLock::new(BTreeSet::new()),
            classpath: Mutex::new(Classpath::default()),
            settled: Condvar::new(),
            verifier: Mutex::new(SignatureVerifier::new(
                Arc::clone(&env.extractor),
                Arc::clone(&env.trust),
            )),
            peers: RwLock::new(Vec::new()),
            domains: DomainMap::new(),
            codebase,
            natives: NativeDir::new(env.native_root.clone(), Arc::clone(&env.teardown)),
            activations: AtomicUsize::new(0),
        })
    }

    pub fn key(&self) -> &LoaderKey {
        &self.key
    }

    pub fn descriptor(&self) -> &Arc<JnlpDescriptor> {
        &self.desc
    }

    pub fn tracker(&self) -> &ResourceTracker {
        &self.tracker
    }

    pub fn state(&self) -> LoaderState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: LoaderState) {
        tracing::debug!(loader = %self.key.unique_key, ?state, "loader state");
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Level granted to this loader's signed jars.
    pub fn security_type(&self) -> SecurityType {
        *self.granted.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_security_type(&self, granted: SecurityType) {
        *self.granted.write().unwrap_or_else(PoisonError::into_inner) = granted;
    }

    /// Records the signers `security_type` was granted for. Jars signed by
    /// anyone else stay sandboxed.
    fn approve_signers(&self, keys: BTreeSet<String>) {
        *self.approved.write().unwrap_or_else(PoisonError::into_inner) = keys;
    }

    fn is_approved(&self, signers: &[String]) -> bool {
        let approved = self.approved.read().unwrap_or_else(PoisonError::into_inner);
        signers.iter().any(|k| approved.contains(k))
    }

    /// Number of lazy activation rounds (initial set included).
    pub fn activation_count(&self) -> usize {
        self.activations.load(Ordering::Relaxed)
    }

    /// Distinct extension loaders, in acquisition order.
    pub fn peers(&self) -> Vec<Arc<ResourceGraphLoader>> {
        let held = self.peers.read().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<Arc<ResourceGraphLoader>> = Vec::with_capacity(held.len());
        for peer in held.iter() {
            if !out.iter().any(|p| Arc::ptr_eq(p, peer)) {
                out.push(Arc::clone(peer));
            }
        }
        out
    }

    /// Records one acquisition of `peer`. The same loader may be held more
    /// than once; each entry is released on discard.
    fn add_peer(&self, peer: Arc<ResourceGraphLoader>) {
        self.peers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(peer);
    }

    /// Every held acquisition, duplicates included.
    fn take_peers(&self) -> Vec<Arc<ResourceGraphLoader>> {
        std::mem::take(&mut *self.peers.write().unwrap_or_else(PoisonError::into_inner))
    }

    fn classpath(&self) -> MutexGuard<'_, Classpath> {
        self.classpath.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn verifier(&self) -> MutexGuard<'_, SignatureVerifier> {
        self.verifier.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn verifier_result(&self) -> VerifierResult {
        self.verifier().result()
    }

    /// This loader followed by every loader reachable through peers.
    fn chain(self: &Arc<Self>) -> Vec<Arc<Self>> {
        let mut out = vec![Arc::clone(self)];
        let mut i = 0;
        while i < out.len() {
            for peer in out[i].peers() {
                if !out.iter().any(|l| Arc::ptr_eq(l, &peer)) {
                    out.push(peer);
                }
            }
            i += 1;
        }
        out
    }

    pub fn active_jars(&self) -> Vec<Url> {
        self.classpath().active.iter().map(|j| j.location.clone()).collect()
    }

    pub fn available_jars(&self) -> Vec<Url> {
        self.classpath().available.iter().map(|d| d.location.clone()).collect()
    }

    fn active_jar(&self, location: &Url) -> Option<ActiveJar> {
        self.classpath()
            .active
            .iter()
            .find(|j| &j.location == location)
            .cloned()
    }

    /// Tracks every declared jar and marks them available.
    fn register_jars(&self) {
        for desc in &self.desc.jars {
            self.track(desc);
        }
        let mut cp = self.classpath();
        for desc in &self.desc.jars {
            if cp.seen.insert(desc.location.clone()) {
                cp.available.push(desc.clone());
            }
        }
    }

    fn track(&self, desc: &JarDesc) {
        let policy = (!desc.cacheable).then_some(UpdatePolicy::Always);
        if let Err(e) = self.tracker.add_resource(
            &desc.location,
            desc.version.clone(),
            self.desc.download_options,
            policy,
        ) {
            tracing::warn!(jar = %desc.location, "cannot track jar: {:#}", e);
        }
    }

    /// Eager jars plus the rest of their parts; without any, the main (or
    /// first) jar and its part.
    fn take_initial(&self) -> Vec<JarDesc> {
        let mut cp = self.classpath();
        let eager_parts: HashSet<String> = cp
            .available
            .iter()
            .filter(|d| d.eager)
            .filter_map(|d| d.part.clone())
            .collect();
        let (initial, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut cp.available)
            .into_iter()
            .partition(|d| d.eager || d.part.as_ref().map_or(false, |p| eager_parts.contains(p)));
        cp.available = rest;
        if !initial.is_empty() || cp.available.is_empty() {
            return cp.claim(initial);
        }
        let first = self
            .desc
            .main_jar()
            .and_then(|m| cp.available.iter().position(|d| d.location == m.location))
            .unwrap_or(0);
        cp.take_part(first)
    }

    /// Downloads, verifies and activates claimed `descs`; failures are
    /// logged and dropped. Returns how many jars became active.
    fn activate(&self, descs: Vec<JarDesc>) -> usize {
        if descs.is_empty() {
            return 0;
        }
        let activated = self.activate_claimed(&descs);
        self.classpath().in_flight -= 1;
        self.settled.notify_all();
        activated
    }

    fn activate_claimed(&self, descs: &[JarDesc]) -> usize {
        self.activations.fetch_add(1, Ordering::Relaxed);
        for d in descs {
            self.track(d);
        }
        let locations: Vec<Url> = descs
            .iter()
            .map(|d| d.location.clone())
            .filter(|l| self.tracker.is_tracked(l))
            .collect();
        if let Err(e) = self.tracker.wait_for_resources(&locations, None) {
            tracing::warn!("waiting for jars failed: {:#}", e);
        }
        self.verifier().add(&self.tracker, descs);
        let mut activated = 0;
        for d in descs {
            match self.activate_one(d) {
                Ok(()) => activated += 1,
                Err(e) => tracing::warn!(jar = %d.location, "dropping jar: {:#}", e),
            }
        }
        activated
    }

    fn activate_one(&self, desc: &JarDesc) -> Result<()> {
        let path = self
            .tracker
            .cache_file(&desc.location)?
            .ok_or_else(|| anyhow!("download failed"))?;
        let jar = Arc::new(JarFile::open(&path)?);
        if desc.native {
            self.extract_natives(&desc.location, &jar);
        }

        let class_path: Vec<Url> = match jar.manifest() {
            Ok(Some(m)) => m
                .class_path()
                .iter()
                .filter_map(|entry| desc.location.join(entry).ok())
                .collect(),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(jar = %desc.location, "unreadable manifest: {:#}", e);
                Vec::new()
            }
        };
        let index = jar.index().ok().flatten().filter(|i| !i.is_empty());
        let nested = self.activate_nested(desc, &jar);

        let mut cp = self.classpath();
        for url in class_path {
            if cp.seen.insert(url.clone()) {
                cp.class_path_pending.push(url);
            }
        }
        if let Some(index) = index {
            cp.indexes.push((desc.location.clone(), index));
        }
        cp.seen.insert(desc.location.clone());
        if !cp.active.iter().any(|a| a.location == desc.location) {
            tracing::debug!(jar = %desc.location, "jar activated");
            cp.active.push(ActiveJar {
                location: desc.location.clone(),
                jar,
                part: desc.part.clone(),
                native: desc.native,
            });
        }
        for n in nested {
            if !cp.active.iter().any(|a| a.location == n.location) {
                cp.active.push(n);
            }
        }
        Ok(())
    }

    fn activate_nested(&self, desc: &JarDesc, jar: &JarFile) -> Vec<ActiveJar> {
        if jar.nested_jars().next().is_none() {
            return Vec::new();
        }
        let dir = match self.natives.path() {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(jar = %desc.location, "nested jars skipped: {:#}", e);
                return Vec::new();
            }
        };
        let mut out = Vec::new();
        for n in nested::extract_nested(&desc.location, jar, &dir) {
            match JarFile::open(&n.path) {
                Ok(inner) => {
                    self.verifier().add_file(&n.location, &n.path);
                    out.push(ActiveJar {
                        location: n.location,
                        jar: Arc::new(inner),
                        part: desc.part.clone(),
                        native: false,
                    });
                }
                Err(e) => tracing::warn!(jar = %n.location, "nested jar unreadable: {:#}", e),
            }
        }
        out
    }

    fn extract_natives(&self, location: &Url, jar: &JarFile) {
        let dir = match self.natives.path() {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(jar = %location, "native libraries skipped: {:#}", e);
                return;
            }
        };
        for entry in jar.names().iter().filter(|n| is_native_library(n)) {
            let file_name = entry.rsplit('/').next().unwrap_or(entry);
            if let Err(e) = jar.extract(entry, &dir.join(file_name)) {
                tracing::warn!(jar = %location, entry, "cannot extract native library: {:#}", e);
            }
        }
    }

    fn cached_class(&self, name: &str) -> Option<LoadedClass> {
        self.classpath().classes.get(name).cloned()
    }

    /// First activated jar across the chain for which `f` matches.
    fn scan_active<T>(
        self: &Arc<Self>,
        f: &impl Fn(&ActiveJar) -> Option<T>,
    ) -> Option<(Arc<Self>, ActiveJar, T)> {
        for loader in self.chain() {
            let cp = loader.classpath();
            for jar in &cp.active {
                if let Some(t) = f(jar) {
                    let jar = jar.clone();
                    drop(cp);
                    return Some((loader, jar, t));
                }
            }
        }
        None
    }

    /// Steps 3 to 6: activated jars, then class-path, index and plain
    /// activation, retrying after each round that activated something.
    fn search<T>(
        self: &Arc<Self>,
        entry: &str,
        f: impl Fn(&ActiveJar) -> Option<T>,
    ) -> Option<(Arc<Self>, ActiveJar, T)> {
        loop {
            if let Some(hit) = self.scan_active(&f) {
                return Some(hit);
            }
            if self.activate_class_path() || self.activate_indexed(entry) || self.activate_next() {
                continue;
            }
            if self.wait_for_in_flight() {
                continue;
            }
            return None;
        }
    }

    /// Blocks until the first loader of the chain with an activation round
    /// running on another thread has none left. False when nothing was
    /// in flight.
    fn wait_for_in_flight(self: &Arc<Self>) -> bool {
        for loader in self.chain() {
            let cp = loader.classpath();
            if cp.in_flight == 0 {
                continue;
            }
            tracing::debug!(loader = %loader.key.unique_key, "waiting for jars in flight");
            let _settled = loader
                .settled
                .wait_while(cp, |cp| cp.in_flight > 0)
                .unwrap_or_else(PoisonError::into_inner);
            return true;
        }
        false
    }

    fn activate_class_path(self: &Arc<Self>) -> bool {
        for loader in self.chain() {
            let descs = {
                let mut cp = loader.classpath();
                let pending = std::mem::take(&mut cp.class_path_pending);
                if pending.is_empty() {
                    continue;
                }
                let descs = pending
                    .into_iter()
                    .map(|url| JarDesc::new(url).lazy())
                    .collect();
                cp.claim(descs)
            };
            loader.activate(descs);
            return true;
        }
        false
    }

    fn activate_indexed(self: &Arc<Self>, entry: &str) -> bool {
        for loader in self.chain() {
            let descs = {
                let mut cp = loader.classpath();
                let target = cp.indexes.iter().find_map(|(base, index)| {
                    index
                        .jars_for(entry)
                        .iter()
                        .filter_map(|name| base.join(name).ok())
                        .find_map(|url| cp.available.iter().position(|d| d.location == url))
                });
                match target {
                    Some(i) => cp.take_part(i),
                    None => continue,
                }
            };
            tracing::debug!(entry, "activating jar named by index");
            loader.activate(descs);
            return true;
        }
        false
    }

    fn activate_next(self: &Arc<Self>) -> bool {
        self.activate_next_where(|_| true)
    }

    fn activate_next_where(self: &Arc<Self>, pred: impl Fn(&JarDesc) -> bool) -> bool {
        for loader in self.chain() {
            let descs = {
                let mut cp = loader.classpath();
                match cp.available.iter().position(&pred) {
                    Some(i) => cp.take_part(i),
                    None => continue,
                }
            };
            loader.activate(descs);
            return true;
        }
        false
    }

    /// Resolves `name` (e.g. `com.example.Main`).
    pub fn load_class(self: &Arc<Self>, name: &str) -> Result<LoadedClass, LoadError> {
        for loader in self.chain() {
            if let Some(class) = loader.cached_class(name) {
                return Ok(class);
            }
        }
        if let Some(class) = self.env.parent.load_class(name) {
            return Ok(class);
        }
        let entry = class_entry_name(name);
        if let Some((owner, jar, ())) = self.search(&entry, |j| j.jar.contains(&entry).then_some(())) {
            let bytes = jar
                .jar
                .read(&entry)
                .map_err(|e| LoadError::Read {
                    name: name.to_string(),
                    location: jar.location.to_string(),
                    source: std::io::Error::other(format!("{:#}", e)),
                })?
                .ok_or_else(|| LoadError::ClassNotFound(name.to_string()))?;
            let domain = owner.domain_for(&jar);
            return Ok(owner.define(name, bytes, jar.location, Some(domain)));
        }
        if let Some(class) = self.load_from_codebase(name, &entry) {
            return Ok(class);
        }
        Err(LoadError::ClassNotFound(name.to_string()))
    }

    fn define(&self, name: &str, bytes: Vec<u8>, code_source: Url, domain: Option<Arc<SecurityDomain>>) -> LoadedClass {
        let class = LoadedClass {
            name: name.to_string(),
            bytes: Arc::from(bytes),
            code_source,
            domain,
        };
        self.classpath()
            .classes
            .entry(name.to_string())
            .or_insert(class)
            .clone()
    }

    fn load_from_codebase(&self, name: &str, entry: &str) -> Option<LoadedClass> {
        let codebase = self.codebase.as_ref()?;
        let (_, path) = codebase.fetch(entry)?;
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(class = name, "codebase class unreadable: {}", e);
                return None;
            }
        };
        let domain = self.codebase_domain(codebase.codebase());
        Some(self.define(name, bytes, codebase.codebase().clone(), Some(domain)))
    }

    fn codebase_domain(&self, codebase: &Url) -> Arc<SecurityDomain> {
        if let Some(Some(domain)) = self.domains.get(codebase) {
            return domain;
        }
        let source = CodeSource::new(codebase.clone(), None);
        self.domains.insert(self.env.security.build_domain(
            SecurityType::Sandbox,
            self.desc.security,
            self.desc.origin_host().as_deref(),
            &source,
        ))
    }

    /// URL of the first resource called `name`.
    pub fn find_resource(self: &Arc<Self>, name: &str) -> Option<Url> {
        if let Some(url) = self.env.parent.find_resource(name) {
            return Some(url);
        }
        if let Some((_, jar, ())) = self.search(name, |j| j.jar.contains(name).then_some(())) {
            return entry_url(jar.jar.path(), name);
        }
        self.codebase_resource(name)
    }

    /// Every resource called `name` across the parent and all activated
    /// jars. Lazily activates jars only when nothing matches yet.
    pub fn find_resources(self: &Arc<Self>, name: &str) -> Vec<Url> {
        let mut out: Vec<Url> = self.env.parent.find_resource(name).into_iter().collect();
        let scan = |loader: &Arc<Self>| -> Vec<Url> {
            let mut hits = Vec::new();
            for l in loader.chain() {
                for jar in &l.classpath().active {
                    if jar.jar.contains(name) {
                        hits.extend(entry_url(jar.jar.path(), name));
                    }
                }
            }
            hits
        };
        let mut hits = scan(self);
        if hits.is_empty() && self.search(name, |j| j.jar.contains(name).then_some(())).is_some() {
            hits = scan(self);
        }
        out.extend(hits);
        if out.is_empty() {
            out.extend(self.codebase_resource(name));
        }
        out
    }

    fn codebase_resource(&self, name: &str) -> Option<Url> {
        let (_, path) = self.codebase.as_ref()?.fetch(name)?;
        Url::from_file_path(path).ok()
    }

    /// Domain of the activated jar `jar`, memoized.
    fn domain_for(&self, jar: &ActiveJar) -> Arc<SecurityDomain> {
        if let Some(Some(domain)) = self.domains.get(&jar.location) {
            return domain;
        }
        self.build_domain(&jar.location, Some(jar.jar.path().to_path_buf()))
    }

    fn build_domain(&self, location: &Url, local_file: Option<PathBuf>) -> Arc<SecurityDomain> {
        let signers = self
            .verifier()
            .jar(location)
            .filter(|v| v.status == JarStatus::Signed)
            .map(|v| v.signers.clone());
        let level = match signers {
            Some(signers) if self.is_approved(&signers) => self.security_type(),
            Some(signers) => {
                if self.security_type() != SecurityType::Sandbox {
                    tracing::warn!(jar = %location, ?signers, "signer was not approved; jar runs sandboxed");
                }
                SecurityType::Sandbox
            }
            None => SecurityType::Sandbox,
        };
        let source = CodeSource::new(location.clone(), local_file);
        self.domains.insert(self.env.security.build_domain(
            level,
            self.desc.security,
            self.desc.origin_host().as_deref(),
            &source,
        ))
    }

    /// Security domain for code from `location`.
    ///
    /// Known jars are answered from the activated set. An unknown location
    /// gets a single resolution attempt (download and verify); the outcome,
    /// including failure, is remembered.
    pub fn code_source_domain(self: &Arc<Self>, location: &Url) -> Option<Arc<SecurityDomain>> {
        if let Some(cached) = self.domains.get(location) {
            return cached;
        }
        for loader in self.chain() {
            if let Some(jar) = loader.active_jar(location) {
                return Some(loader.domain_for(&jar));
            }
        }
        match self.resolve_code_source(location) {
            Some(domain) => Some(domain),
            None => {
                tracing::warn!(code_source = %location, "code source could not be resolved");
                self.domains.insert_negative(location);
                None
            }
        }
    }

    fn resolve_code_source(self: &Arc<Self>, location: &Url) -> Option<Arc<SecurityDomain>> {
        for loader in self.chain() {
            let descs = {
                let mut cp = loader.classpath();
                match cp.available.iter().position(|d| &d.location == location) {
                    Some(i) => cp.take_part(i),
                    None => continue,
                }
            };
            loader.activate(descs);
            return loader.active_jar(location).map(|jar| loader.domain_for(&jar));
        }
        self.tracker
            .add_resource(location, None, self.desc.download_options, None)
            .ok()?;
        let path = self.tracker.cache_file(location).ok()??;
        self.verifier().add_file(location, &path);
        Some(self.build_domain(location, Some(path)))
    }

    /// Extracted native library for `name`, activating native jars that
    /// are still available when none matches yet.
    pub fn find_library(self: &Arc<Self>, name: &str) -> Option<PathBuf> {
        let candidates = native_file_names(name);
        loop {
            for loader in self.chain() {
                for dir in loader.natives.dirs() {
                    if let Some(found) = candidates.iter().map(|c| dir.join(c)).find(|p| p.is_file()) {
                        return Some(found);
                    }
                }
            }
            if !self.activate_next_where(|d| d.native) && !self.wait_for_in_flight() {
                return None;
            }
        }
    }

    /// Declared main class, else the main jar's `Main-Class`.
    pub fn main_class(&self) -> Option<String> {
        if let Some(name) = &self.desc.main_class {
            return Some(name.clone());
        }
        let main = self.desc.main_jar()?;
        let jar = self.active_jar(&main.location)?;
        match jar.jar.manifest() {
            Ok(m) => m.and_then(|m| m.main_class().map(str::to_string)),
            Err(e) => {
                tracing::warn!(jar = %main.location, "unreadable manifest: {:#}", e);
                None
            }
        }
    }

    /// Folds a loader built for the same key into this one. Returns false
    /// (and warns) when the two disagree on signing; this loader's trust
    /// decision stands either way.
    fn merge_from(&self, other: &ResourceGraphLoader) -> bool {
        let summary = |v: &SignatureVerifier| (!v.is_empty()).then(|| v.result().is_signed());
        let mine = summary(&*self.verifier());
        let theirs = summary(&*other.verifier());
        let mut agrees = true;
        if let (Some(mine), Some(theirs)) = (mine, theirs) {
            if mine != theirs {
                agrees = false;
                tracing::warn!(
                    loader = %self.key.unique_key,
                    existing_signed = mine,
                    merged_signed = theirs,
                    "merged loaders disagree on signing"
                );
            }
        }

        let taken = std::mem::take(&mut *other.classpath());
        self.natives.adopt(&other.natives);
        let mut reverify = Vec::new();
        {
            let mut cp = self.classpath();
            for jar in taken.active {
                if cp.active.iter().any(|a| a.location == jar.location) {
                    continue;
                }
                cp.seen.insert(jar.location.clone());
                reverify.push((jar.location.clone(), jar.jar.path().to_path_buf()));
                cp.active.push(jar);
            }
            for desc in taken.available {
                if cp.seen.insert(desc.location.clone()) {
                    cp.available.push(desc);
                }
            }
            for url in taken.class_path_pending {
                if cp.seen.insert(url.clone()) {
                    cp.class_path_pending.push(url);
                }
            }
            cp.indexes.extend(taken.indexes);
        }
        let mut verifier = self.verifier();
        for (location, path) in reverify {
            verifier.add_file(&location, &path);
        }
        tracing::debug!(loader = %self.key.unique_key, "merged loader");
        agrees
    }

    /// Whether the active jar at `location` carries native libraries.
    pub fn is_native_jar(&self, location: &Url) -> bool {
        self.active_jar(location).map_or(false, |j| j.native)
    }

    /// Part of the active jar at `location`.
    pub fn part_of(&self, location: &Url) -> Option<String> {
        self.active_jar(location).and_then(|j| j.part)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_part_pulls_the_whole_group() {
        let url = |n: &str| Url::parse(&format!("https://apps.example.com/{}", n)).unwrap();
        let mut cp = Classpath {
            available: vec![
                JarDesc::new(url("a.jar")).lazy().in_part("p"),
                JarDesc::new(url("x.jar")).lazy(),
                JarDesc::new(url("b.jar")).lazy().in_part("p"),
            ],
            ..Default::default()
        };
        let taken: Vec<Url> = cp.take_part(0).into_iter().map(|d| d.location).collect();
        assert_eq!(taken, vec![url("a.jar"), url("b.jar")]);
        assert_eq!(cp.available.len(), 1);
        assert_eq!(cp.take_part(0).len(), 1);
        assert!(cp.available.is_empty());
    }

    #[test]
    fn entry_urls_point_into_the_jar() {
        let url = entry_url(Path::new("/cache/app.jar"), "img/logo.png").unwrap();
        assert_eq!(url.as_str(), "jar:file:///cache/app.jar!/img/logo.png");
    }
}
