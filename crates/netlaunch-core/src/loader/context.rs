//! The launch-wide service object: shared loader environment plus the
//! registry of loader instances.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use super::init;
use super::registry::Inserted;
use super::{EmptyParent, LoaderEnv, LoaderKey, LoaderRegistry, ParentLoader, ResourceGraphLoader, Teardown};
use crate::cache::DiskCache;
use crate::config::NetlaunchConfig;
use crate::descriptor::{DescriptorSource, JnlpDescriptor, JsonDescriptorSource};
use crate::error::LaunchError;
use crate::security::{DenyAll, SecurityPolicyBuilder, TomlTrustPolicy, TrustPolicy, TrustPrompter};
use crate::tracker::{DownloadContext, ResourceTracker};
use crate::verify::{Pkcs7Extractor, SignerExtractor, TrustStore};

impl LoaderKey {
    pub fn for_descriptor(desc: &JnlpDescriptor) -> Self {
        let location = desc
            .source_location
            .as_ref()
            .or(desc.codebase.as_ref())
            .map(ToString::to_string)
            .unwrap_or_default();
        Self {
            unique_key: desc.unique_key(),
            location,
        }
    }
}

pub struct LaunchContextBuilder {
    downloads: Arc<DownloadContext>,
    extractor: Arc<dyn SignerExtractor>,
    trust: Arc<TrustStore>,
    prompter: Arc<dyn TrustPrompter>,
    policy: Option<Arc<dyn TrustPolicy>>,
    parent: Arc<dyn ParentLoader>,
    descriptors: Option<Arc<dyn DescriptorSource>>,
    prompt_for_verified: bool,
    native_root: Option<PathBuf>,
}

impl LaunchContextBuilder {
    pub fn extractor(mut self, extractor: Arc<dyn SignerExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn trust_store(mut self, trust: TrustStore) -> Self {
        self.trust = Arc::new(trust);
        self
    }

    pub fn prompter(mut self, prompter: Arc<dyn TrustPrompter>) -> Self {
        self.prompter = prompter;
        self
    }

    pub fn trust_policy(mut self, policy: Arc<dyn TrustPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn parent(mut self, parent: Arc<dyn ParentLoader>) -> Self {
        self.parent = parent;
        self
    }

    pub fn descriptors(mut self, descriptors: Arc<dyn DescriptorSource>) -> Self {
        self.descriptors = Some(descriptors);
        self
    }

    pub fn prompt_for_verified(mut self, prompt: bool) -> Self {
        self.prompt_for_verified = prompt;
        self
    }

    /// Where per-loader extraction directories are created.
    pub fn native_root(mut self, root: PathBuf) -> Self {
        self.native_root = Some(root);
        self
    }

    pub fn build(self) -> LaunchContext {
        let descriptors = self.descriptors.unwrap_or_else(|| {
            Arc::new(JsonDescriptorSource::new(ResourceTracker::new(&self.downloads, false)))
        });
        let security = SecurityPolicyBuilder::new(self.prompter)
            .with_policy(self.policy)
            .prompt_for_verified(self.prompt_for_verified);
        let native_root = self
            .native_root
            .unwrap_or_else(|| std::env::temp_dir().join("netlaunch"));
        LaunchContext {
            env: Arc::new(LoaderEnv {
                downloads: self.downloads,
                extractor: self.extractor,
                trust: self.trust,
                security,
                parent: self.parent,
                descriptors,
                native_root,
                teardown: Teardown::new(),
            }),
            registry: LoaderRegistry::new(),
        }
    }
}

/// Everything one launch shares. Loaders are acquired and released through
/// it; [`LaunchContext::shutdown`] reclaims what they extracted.
pub struct LaunchContext {
    env: Arc<LoaderEnv>,
    registry: LoaderRegistry<ResourceGraphLoader>,
}

impl LaunchContext {
    /// Defaults: PKCS#7 signer extraction, no trust anchors, every prompt
    /// denied, no parent classes, JSON extension descriptors.
    pub fn builder(downloads: Arc<DownloadContext>) -> LaunchContextBuilder {
        LaunchContextBuilder {
            downloads,
            extractor: Arc::new(Pkcs7Extractor),
            trust: Arc::new(TrustStore::empty()),
            prompter: Arc::new(DenyAll),
            policy: None,
            parent: Arc::new(EmptyParent),
            descriptors: None,
            prompt_for_verified: false,
            native_root: None,
        }
    }

    /// Builder wired from configuration: disk cache, trust anchors and the
    /// external trust policy.
    pub fn from_config(config: &NetlaunchConfig) -> Result<LaunchContextBuilder> {
        let cache_dir = config.resolved_cache_dir()?;
        let cache = Arc::new(DiskCache::open(&cache_dir)?);
        let downloads = Arc::new(DownloadContext::new(config, cache));
        let trust = match &config.trusted_certs_dir {
            Some(dir) => TrustStore::load_dir(dir)?,
            None => TrustStore::empty(),
        };
        tracing::debug!(anchors = trust.len(), "trust store loaded");
        let mut builder = Self::builder(downloads)
            .trust_store(trust)
            .prompt_for_verified(config.prompt_for_verified)
            .native_root(cache_dir.join("natives"));
        if let Some(path) = &config.custom_policy {
            let policy = TomlTrustPolicy::load(path)?;
            tracing::info!(grants = policy.len(), "external trust policy loaded");
            builder = builder.trust_policy(Arc::new(policy));
        }
        Ok(builder)
    }

    pub(crate) fn env(&self) -> &LoaderEnv {
        &self.env
    }

    pub fn downloads(&self) -> &Arc<DownloadContext> {
        &self.env.downloads
    }

    pub fn registry(&self) -> &LoaderRegistry<ResourceGraphLoader> {
        &self.registry
    }

    pub fn use_count(&self, key: &LoaderKey) -> usize {
        self.registry.use_count(key)
    }

    /// Returns the shared loader for `desc`, building and initializing it
    /// when none is registered. Each call counts one use.
    pub fn acquire(&self, desc: JnlpDescriptor) -> Result<Arc<ResourceGraphLoader>, LaunchError> {
        self.acquire_with_ancestry(desc, &[])
    }

    pub(super) fn acquire_with_ancestry(
        &self,
        desc: JnlpDescriptor,
        ancestry: &[LoaderKey],
    ) -> Result<Arc<ResourceGraphLoader>, LaunchError> {
        let key = LoaderKey::for_descriptor(&desc);
        if ancestry.contains(&key) {
            if let Some(location) = desc.source_location.clone() {
                return Err(LaunchError::Extension {
                    location,
                    reason: "extension cycle".into(),
                });
            }
        }
        if let Some(existing) = self.registry.acquire_existing(&key) {
            tracing::debug!(loader = %key.unique_key, location = %key.location, "reusing loader");
            return Ok(existing);
        }

        let loader = ResourceGraphLoader::new(&self.env, key.clone(), desc);
        let mut chain = ancestry.to_vec();
        chain.push(key.clone());
        if let Err(e) = init::initialize(self, &loader, &chain) {
            self.discard(&loader);
            return Err(e);
        }
        Ok(self.register(key, loader))
    }

    /// Publishes an initialized loader. When another thread registered the
    /// same key first, `loader` is folded into that one, which is returned.
    fn register(&self, key: LoaderKey, loader: Arc<ResourceGraphLoader>) -> Arc<ResourceGraphLoader> {
        match self.registry.insert_or_existing(key, Arc::clone(&loader)) {
            Inserted::New(l) => l,
            Inserted::Existing(existing) => {
                existing.merge_from(&loader);
                for peer in loader.take_peers() {
                    existing.add_peer(peer);
                }
                existing
            }
        }
    }

    fn discard(&self, loader: &ResourceGraphLoader) {
        for peer in loader.take_peers() {
            self.release(&peer);
        }
        loader.natives.release();
    }

    /// Drops one use of `loader`. At zero it leaves the registry, its
    /// extraction directory is removed and its peers are released in turn.
    pub fn release(&self, loader: &Arc<ResourceGraphLoader>) {
        if let Some(evicted) = self.registry.release(loader.key()) {
            tracing::info!(loader = %evicted.key().unique_key, location = %evicted.key().location, "evicting loader");
            self.discard(&evicted);
        }
    }

    /// Evicts every loader and removes every extraction directory.
    pub fn shutdown(&self) {
        for loader in self.registry.drain() {
            loader.take_peers();
            loader.natives.release();
        }
        self.env.teardown.run();
        tracing::info!("launch context shut down");
    }
}
