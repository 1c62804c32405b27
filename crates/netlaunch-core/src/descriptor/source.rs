//! Resolving extension locations to descriptors.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use url::Url;

use super::{JnlpDescriptor, VersionString};
use crate::tracker::ResourceTracker;

/// Turns an extension location into a parsed descriptor.
pub trait DescriptorSource: Send + Sync {
    fn fetch(&self, location: &Url, version: Option<&VersionString>) -> Result<JnlpDescriptor>;
}

/// Reads JSON-serialized descriptors through a resource tracker, so extension
/// descriptors are cached like any other resource.
pub struct JsonDescriptorSource {
    tracker: ResourceTracker,
}

impl JsonDescriptorSource {
    pub fn new(tracker: ResourceTracker) -> Self {
        Self { tracker }
    }
}

impl DescriptorSource for JsonDescriptorSource {
    fn fetch(&self, location: &Url, version: Option<&VersionString>) -> Result<JnlpDescriptor> {
        self.tracker
            .add_resource(location, version.cloned(), Default::default(), None)?;
        let path = match self.tracker.cache_file(location)? {
            Some(p) => p,
            None if location.scheme() == "file" => location
                .to_file_path()
                .map_err(|_| anyhow::anyhow!("bad file URL {}", location))?,
            None => anyhow::bail!("descriptor {} could not be downloaded", location),
        };
        let data = std::fs::read_to_string(&path)
            .with_context(|| format!("read descriptor {}", path.display()))?;
        let mut desc = JnlpDescriptor::from_json(&data)
            .with_context(|| format!("parse descriptor {}", location))?;
        if desc.source_location.is_none() {
            desc.source_location = Some(location.clone());
        }
        Ok(desc)
    }
}

/// In-memory descriptors keyed by location.
#[derive(Default, Clone)]
pub struct StaticDescriptorSource {
    entries: HashMap<Url, Arc<JnlpDescriptor>>,
}

impl StaticDescriptorSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, location: Url, descriptor: JnlpDescriptor) -> Self {
        self.entries.insert(location, Arc::new(descriptor));
        self
    }
}

impl DescriptorSource for StaticDescriptorSource {
    fn fetch(&self, location: &Url, _version: Option<&VersionString>) -> Result<JnlpDescriptor> {
        self.entries
            .get(location)
            .map(|d| (**d).clone())
            .ok_or_else(|| anyhow::anyhow!("no descriptor registered for {}", location))
    }
}
