//! Pre-parsed application descriptor model.
//!
//! Only the parts of a JNLP file that drive resource resolution and
//! security are modelled. Descriptors arrive already parsed; the JSON form
//! below is what [`JsonDescriptorSource`] reads.

mod source;
mod version;

pub use source::{DescriptorSource, JsonDescriptorSource, StaticDescriptorSource};
pub use version::{compare_versions, VersionString};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::security::SecurityType;

/// What kind of descriptor this is; extensions never need a main class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DescriptorKind {
    #[default]
    Application,
    Applet,
    Component,
}

/// One `<jar>`/`<nativelib>` element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JarDesc {
    pub location: Url,
    #[serde(default)]
    pub version: Option<VersionString>,
    #[serde(default)]
    pub part: Option<String>,
    /// `download="eager"`; lazy jars are activated on a class miss.
    #[serde(default = "default_true")]
    pub eager: bool,
    #[serde(default)]
    pub main: bool,
    #[serde(default)]
    pub native: bool,
    #[serde(default = "default_true")]
    pub cacheable: bool,
}

fn default_true() -> bool {
    true
}

impl JarDesc {
    pub fn new(location: Url) -> Self {
        Self {
            location,
            version: None,
            part: None,
            eager: true,
            main: false,
            native: false,
            cacheable: true,
        }
    }

    pub fn lazy(mut self) -> Self {
        self.eager = false;
        self
    }

    pub fn in_part(mut self, part: &str) -> Self {
        self.part = Some(part.to_string());
        self
    }

    pub fn main(mut self) -> Self {
        self.main = true;
        self
    }
}

/// One `<extension>` element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionDesc {
    pub location: Url,
    #[serde(default)]
    pub version: Option<VersionString>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Download option flags from `jnlp.packEnabled` / `jnlp.versionEnabled`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadOptions {
    #[serde(default)]
    pub use_pack: bool,
    #[serde(default)]
    pub use_version: bool,
}

/// A parsed application, applet or extension descriptor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JnlpDescriptor {
    /// Where the descriptor itself was loaded from.
    #[serde(default)]
    pub source_location: Option<Url>,
    #[serde(default)]
    pub codebase: Option<Url>,
    #[serde(default)]
    pub kind: DescriptorKind,
    /// `<security>` declaration; `None` when the element is absent.
    #[serde(default)]
    pub security: Option<SecurityType>,
    #[serde(default)]
    pub jars: Vec<JarDesc>,
    #[serde(default)]
    pub extensions: Vec<ExtensionDesc>,
    #[serde(default)]
    pub main_class: Option<String>,
    #[serde(default)]
    pub download_options: DownloadOptions,
    /// Raw descriptor text, compared against a signed `JNLP-INF` copy.
    #[serde(default)]
    pub raw: Option<String>,
    /// Overrides the derived unique key (set on extensions by their parent).
    #[serde(default)]
    pub unique_key: Option<String>,
}

impl JnlpDescriptor {
    /// Parses the JSON form read by [`JsonDescriptorSource`].
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        let desc: Self = serde_json::from_str(text)?;
        Ok(desc)
    }

    /// Key shared by an application and all of its extension loaders.
    pub fn unique_key(&self) -> String {
        if let Some(key) = &self.unique_key {
            return key.clone();
        }
        match (&self.source_location, &self.codebase) {
            (Some(src), _) => src.to_string(),
            (None, Some(cb)) => format!("{}#{}", cb, self.main_class.as_deref().unwrap_or("")),
            (None, None) => format!("anonymous#{}", self.main_class.as_deref().unwrap_or("")),
        }
    }

    /// Host the sandbox may connect back to.
    pub fn origin_host(&self) -> Option<String> {
        self.codebase
            .as_ref()
            .or(self.source_location.as_ref())
            .and_then(|u| u.host_str().map(str::to_string))
    }

    pub fn main_jar(&self) -> Option<&JarDesc> {
        self.jars
            .iter()
            .find(|j| j.main)
            .or_else(|| self.jars.iter().find(|j| !j.native))
    }

    /// Elevated means `all-permissions` or `j2ee-application-client-permissions`.
    pub fn requests_elevated(&self) -> bool {
        matches!(self.security, Some(t) if t != SecurityType::Sandbox)
    }

    pub fn needs_main_class(&self) -> bool {
        self.kind == DescriptorKind::Application
    }
}
