use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::UpdatePolicy;
use crate::retry::RetryPolicy;

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per transfer (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 0.25,
            max_delay_secs: 10,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_secs_f64(self.base_delay_secs.max(0.0)),
            max_delay: Duration::from_secs(self.max_delay_secs),
        }
    }
}

/// Global configuration loaded from `~/.config/netlaunch/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetlaunchConfig {
    /// Upper bound on downloader threads shared by every resource tracker.
    pub max_download_workers: usize,
    /// Follow 301/302/303/307/308 during URL negotiation. Off by default.
    pub allow_redirects: bool,
    pub connect_timeout_secs: u64,
    pub transfer_timeout_secs: u64,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    /// Cache root; defaults to `$XDG_CACHE_HOME/netlaunch`.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    /// Directory of PEM/DER trust anchors.
    #[serde(default)]
    pub trusted_certs_dir: Option<PathBuf>,
    /// TOML policy file granting permissions to origin prefixes.
    #[serde(default)]
    pub custom_policy: Option<PathBuf>,
    /// Ask the user even when the signer chain is trusted and clean.
    #[serde(default)]
    pub prompt_for_verified: bool,
    #[serde(default)]
    pub update_policy: UpdatePolicy,
    /// External unpack200 executable. Pack200 candidates are only negotiated when set.
    #[serde(default)]
    pub unpack200: Option<PathBuf>,
}

impl Default for NetlaunchConfig {
    fn default() -> Self {
        Self {
            max_download_workers: 5,
            allow_redirects: false,
            connect_timeout_secs: 15,
            transfer_timeout_secs: 600,
            retry: None,
            cache_dir: None,
            trusted_certs_dir: None,
            custom_policy: None,
            prompt_for_verified: false,
            update_policy: UpdatePolicy::default(),
            unpack200: None,
        }
    }
}

impl NetlaunchConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.clone().unwrap_or_default().to_policy()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs.max(1))
    }

    /// Configured cache root, or the XDG cache home.
    pub fn resolved_cache_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.cache_dir {
            return Ok(dir.clone());
        }
        let xdg_dirs = xdg::BaseDirectories::with_prefix("netlaunch")?;
        Ok(xdg_dirs.get_cache_home())
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("netlaunch")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<NetlaunchConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = NetlaunchConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: NetlaunchConfig = toml::from_str(&data)?;
    Ok(cfg)
}
