//! `netlaunch fetch` – download one resource into the cache.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use netlaunch_core::cache::DiskCache;
use netlaunch_core::config::NetlaunchConfig;
use netlaunch_core::descriptor::{DownloadOptions, VersionString};
use netlaunch_core::{DownloadContext, ResourceTracker};
use url::Url;

pub async fn run_fetch(
    cfg: &NetlaunchConfig,
    url: &str,
    version: Option<&str>,
    pack: bool,
    size_only: bool,
) -> Result<()> {
    let url = Url::parse(url).with_context(|| format!("invalid URL {}", url))?;
    let version = version
        .map(|v| VersionString::parse(v).ok_or_else(|| anyhow!("invalid version range {:?}", v)))
        .transpose()?;
    let cache = Arc::new(DiskCache::open(&cfg.resolved_cache_dir()?)?);
    let downloads = Arc::new(DownloadContext::new(cfg, cache));
    let tracker = ResourceTracker::new(&downloads, false);
    let options = DownloadOptions {
        use_pack: pack,
        use_version: version.is_some(),
    };
    tracker.add_resource(&url, version, options, None)?;

    if size_only {
        let probing = tracker.clone();
        let target = url.clone();
        let size = tokio::task::spawn_blocking(move || probing.total_size(&target)).await??;
        match size {
            Some(n) => println!("{}  {}", n, url),
            None => println!("-  {}", url),
        }
        return Ok(());
    }

    let fetching = tracker.clone();
    let target = url.clone();
    let mut handle = tokio::task::spawn_blocking(move || fetching.cache_file(&target));
    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    let path = loop {
        tokio::select! {
            joined = &mut handle => break joined??,
            _ = ticker.tick() => {
                if let Ok(p) = tracker.progress(&url) {
                    let total = p.total.map(|t| format!("{}", t)).unwrap_or_else(|| "?".to_string());
                    print!("\r  {} / {} bytes  ", p.transferred, total);
                    let _ = std::io::stdout().flush();
                }
            }
        }
    };
    println!();
    match path {
        Some(p) => println!("{}", p.display()),
        None => bail!("{} could not be downloaded", url),
    }
    Ok(())
}
