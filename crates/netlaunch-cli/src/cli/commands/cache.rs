//! `netlaunch cache` – inspect or clear the download cache.

use anyhow::Result;
use clap::Subcommand;
use netlaunch_core::cache::DiskCache;
use netlaunch_core::config::NetlaunchConfig;

#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// List cached resources.
    List,
    /// Delete every cached resource.
    Clear,
    /// Print the cache directory.
    Path,
}

pub fn run_cache(cfg: &NetlaunchConfig, action: CacheAction) -> Result<()> {
    let root = cfg.resolved_cache_dir()?;
    match action {
        CacheAction::Path => println!("{}", root.display()),
        CacheAction::Clear => {
            DiskCache::open(&root)?.clear()?;
            tracing::info!(cache = %root.display(), "cache cleared");
            println!("Cleared {}", root.display());
        }
        CacheAction::List => {
            let entries = DiskCache::open(&root)?.entries()?;
            if entries.is_empty() {
                println!("Cache is empty.");
                return Ok(());
            }
            println!("{:<10} {:<10} {}", "SIZE", "VERSION", "LOCATION");
            for (entry, _path) in entries {
                let size = entry
                    .size
                    .map(|s| format!("{s}"))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<10} {:<10} {}",
                    size,
                    entry.version.as_deref().unwrap_or("-"),
                    entry.location
                );
            }
        }
    }
    Ok(())
}
