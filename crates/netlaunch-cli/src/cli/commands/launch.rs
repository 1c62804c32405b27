//! `netlaunch launch` – resolve a descriptor through a launch context.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use netlaunch_core::config::NetlaunchConfig;
use netlaunch_core::descriptor::JnlpDescriptor;
use netlaunch_core::security::{AcceptAll, TrustPrompter};
use netlaunch_core::{DownloadContext, LaunchContext};
use url::Url;

use crate::cli::prompt::StdinPrompter;

const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

pub async fn run_launch(
    cfg: &NetlaunchConfig,
    path: &Path,
    trust: bool,
    class: Option<String>,
) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read descriptor {}", path.display()))?;
    let mut desc = JnlpDescriptor::from_json(&text)
        .with_context(|| format!("parse descriptor {}", path.display()))?;
    if desc.source_location.is_none() {
        let abs = std::fs::canonicalize(path)?;
        desc.source_location = Url::from_file_path(&abs).ok();
    }

    let prompter: Arc<dyn TrustPrompter> = if trust {
        Arc::new(AcceptAll)
    } else {
        Arc::new(StdinPrompter)
    };
    let ctx = Arc::new(LaunchContext::from_config(cfg)?.prompter(prompter).build());
    let downloads = Arc::clone(ctx.downloads());

    let acquiring = Arc::clone(&ctx);
    let mut handle = tokio::task::spawn_blocking(move || acquiring.acquire(desc));
    let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
    let acquired = loop {
        tokio::select! {
            joined = &mut handle => break joined?,
            _ = ticker.tick() => print_progress(&downloads),
        }
    };
    print_progress(&downloads);
    println!();
    let loader = match acquired {
        Ok(loader) => loader,
        Err(e) => {
            ctx.shutdown();
            return Err(e.into());
        }
    };

    let result = loader.verifier_result();
    println!("security:  {:?}", loader.security_type());
    println!(
        "signing:   {}",
        if result.is_signed() {
            "signed"
        } else if result.is_mixed() {
            "mixed"
        } else {
            "unsigned"
        }
    );
    if let Some(signer) = result.signer.as_ref().and_then(|p| p.signer()) {
        println!("signer:    {}", signer.subject);
    }
    for issue in &result.issues {
        println!("issue:     {}", issue);
    }
    for jar in loader.active_jars() {
        println!("active:    {}", jar);
    }
    for jar in loader.available_jars() {
        println!("lazy:      {}", jar);
    }

    if let Some(name) = class.or_else(|| loader.main_class()) {
        let loading = Arc::clone(&loader);
        let lookup = name.clone();
        let loaded = tokio::task::spawn_blocking(move || loading.load_class(&lookup)).await?;
        match loaded {
            Ok(c) => {
                let level = c
                    .domain
                    .as_ref()
                    .map(|d| format!("{:?}", d.security_type))
                    .unwrap_or_else(|| "parent".to_string());
                println!(
                    "loaded:    {} ({} bytes) from {} [{}]",
                    c.name,
                    c.bytes.len(),
                    c.code_source,
                    level
                );
            }
            Err(e) => println!("loaded:    {} failed: {}", name, e),
        }
    }

    ctx.release(&loader);
    ctx.shutdown();
    Ok(())
}

fn print_progress(downloads: &DownloadContext) {
    let all = downloads.progress_all();
    if all.is_empty() {
        return;
    }
    let done = all.iter().filter(|(_, p)| p.state.is_terminal()).count();
    let transferred: u64 = all.iter().map(|(_, p)| p.transferred).sum();
    let total: u64 = all.iter().filter_map(|(_, p)| p.total).sum();
    print!(
        "\r  {} / {} resources  {:.1} / {:.1} KiB  ",
        done,
        all.len(),
        transferred as f64 / 1024.0,
        total as f64 / 1024.0
    );
    let _ = std::io::stdout().flush();
}
