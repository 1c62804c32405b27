//! Loader initialization: extensions, initial jars, verification, security.

use std::collections::BTreeSet;
use std::sync::Arc;

use url::Url;

use super::jnlp_match::{matches_exact, matches_template};
use super::{LaunchContext, LoaderKey, LoaderState, ResourceGraphLoader};
use crate::descriptor::{DescriptorKind, ExtensionDesc};
use crate::error::LaunchError;
use crate::jar::{class_entry_name, JarFile};
use crate::verify::VerifierResult;

const SIGNED_JNLP: &str = "JNLP-INF/APPLICATION.JNLP";
const SIGNED_TEMPLATE: &str = "JNLP-INF/APPLICATION_TEMPLATE.JNLP";

/// Runs the fixed initialization order. `ancestry` lists the loaders
/// whose initialization led here, itself included.
pub(super) fn initialize(
    ctx: &LaunchContext,
    loader: &Arc<ResourceGraphLoader>,
    ancestry: &[LoaderKey],
) -> Result<(), LaunchError> {
    let desc = Arc::clone(loader.descriptor());
    tracing::info!(
        loader = %loader.key().unique_key,
        jars = desc.jars.len(),
        extensions = desc.extensions.len(),
        "initializing loader"
    );

    for peer in resolve_extensions(ctx, loader, ancestry)? {
        loader.add_peer(peer);
    }

    loader.set_state(LoaderState::ResourcesLoading);
    loader.register_jars();
    let initial = loader.take_initial();
    let locations: Vec<Url> = initial
        .iter()
        .map(|d| d.location.clone())
        .filter(|l| loader.tracker().is_tracked(l))
        .collect();
    loader
        .tracker()
        .wait_for_resources(&locations, None)
        .map_err(|e| LaunchError::Tracker(format!("{:#}", e)))?;

    loader.set_state(LoaderState::Verifying);
    let activated = loader.activate(initial);
    tracing::debug!(activated, "initial jars active");
    let result = loader.verifier_result();
    check_signed_jnlp(loader)?;
    let granted = ctx.env().security.decide(&desc, &result)?;
    loader.set_security_type(granted);
    loader.approve_signers(approved_signers(loader, &result));

    if desc.needs_main_class() {
        check_main_class(ctx, loader)?;
    }
    loader.set_state(LoaderState::Active);
    tracing::info!(loader = %loader.key().unique_key, security = ?granted, "loader active");
    Ok(())
}

/// Acquires every extension loader in parallel. On failure the ones
/// already acquired are released again.
fn resolve_extensions(
    ctx: &LaunchContext,
    loader: &Arc<ResourceGraphLoader>,
    ancestry: &[LoaderKey],
) -> Result<Vec<Arc<ResourceGraphLoader>>, LaunchError> {
    let extensions = &loader.descriptor().extensions;
    if extensions.is_empty() {
        return Ok(Vec::new());
    }
    let unique_key = loader.key().unique_key.clone();
    let results: Vec<Result<Arc<ResourceGraphLoader>, LaunchError>> = std::thread::scope(|s| {
        let handles: Vec<_> = extensions
            .iter()
            .map(|ext| {
                let unique_key = unique_key.clone();
                std::thread::Builder::new()
                    .name("netlaunch-extension".into())
                    .spawn_scoped(s, move || acquire_extension(ctx, ext, unique_key, ancestry))
                    .map_err(|e| (ext, e.to_string()))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| match h {
                Ok(handle) => handle.join().unwrap_or_else(|_| {
                    Err(LaunchError::Tracker("extension thread panicked".into()))
                }),
                Err((ext, reason)) => Err(LaunchError::Extension {
                    location: ext.location.clone(),
                    reason,
                }),
            })
            .collect()
    });

    let mut peers = Vec::new();
    let mut first_error = None;
    for result in results {
        match result {
            Ok(peer) => peers.push(peer),
            Err(e) if first_error.is_none() => first_error = Some(e),
            Err(e) => tracing::warn!("extension failed: {}", e),
        }
    }
    match first_error {
        None => Ok(peers),
        Some(e) => {
            for peer in peers {
                ctx.release(&peer);
            }
            Err(e)
        }
    }
}

fn acquire_extension(
    ctx: &LaunchContext,
    ext: &ExtensionDesc,
    unique_key: String,
    ancestry: &[LoaderKey],
) -> Result<Arc<ResourceGraphLoader>, LaunchError> {
    let fail = |reason: String| LaunchError::Extension {
        location: ext.location.clone(),
        reason,
    };
    let mut desc = ctx
        .env()
        .descriptors
        .fetch(&ext.location, ext.version.as_ref())
        .map_err(|e| fail(format!("{:#}", e)))?;
    desc.unique_key = Some(unique_key);
    desc.kind = DescriptorKind::Component;
    desc.source_location.get_or_insert_with(|| ext.location.clone());
    ctx.acquire_with_ancestry(desc, ancestry)
}

/// The common signer when there is one, else every signer of a jar with
/// signed content at decision time.
fn approved_signers(loader: &ResourceGraphLoader, result: &VerifierResult) -> BTreeSet<String> {
    match &result.signer {
        Some(path) => BTreeSet::from([path.key().to_string()]),
        None => loader.verifier().signer_keys(),
    }
}

/// A signed main jar carrying a `JNLP-INF` copy must match the launching
/// descriptor text.
fn check_signed_jnlp(loader: &Arc<ResourceGraphLoader>) -> Result<(), LaunchError> {
    let desc = loader.descriptor();
    let Some(main) = desc.main_jar() else {
        return Ok(());
    };
    let Some(active) = loader.active_jar(&main.location) else {
        return Ok(());
    };
    let signed = loader
        .verifier()
        .jar(&main.location)
        .map_or(false, |v| v.has_signed_content());
    if !signed {
        return Ok(());
    }
    let (text, template) = match (
        read_ignoring_case(&active.jar, SIGNED_JNLP),
        read_ignoring_case(&active.jar, SIGNED_TEMPLATE),
    ) {
        (Some(t), _) => (t, false),
        (None, Some(t)) => (t, true),
        (None, None) => return Ok(()),
    };
    let Some(raw) = desc.raw.as_deref() else {
        tracing::warn!(jar = %main.location, "launching descriptor text unavailable; signed JNLP not compared");
        return Ok(());
    };
    let signed_text = String::from_utf8_lossy(&text);
    let matched = if template {
        matches_template(&signed_text, raw)
    } else {
        matches_exact(&signed_text, raw)
    };
    if !matched {
        return Err(LaunchError::SignedJnlpMismatch(main.location.to_string()));
    }
    tracing::info!(jar = %main.location, template, "signed JNLP matches");
    Ok(())
}

fn read_ignoring_case(jar: &JarFile, name: &str) -> Option<Vec<u8>> {
    let entry = jar.names().iter().find(|n| n.eq_ignore_ascii_case(name))?;
    match jar.read(entry) {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(jar = %jar.path().display(), "cannot read {}: {:#}", entry, e);
            None
        }
    }
}

/// The main class must exist somewhere: the parent, this loader's jars or
/// an extension's. Lazy jars are activated while searching.
fn check_main_class(ctx: &LaunchContext, loader: &Arc<ResourceGraphLoader>) -> Result<(), LaunchError> {
    let name = loader.main_class().ok_or(LaunchError::MainClassUnknown)?;
    if ctx.env().parent.load_class(&name).is_some() {
        return Ok(());
    }
    let entry = class_entry_name(&name);
    match loader.search(&entry, |j| j.jar.contains(&entry).then_some(())) {
        Some((_, jar, ())) => {
            tracing::debug!(class = %name, jar = %jar.location, "main class located");
            Ok(())
        }
        None => Err(LaunchError::MainClassNotFound(name)),
    }
}
