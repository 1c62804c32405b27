//! Worker-side processing of one resource: the connect phase (negotiate a
//! URL, check cache currency) and the download phase (transfer into the
//! cache slot under its lock, then decode).

use std::fs;
use std::io;
use std::path::Path;

use anyhow::{anyhow, Result};
use url::Url;

use super::codec::{self, Encoding};
use super::negotiate::{candidate_urls, negotiate};
use super::DownloadContext;
use crate::cache::{temp_path, CacheEntry, SlotWriter};
use crate::http::ResponseMeta;
use crate::resource::{Resource, ResourceState};
use crate::retry::{run_with_retry, FetchError};

enum Phase {
    Connect,
    Download,
}

/// Runs whichever phase `resource` is pending for. Any failure moves the
/// resource to ERROR, which wakes every waiter.
pub(crate) fn process(ctx: &DownloadContext, resource: &Resource) {
    let phase = {
        let mut inner = resource.lock();
        let next = match inner.state {
            ResourceState::ConnectPending => (Phase::Connect, ResourceState::Connecting),
            ResourceState::DownloadPending => (Phase::Download, ResourceState::Downloading),
            // Another worker got here first.
            _ => return,
        };
        if resource.transition(&mut inner, next.1).is_err() {
            return;
        }
        next.0
    };
    let result = match phase {
        Phase::Connect => connect(ctx, resource),
        Phase::Download => download(ctx, resource),
    };
    if let Err(e) = result {
        resource.fail(&format_args!("{:#}", e));
    }
}

fn connect(ctx: &DownloadContext, resource: &Resource) -> Result<()> {
    let location = resource.location();
    let version = resource.version_str();
    let options = resource.lock().options;
    let candidates = candidate_urls(
        location,
        resource.requested_version(),
        options,
        ctx.unpacker.is_some(),
    );
    let negotiated = negotiate(&ctx.http, &ctx.retry, ctx.allow_redirects, candidates)?
        .ok_or_else(|| anyhow!("no candidate URL for {} answered", location))?;

    if let (Some(requested), Some(got)) = (
        resource.requested_version(),
        negotiated.meta.version_id.as_deref(),
    ) {
        if !requested.contains(got) {
            return Err(FetchError::VersionMismatch {
                requested: requested.as_str().to_string(),
                got: got.to_string(),
            }
            .into());
        }
    }

    let current = if ctx.cache.is_cacheable(location, version) {
        match (
            ctx.cache.cached_file(location, version),
            ctx.cache.entry(location, version),
        ) {
            (Some(file), Some(mut entry)) if entry.is_current(&negotiated.meta) => {
                entry.mark_checked();
                ctx.cache.store_entry(&entry)?;
                let size = match entry.size {
                    Some(s) => s,
                    None => fs::metadata(&file)?.len(),
                };
                Some((file, size))
            }
            _ => None,
        }
    } else {
        None
    };

    let mut inner = resource.lock();
    inner.download_url = Some(negotiated.url.clone());
    inner.content_encoding = negotiated.meta.content_encoding.clone();
    inner.download_version = negotiated.meta.version_id.clone();
    match current {
        Some((file, size)) => {
            tracing::debug!(resource = %location, "cached copy is current");
            inner.local_file = Some(file);
            inner.size = Some(size);
            inner.transferred = size;
            resource.transition(&mut inner, ResourceState::Downloaded)?;
        }
        None => {
            inner.size = negotiated.meta.content_length;
            let next = if inner.download_requested {
                ResourceState::DownloadPending
            } else {
                ResourceState::Connected
            };
            resource.transition(&mut inner, next)?;
        }
    }
    Ok(())
}

fn download(ctx: &DownloadContext, resource: &Resource) -> Result<()> {
    let location = resource.location();
    let version = resource.version_str();
    let (url, size_hint) = {
        let inner = resource.lock();
        (
            inner.download_url.clone().unwrap_or_else(|| location.clone()),
            inner.size,
        )
    };

    let _slot_lock = ctx.cache.lock(location, version)?;
    let slot = ctx.cache.slot_path(location, version);
    tracing::info!(resource = %location, from = %url, "downloading");

    let (meta, writer) = run_with_retry(&ctx.retry, || {
        fetch_body(ctx, resource, &url, size_hint)
    })?;
    store_body(ctx, &url, &meta, writer, &slot)?;

    let len = fs::metadata(&slot)?.len();
    let mut entry = CacheEntry::new(location, version);
    entry.record_response(&meta);
    entry.size = Some(len);
    ctx.cache.store_entry(&entry)?;

    let mut inner = resource.lock();
    inner.local_file = Some(slot);
    inner.size = Some(len);
    inner.transferred = len;
    resource.transition(&mut inner, ResourceState::Downloaded)?;
    Ok(())
}

/// One GET attempt into a fresh temp file, with progress published on the
/// resource after every chunk.
fn fetch_body(
    ctx: &DownloadContext,
    resource: &Resource,
    url: &Url,
    size_hint: Option<u64>,
) -> Result<(ResponseMeta, SlotWriter), FetchError> {
    let mut writer = ctx
        .cache
        .writer(resource.location(), resource.version_str(), size_hint)
        .map_err(storage_error)?;
    resource.lock().transferred = 0;
    let result = ctx.http.get(url, |chunk| {
        writer.write_chunk(chunk)?;
        resource.lock().transferred += chunk.len() as u64;
        resource.notify();
        Ok(())
    });
    let meta = match result {
        Ok(meta) => meta,
        Err(e) => {
            writer.discard();
            return Err(e);
        }
    };
    if let Some(expected) = meta.content_length {
        if writer.written() < expected {
            let received = writer.written();
            writer.discard();
            return Err(FetchError::PartialTransfer { expected, received });
        }
    }
    Ok((meta, writer))
}

/// Moves the raw transfer into `slot`, decoding gzip and pack200 bodies.
fn store_body(
    ctx: &DownloadContext,
    url: &Url,
    meta: &ResponseMeta,
    writer: SlotWriter,
    slot: &Path,
) -> Result<()> {
    let encoding = Encoding::detect(meta, url);
    if encoding == Encoding::Identity {
        return writer.finalize(slot);
    }
    let mut raw_name = slot.file_name().unwrap_or_default().to_os_string();
    raw_name.push(".raw");
    let raw = slot.with_file_name(raw_name);
    writer.finalize(&raw)?;

    let decoded_tmp = temp_path(slot);
    let decoded = codec::decode(encoding, &raw, &decoded_tmp, ctx.unpacker.as_deref());
    let _ = fs::remove_file(&raw);
    if let Err(e) = decoded {
        let _ = fs::remove_file(&decoded_tmp);
        return Err(FetchError::Decode(format!("{:#}", e)).into());
    }
    tracing::debug!(slot = %slot.display(), ?encoding, "decoded transfer");
    fs::rename(&decoded_tmp, slot)?;
    Ok(())
}

fn storage_error(e: anyhow::Error) -> FetchError {
    FetchError::Storage(io::Error::new(io::ErrorKind::Other, format!("{:#}", e)))
}
