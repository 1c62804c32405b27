//! Temp-file writer for cache slots with atomic finalize.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// Suffix of a slot body while it is being written.
pub const TEMP_SUFFIX: &str = ".part";

/// Appends `.part` to the final path (`app.jar` -> `app.jar.part`).
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

/// Creates the temp file; `preallocate` then `build`.
pub struct SlotWriterBuilder {
    file: File,
    temp_path: PathBuf,
}

impl SlotWriterBuilder {
    /// Truncates any stale temp file left by an interrupted download.
    pub fn create(temp_path: &Path) -> Result<Self> {
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(temp_path)
            .with_context(|| format!("failed to create temp file: {}", temp_path.display()))?;
        Ok(Self {
            file,
            temp_path: temp_path.to_path_buf(),
        })
    }

    /// Reserves `size` bytes up front (`posix_fallocate` on Unix). The file is
    /// truncated back to the written length on finalize.
    pub fn preallocate(&mut self, size: u64) -> Result<()> {
        #[cfg(unix)]
        {
            let fd = self.file.as_raw_fd();
            let r = unsafe { libc::posix_fallocate(fd, 0, size as libc::off_t) };
            if r == 0 {
                return Ok(());
            }
            tracing::debug!(errno = r, "posix_fallocate failed, falling back to set_len");
        }
        self.file
            .set_len(size)
            .context("failed to preallocate cache slot")?;
        Ok(())
    }

    pub fn build(self) -> SlotWriter {
        SlotWriter {
            file: self.file,
            temp_path: self.temp_path,
            written: 0,
        }
    }
}

/// Sequential writer for one slot body.
pub struct SlotWriter {
    file: File,
    temp_path: PathBuf,
    written: u64,
}

impl SlotWriter {
    pub fn write_chunk(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.file.write_all(data)?;
        self.written += data.len() as u64;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Trims preallocated space, syncs, and renames onto `final_path`.
    pub fn finalize(self, final_path: &Path) -> Result<()> {
        self.file
            .set_len(self.written)
            .context("failed to trim cache slot")?;
        self.file.sync_all().context("cache slot sync failed")?;
        let temp_path = self.temp_path.clone();
        drop(self.file);
        std::fs::rename(&temp_path, final_path).with_context(|| {
            format!(
                "failed to rename {} to {}",
                temp_path.display(),
                final_path.display()
            )
        })?;
        Ok(())
    }

    /// Removes the temp file after a failed transfer.
    pub fn discard(self) {
        let temp_path = self.temp_path.clone();
        drop(self.file);
        let _ = std::fs::remove_file(temp_path);
    }
}
