//! Exclusive per-slot locks.
//!
//! Two layers: a process-local table so threads of one process queue up
//! without touching the filesystem, and `flock(2)` on a `.lock` file so
//! separate processes sharing a cache directory do not write the same slot.

use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};

use anyhow::{Context, Result};
#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// Slots currently locked by this process.
#[derive(Debug, Default)]
pub struct LockTable {
    held: Mutex<HashSet<PathBuf>>,
    released: Condvar,
}

impl LockTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Blocks until `lock_file` is free in this process and for other processes.
    pub fn acquire(self: &Arc<Self>, lock_file: &Path) -> Result<EntryLock> {
        {
            let mut held = self
                .held
                .lock()
                .map_err(|_| anyhow::anyhow!("lock table poisoned"))?;
            while held.contains(lock_file) {
                held = self
                    .released
                    .wait(held)
                    .map_err(|_| anyhow::anyhow!("lock table poisoned"))?;
            }
            held.insert(lock_file.to_path_buf());
        }
        // From here on the guard releases the table slot on any error.
        let mut guard = EntryLock {
            table: Arc::clone(self),
            key: lock_file.to_path_buf(),
            file: None,
        };
        if let Some(parent) = lock_file.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let file = File::options()
            .create(true)
            .write(true)
            .truncate(false)
            .open(lock_file)
            .with_context(|| format!("open lock file {}", lock_file.display()))?;
        #[cfg(unix)]
        {
            let r = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
            if r != 0 {
                return Err(std::io::Error::last_os_error())
                    .with_context(|| format!("flock {}", lock_file.display()));
            }
        }
        guard.file = Some(file);
        Ok(guard)
    }

    pub fn is_held(&self, lock_file: &Path) -> bool {
        self.held
            .lock()
            .map(|h| h.contains(lock_file))
            .unwrap_or(false)
    }
}

/// Held slot lock; released on drop.
#[derive(Debug)]
pub struct EntryLock {
    table: Arc<LockTable>,
    key: PathBuf,
    file: Option<File>,
}

impl EntryLock {
    pub fn path(&self) -> &Path {
        &self.key
    }
}

impl Drop for EntryLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            if let Some(file) = &self.file {
                unsafe {
                    libc::flock(file.as_raw_fd(), libc::LOCK_UN);
                }
            }
        }
        self.file = None;
        if let Ok(mut held) = self.table.held.lock() {
            held.remove(&self.key);
        }
        self.table.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[test]
    fn second_holder_waits_for_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slot.lock");
        let table = LockTable::new();
        let first = table.acquire(&path).unwrap();
        assert!(table.is_held(&path));

        let acquired = Arc::new(AtomicBool::new(false));
        let handle = {
            let table = Arc::clone(&table);
            let path = path.clone();
            let acquired = Arc::clone(&acquired);
            std::thread::spawn(move || {
                let _second = table.acquire(&path).unwrap();
                acquired.store(true, Ordering::SeqCst);
            })
        };
        std::thread::sleep(Duration::from_millis(50));
        assert!(!acquired.load(Ordering::SeqCst));
        drop(first);
        handle.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
        assert!(!table.is_held(&path));
    }
}
