//! Bounded downloader pool shared by every tracker of a download context.
//!
//! The queue, the per-tracker active counts and the worker count sit behind
//! one coordination lock. A resource lock may be taken while the pool lock
//! is held, never the other way round.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use super::{download, select, DownloadContext, TrackerShared};
use crate::resource::Resource;

/// A resource queued on behalf of one tracker.
pub(crate) struct Job {
    pub(crate) tracker: u64,
    pub(crate) resource: Arc<Resource>,
}

#[derive(Default)]
pub(crate) struct PoolState {
    pub(crate) queue: VecDeque<Job>,
    /// Trackers eligible for prefetch scheduling.
    pub(crate) trackers: Vec<Weak<TrackerShared>>,
    /// Workers currently busy per tracker id.
    pub(crate) active: HashMap<u64, usize>,
    pub(crate) workers: usize,
}

pub(crate) struct WorkerPool {
    max_workers: usize,
    state: Mutex<PoolState>,
}

impl WorkerPool {
    pub(crate) fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
            state: Mutex::new(PoolState::default()),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn max_workers(&self) -> usize {
        self.max_workers
    }
}

/// Queues `job` and makes sure a worker will pick it up.
pub(crate) fn enqueue(ctx: &Arc<DownloadContext>, state: &mut PoolState, job: Job) {
    state.queue.push_back(job);
    ensure_worker(ctx, state);
}

/// Spawns a worker unless the pool is at its limit.
pub(crate) fn ensure_worker(ctx: &Arc<DownloadContext>, state: &mut PoolState) {
    if state.workers >= ctx.pool.max_workers() {
        return;
    }
    state.workers += 1;
    let worker_ctx = Arc::clone(ctx);
    let spawned = std::thread::Builder::new()
        .name("netlaunch-download".to_string())
        .spawn(move || worker_loop(worker_ctx));
    if let Err(e) = spawned {
        state.workers -= 1;
        tracing::error!("failed to spawn download worker: {}", e);
    }
}

fn worker_loop(ctx: Arc<DownloadContext>) {
    tracing::trace!("download worker started");
    loop {
        let job = {
            let mut state = ctx.pool.lock();
            match select::next_job(&mut state) {
                Some(job) => {
                    *state.active.entry(job.tracker).or_insert(0) += 1;
                    job
                }
                None => {
                    state.workers -= 1;
                    tracing::trace!("download worker idle, exiting");
                    return;
                }
            }
        };

        download::process(&ctx, &job.resource);

        let mut state = ctx.pool.lock();
        if let Some(n) = state.active.get_mut(&job.tracker) {
            *n = n.saturating_sub(1);
            if *n == 0 {
                state.active.remove(&job.tracker);
            }
        }
        // Connected with a download requested: back into the queue.
        if job.resource.state().needs_download() {
            state.queue.push_back(job);
        }
    }
}
