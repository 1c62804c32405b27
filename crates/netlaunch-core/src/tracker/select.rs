//! Choosing the next job for an idle worker.

use std::sync::{Arc, Weak};

use super::pool::{Job, PoolState};
use crate::resource::ResourceState;

/// Picks the next job; called with the pool lock held.
///
/// Queued connect work goes before queued body transfers; ties go to the
/// tracker with the fewest busy workers, then to queue order. With nothing
/// queued, an uninitialized resource of a prefetching tracker is started.
pub(crate) fn next_job(state: &mut PoolState) -> Option<Job> {
    state.queue.retain(|job| {
        let s = job.resource.state();
        s.needs_connect() || s.needs_download()
    });

    let best = state
        .queue
        .iter()
        .enumerate()
        .min_by_key(|(i, job)| {
            let phase = if job.resource.state().needs_connect() { 0 } else { 1 };
            let busy = state.active.get(&job.tracker).copied().unwrap_or(0);
            (phase, busy, *i)
        })
        .map(|(i, _)| i);
    if let Some(i) = best {
        return state.queue.remove(i);
    }
    prefetch(state)
}

fn prefetch(state: &mut PoolState) -> Option<Job> {
    state.trackers.retain(|t| t.strong_count() > 0);
    let mut trackers: Vec<_> = state
        .trackers
        .iter()
        .filter_map(Weak::upgrade)
        .filter(|t| t.prefetch)
        .collect();
    trackers.sort_by_key(|t| state.active.get(&t.id).copied().unwrap_or(0));

    for tracker in trackers {
        for resource in tracker.resources() {
            let mut inner = resource.lock();
            if inner.state != ResourceState::Uninitialized {
                continue;
            }
            inner.download_requested = true;
            if resource
                .transition(&mut inner, ResourceState::ConnectPending)
                .is_ok()
            {
                drop(inner);
                tracing::debug!(resource = %resource.location(), "prefetching");
                return Some(Job {
                    tracker: tracker.id,
                    resource: Arc::clone(&resource),
                });
            }
        }
    }
    None
}
