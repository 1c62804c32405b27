//! Shared loader instances with explicit use counts.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Identity of a shared loader: the descriptor's unique key plus the
/// location the descriptor was loaded from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoaderKey {
    pub unique_key: String,
    pub location: String,
}

struct Slot<L> {
    loader: Arc<L>,
    uses: usize,
}

/// Outcome of [`LoaderRegistry::insert_or_existing`].
pub enum Inserted<L> {
    New(Arc<L>),
    /// Another loader with the same key won; its use count was bumped.
    Existing(Arc<L>),
}

/// Process-wide map from loader identity to instance. Entries leave only
/// when their use count drops to zero.
pub struct LoaderRegistry<L> {
    slots: Mutex<HashMap<LoaderKey, Slot<L>>>,
}

impl<L> Default for LoaderRegistry<L> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<L> LoaderRegistry<L> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the registered loader and counts one more use.
    pub fn acquire_existing(&self, key: &LoaderKey) -> Option<Arc<L>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get_mut(key).map(|slot| {
            slot.uses += 1;
            Arc::clone(&slot.loader)
        })
    }

    /// Registers `loader` with one use unless `key` is taken.
    pub fn insert_or_existing(&self, key: LoaderKey, loader: Arc<L>) -> Inserted<L> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = slots.get_mut(&key) {
            slot.uses += 1;
            return Inserted::Existing(Arc::clone(&slot.loader));
        }
        slots.insert(
            key,
            Slot {
                loader: Arc::clone(&loader),
                uses: 1,
            },
        );
        Inserted::New(loader)
    }

    /// Drops one use; returns the loader once it is evicted.
    pub fn release(&self, key: &LoaderKey) -> Option<Arc<L>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = slots.get_mut(key)?;
        slot.uses = slot.uses.saturating_sub(1);
        if slot.uses > 0 {
            return None;
        }
        slots.remove(key).map(|s| s.loader)
    }

    pub fn use_count(&self, key: &LoaderKey) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map_or(0, |s| s.uses)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every entry regardless of use count.
    pub fn drain(&self) -> Vec<Arc<L>> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, s)| s.loader)
            .collect()
    }
}
