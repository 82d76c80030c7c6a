//! Run-wide map from entities to the wait lists holding them.

use std::sync::{Mutex, PoisonError};

use clockwork_core::{EntityId, QueueId};
use indexmap::{IndexMap, IndexSet};

/// Answers "is this entity queued, and where" for one run.
///
/// Shared between the wait lists of a run via `Arc`. Wait lists attach
/// on every successful insert and detach on every removal.
#[derive(Debug, Default)]
pub struct QueueDirectory {
    inner: Mutex<IndexMap<EntityId, IndexSet<QueueId>>>,
}

// Compile-time assertion: QueueDirectory must be Send + Sync.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<QueueDirectory>();
};

impl QueueDirectory {
    /// An empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `entity` waits in `queue`.
    pub fn attach(&self, entity: EntityId, queue: QueueId) {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.entry(entity).or_default().insert(queue);
    }

    /// Record that `entity` left `queue`.
    pub fn detach(&self, entity: EntityId, queue: QueueId) {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(set) = map.get_mut(&entity) {
            set.shift_remove(&queue);
            if set.is_empty() {
                map.swap_remove(&entity);
            }
        }
    }

    /// Wait lists currently holding `entity`, in the order it joined them.
    pub fn queues_of(&self, entity: EntityId) -> Vec<QueueId> {
        let map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.get(&entity)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Whether `entity` waits in any list.
    pub fn is_queued(&self, entity: EntityId) -> bool {
        let map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.contains_key(&entity)
    }
}
