//! FIFO work queue feeding the ingestion worker.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use crate::catalog::PlaylistItem;

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<PlaylistItem>,
    seen: HashSet<String>,
}

/// Ordered queue of playlist items awaiting download.
///
/// An item whose `source_id` was already enqueued during this queue's
/// lifetime is ignored, even after it has been dequeued. The length is read
/// straight from the underlying deque.
#[derive(Debug, Default)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a queue pre-filled with `items`.
    pub fn from_items(items: impl IntoIterator<Item = PlaylistItem>) -> Self {
        let queue = Self::new();
        queue.enqueue_all(items);
        queue
    }

    /// Append an item. Returns false if its `source_id` was seen before.
    pub fn enqueue(&self, item: PlaylistItem) -> bool {
        let mut state = self.lock();
        if !state.seen.insert(item.source_id.clone()) {
            return false;
        }
        state.items.push_back(item);
        true
    }

    /// Append items in order, returning how many were accepted.
    pub fn enqueue_all(&self, items: impl IntoIterator<Item = PlaylistItem>) -> usize {
        items
            .into_iter()
            .filter(|item| {
                let accepted = self.enqueue(item.clone());
                if !accepted {
                    tracing::debug!("Ignoring duplicate playlist item {}", item.source_id);
                }
                accepted
            })
            .count()
    }

    /// Remove the oldest item, if any. Never blocks waiting for items.
    pub fn dequeue(&self) -> Option<PlaylistItem> {
        self.lock().items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        // Each mutation completes under the lock, so a poisoned state is still consistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
