//! Bounded frame history (ring buffer of the most recent entries).

use crate::frame::FrameEntry;
use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock};

/// Fixed-capacity FIFO of the most recent frame entries.
///
/// One writer (the pipeline) appends; any number of readers take
/// snapshots concurrently. Eviction is strictly oldest-first.
#[derive(Debug)]
pub struct FrameHistoryBuffer {
    capacity: usize,
    entries: RwLock<VecDeque<Arc<FrameEntry>>>,
}

impl FrameHistoryBuffer {
    /// Creates an empty buffer holding at most `capacity` entries (min 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends an entry at the tail, evicting the head when full.
    ///
    /// Returns the shared handle that was stored.
    pub fn append(&self, entry: FrameEntry) -> Arc<FrameEntry> {
        let entry = Arc::new(entry);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(Arc::clone(&entry));

        entry
    }

    /// Copies out the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<Arc<FrameEntry>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
