//! Reader/writer registry (§4.6): tracks every currently-active read
//! timestamp so shard GC knows how far back a version chain must be kept.
//!
//! Each `begin_read`/`begin_snapshot` call registers its pinned timestamp
//! here and unregisters automatically when the returned handle drops —
//! callers can't forget to unregister, only forget to hold the handle.

use crate::ids::Timestamp;
use crate::sync::{AtomicU64, Mutex, Ordering};
use rustc_hash::FxHashMap;

/// Registry of active reader timestamps.
pub struct ReaderRegistry {
    next_id: AtomicU64,
    active: Mutex<FxHashMap<u64, Timestamp>>,
}

impl ReaderRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            active: Mutex::new(FxHashMap::default()),
        }
    }

    /// Pins `read_ts` as in-use until the returned handle is dropped.
    #[must_use]
    pub fn register(&self, read_ts: Timestamp) -> ReaderHandle<'_> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.active.lock().insert(id, read_ts);
        ReaderHandle { registry: self, id }
    }

    /// Every timestamp currently pinned by an active reader/snapshot.
    #[must_use]
    pub fn active_reader_timestamps(&self) -> Vec<Timestamp> {
        self.active.lock().values().copied().collect()
    }

    /// Number of active read/snapshot transactions.
    #[must_use]
    pub fn read_txn_count(&self) -> usize {
        self.active.lock().len()
    }

    /// The oldest pinned timestamp, or `fallback` if nothing is pinned —
    /// the floor below which shard GC may truncate version chains.
    #[must_use]
    pub fn min_active_timestamp(&self, fallback: Timestamp) -> Timestamp {
        self.active.lock().values().copied().min().unwrap_or(fallback)
    }

    fn unregister(&self, id: u64) {
        self.active.lock().remove(&id);
    }
}

impl Default for ReaderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII pin on a read timestamp; dropping it unregisters automatically.
pub struct ReaderHandle<'a> {
    registry: &'a ReaderRegistry,
    id: u64,
}

impl ReaderHandle<'_> {
    /// Returns the registration id, for tests that need to distinguish
    /// handles.
    #[cfg(test)]
    fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for ReaderHandle<'_> {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}
