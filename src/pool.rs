//! Segment/property block allocators with per-worker caches.
//!
//! Adjacency segments (`Vec<VertexId>`) and property vectors are allocated
//! and freed at high frequency during ingest. Rather than going through the
//! global allocator on every split/merge, each worker thread keeps a small
//! free list of previously-freed buffers of the configured capacity and
//! reuses them; only when a thread's local cache is empty does it fall back
//! to a shared, lock-protected pool (used by threads that never warmed up a
//! local cache, e.g. a one-off light-write caller).
//!
//! This mirrors the per-worker trace block described in the engine's design
//! notes: encapsulate per-thread allocator state as a thread-local cache,
//! falling back to a shared pool for unregistered threads.

use crate::sync::Mutex;
use std::cell::RefCell;

const SHARED_POOL_CAP: usize = 4096;

thread_local! {
    static SEGMENT_CACHE: RefCell<Vec<Vec<u64>>> = const { RefCell::new(Vec::new()) };
}

/// Pool of `Vec<u64>` buffers backing adjacency segments (clustered windows
/// and range-tree inner segments).
pub struct SegmentPool {
    shared: Mutex<Vec<Vec<u64>>>,
    capacity: usize,
}

impl SegmentPool {
    /// Creates a pool that hands out buffers pre-reserved to `capacity`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Mutex::new(Vec::new()),
            capacity,
        }
    }

    /// Acquires an empty buffer with at least `capacity` reserved.
    #[must_use]
    pub fn acquire(&self) -> Vec<u64> {
        if let Some(buf) = SEGMENT_CACHE.with(|cache| cache.borrow_mut().pop()) {
            return buf;
        }
        if let Some(buf) = self.shared.lock().pop() {
            return buf;
        }
        Vec::with_capacity(self.capacity)
    }

    /// Returns a buffer to the pool for reuse, clearing its contents first.
    pub fn release(&self, mut buf: Vec<u64>) {
        buf.clear();
        let overflowed = SEGMENT_CACHE.with(|cache| {
            let mut cache = cache.borrow_mut();
            if cache.len() < 64 {
                cache.push(buf);
                None
            } else {
                Some(std::mem::take(&mut buf))
            }
        });
        if let Some(buf) = overflowed {
            let mut shared = self.shared.lock();
            if shared.len() < SHARED_POOL_CAP {
                shared.push(buf);
            }
        }
    }
}

impl Default for SegmentPool {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Pool of property-vector buffers, one instance per scalar property slot
/// width configured on the engine.
pub struct PropertyPool<T> {
    shared: Mutex<Vec<Vec<T>>>,
}

impl<T> PropertyPool<T> {
    /// Creates an empty property pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Mutex::new(Vec::new()),
        }
    }

    /// Acquires an empty buffer, reusing a freed one if available.
    #[must_use]
    pub fn acquire(&self, capacity: usize) -> Vec<T> {
        if let Some(mut buf) = self.shared.lock().pop() {
            buf.reserve(capacity.saturating_sub(buf.capacity()));
            return buf;
        }
        Vec::with_capacity(capacity)
    }

    /// Returns a buffer to the pool for reuse.
    pub fn release(&self, mut buf: Vec<T>) {
        buf.clear();
        let mut shared = self.shared.lock();
        if shared.len() < SHARED_POOL_CAP {
            shared.push(buf);
        }
    }
}

impl<T> Default for PropertyPool<T> {
    fn default() -> Self {
        Self::new()
    }
}
