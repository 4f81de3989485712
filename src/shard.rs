//! A shard: one writer-serialized version chain over a fixed range of
//! vertex ids (§4.2).
//!
//! Exactly one writer may build a new version at a time (`write_lock`);
//! readers never block on it — they read whichever version was head when
//! their transaction began and walk `next` pointers for anything older.
//! Commit publishes the new version as head and then walks the chain
//! truncating anything no active reader can still reach; `Arc` reclaims
//! the truncated tail once the last reference to it drops. The original
//! engine's resource-type bookkeeping (direct free vs. refcount-decrement)
//! collapses to this single truncation because `Arc`'s strong count already
//! tracks exactly that distinction.

use crate::ids::Timestamp;
use crate::sync::{Arc, Mutex, MutexGuard};
use crate::version::Version;
use arc_swap::ArcSwap;

/// One shard's version chain and writer lock.
pub struct Shard {
    head: ArcSwap<Version>,
    write_lock: Mutex<()>,
    shard_size: usize,
}

impl Shard {
    /// Creates a shard with a single empty version at timestamp 0.
    #[must_use]
    pub fn new(shard_size: usize, vertex_property_columns: usize, vertex_string_columns: usize) -> Self {
        Self {
            head: ArcSwap::from_pointee(Version::empty(shard_size, vertex_property_columns, vertex_string_columns)),
            write_lock: Mutex::new(()),
            shard_size,
        }
    }

    #[must_use]
    pub fn shard_size(&self) -> usize {
        self.shard_size
    }

    /// The current head version.
    #[must_use]
    pub fn head(&self) -> Arc<Version> {
        self.head.load_full()
    }

    /// The newest version with `timestamp <= read_ts`, walking the chain
    /// from head.
    #[must_use]
    pub fn find_version(&self, read_ts: Timestamp) -> Arc<Version> {
        let mut v = self.head.load_full();
        while v.timestamp > read_ts {
            match v.next() {
                Some(next) => v = next,
                None => break,
            }
        }
        v
    }

    /// Acquires the per-shard writer lock and forks a new version from the
    /// current head at `timestamp`, ready for in-place mutation.
    #[must_use]
    pub fn begin_write(&self, timestamp: Timestamp) -> ShardWriteGuard<'_> {
        let lock = self.write_lock.lock();
        let base = self.head.load_full();
        let new_version = base.fork(timestamp);
        ShardWriteGuard {
            shard: self,
            _lock: lock,
            base,
            new_version: Some(new_version),
        }
    }

    /// Drops every version no active reader can reach: the newest version
    /// with `timestamp <= min_reader_ts` has its `next` truncated.
    fn gc(&self, min_reader_ts: Timestamp) {
        let mut v = self.head.load_full();
        loop {
            if v.timestamp <= min_reader_ts {
                tracing::trace!(kept_at = v.timestamp, min_reader_ts, "truncating shard version chain");
                v.cut_tail();
                return;
            }
            match v.next() {
                Some(next) => v = next,
                None => return,
            }
        }
    }
}

/// A held writer lock with an in-progress, unpublished version.
pub struct ShardWriteGuard<'a> {
    shard: &'a Shard,
    _lock: MutexGuard<'a, ()>,
    base: Arc<Version>,
    new_version: Option<Version>,
}

impl<'a> ShardWriteGuard<'a> {
    /// Mutable access to the version under construction.
    pub fn version_mut(&mut self) -> &mut Version {
        self.new_version.as_mut().expect("write guard used after commit/abort")
    }

    /// Publishes the new version as head and reclaims anything no active
    /// reader can still see.
    pub fn commit(mut self, min_reader_ts: Timestamp) -> Arc<Version> {
        let new_version = self.new_version.take().expect("commit called twice");
        new_version.link(self.base.clone());
        let published = Arc::new(new_version);
        self.shard.head.store(published.clone());
        self.shard.gc(min_reader_ts);
        published
    }

    /// Discards the in-progress version without publishing it.
    pub fn abort(mut self) {
        self.new_version = None;
    }
}
