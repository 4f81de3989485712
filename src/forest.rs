//! Shard forest: a flat, resizable table of shards keyed by the high bits
//! of a vertex id (§4.1).
//!
//! The forest grows lazily — a shard is created the first time a vertex
//! routes to an index past the current table length — under a single
//! growth lock that only the rare resize path ever touches; steady-state
//! routing is a read on an `RwLock<Vec<Arc<Shard>>>` shared by every
//! transaction.

use crate::ids::{route, VertexId};
use crate::shard::Shard;
use crate::sync::{Arc, RwLock};

/// The shard table, indexed by `vertex >> vertex_group_bits`.
pub struct ShardForest {
    shards: RwLock<Vec<Arc<Shard>>>,
    vertex_group_bits: u32,
    shard_size: usize,
    vertex_property_columns: usize,
    vertex_string_columns: usize,
}

impl ShardForest {
    /// Creates an empty forest; shards are created on first use.
    #[must_use]
    pub fn new(vertex_group_bits: u32, vertex_property_columns: usize, vertex_string_columns: usize) -> Self {
        Self {
            shards: RwLock::new(Vec::new()),
            vertex_group_bits,
            shard_size: 1usize << vertex_group_bits,
            vertex_property_columns,
            vertex_string_columns,
        }
    }

    /// Number of shards currently allocated.
    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.shards.read().len()
    }

    /// Splits `vertex` into `(shard_index, local_slot)`.
    #[must_use]
    pub fn route(&self, vertex: VertexId) -> (u64, u8) {
        route(vertex, self.vertex_group_bits)
    }

    /// Returns the shard at `shard_index`, creating it (and any shards
    /// before it) if this is the first time it's addressed.
    #[must_use]
    pub fn locate(&self, shard_index: u64) -> Arc<Shard> {
        {
            let shards = self.shards.read();
            if let Some(shard) = shards.get(shard_index as usize) {
                return shard.clone();
            }
        }
        let mut shards = self.shards.write();
        while (shards.len() as u64) <= shard_index {
            tracing::debug!(shard_index = shards.len(), shard_size = self.shard_size, "growing shard forest");
            shards.push(Arc::new(Shard::new(
                self.shard_size,
                self.vertex_property_columns,
                self.vertex_string_columns,
            )));
        }
        shards[shard_index as usize].clone()
    }

    /// Returns the shard owning `vertex`, creating it if needed.
    #[must_use]
    pub fn locate_for_vertex(&self, vertex: VertexId) -> Arc<Shard> {
        let (shard_index, _) = self.route(vertex);
        self.locate(shard_index)
    }

    /// Returns every currently-allocated shard, in index order. Used by
    /// approximate global counters and full scans.
    #[must_use]
    pub fn all_shards(&self) -> Vec<Arc<Shard>> {
        self.shards.read().clone()
    }
}
