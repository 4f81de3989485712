//! Clustered inline storage: the low-degree tier of neighborhoods (§4.3).
//!
//! Several low-degree vertices share one contiguous buffer. Each vertex
//! owns an exact-sized run within it, addressed by `(offset, degree)` (the
//! `neighbor_offset`/`degree` fields of its vertex-table slot). Growing a
//! vertex's run relocates it to a fresh range — a free slot reclaimed from
//! a prior removal/relocation if one fits, or the end of the buffer
//! otherwise — and frees the old range. When the fraction of free space
//! crosses a threshold, `compact` rebuilds the buffer densely.
//!
//! This mirrors a contiguous arena with a free-slot list and
//! fragmentation-triggered compaction, generalized from a single shared
//! buffer to `VertexId` neighbor lists instead of arbitrary property blobs.
//!
//! This is a flat single-arena design rather than the node/key-directory
//! structure described for this tier elsewhere (nodes keyed by their
//! smallest member, located by binary search over a key directory, split at
//! a middle slot once a segment overflows): the `slots` map already gives
//! O(1) locate-by-vertex, which is what that key directory exists to
//! provide, so a second indirection layer over groups of vertices would add
//! cost without adding capability here. See `DESIGN.md` for the full
//! writeup, including which tier-level testable properties carry over and
//! which don't apply to this substitution.

use crate::ids::VertexId;
use crate::pool::SegmentPool;
use crate::sync::Arc;
use rustc_hash::FxHashMap;

/// Fraction of the buffer that must be free before `maybe_compact` rebuilds
/// it.
const COMPACTION_THRESHOLD: f64 = 0.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Slot {
    offset: usize,
    len: usize,
}

/// The contiguous neighbor buffer shared by a shard version's clustered
/// (non-independent) vertices. Whole-buffer rebuilds (`compact`, and the
/// block's own teardown) go through a `SegmentPool` rather than the global
/// allocator, one per clustered block and shared across every version forked
/// from it — forking only clones the `Arc`, not the pool's cached buffers.
#[derive(Clone)]
pub struct ClusteredBlock {
    data: Vec<VertexId>,
    slots: FxHashMap<VertexId, Slot>,
    free: Vec<Slot>,
    free_len: usize,
    pool: Arc<SegmentPool>,
}

impl ClusteredBlock {
    /// An empty clustered block.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            slots: FxHashMap::default(),
            free: Vec::new(),
            free_len: 0,
            pool: Arc::new(SegmentPool::default()),
        }
    }

    /// Number of vertices stored.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.slots.len()
    }

    /// Degree of `vertex`, or `None` if it isn't clustered here.
    #[must_use]
    pub fn degree(&self, vertex: VertexId) -> Option<usize> {
        self.slots.get(&vertex).map(|s| s.len)
    }

    /// Sorted neighbor slice for `vertex`.
    #[must_use]
    pub fn neighbors(&self, vertex: VertexId) -> Option<&[VertexId]> {
        let slot = self.slots.get(&vertex)?;
        Some(&self.data[slot.offset..slot.offset + slot.len])
    }

    /// Registers a new vertex with an empty neighbor list.
    pub fn insert_vertex(&mut self, vertex: VertexId) {
        self.slots.insert(vertex, Slot { offset: 0, len: 0 });
    }

    /// Drops `vertex` and reclaims its range.
    pub fn remove_vertex(&mut self, vertex: VertexId) {
        if let Some(slot) = self.slots.remove(&vertex) {
            if slot.len > 0 {
                self.free.push(slot);
                self.free_len += slot.len;
            }
        }
    }

    /// Inserts `target` into `vertex`'s neighbor list if absent. Returns
    /// `true` if an insertion happened.
    pub fn insert_edge(&mut self, vertex: VertexId, target: VertexId) -> bool {
        let Some(&slot) = self.slots.get(&vertex) else {
            return false;
        };
        let existing = &self.data[slot.offset..slot.offset + slot.len];
        if existing.binary_search(&target).is_ok() {
            return false;
        }
        let mut new_list = existing.to_vec();
        let pos = new_list.partition_point(|&v| v < target);
        new_list.insert(pos, target);
        self.relocate(vertex, slot, &new_list);
        true
    }

    /// Removes `target` from `vertex`'s neighbor list if present. Returns
    /// `true` if a removal happened.
    pub fn remove_edge(&mut self, vertex: VertexId, target: VertexId) -> bool {
        let Some(&slot) = self.slots.get(&vertex) else {
            return false;
        };
        let existing = &self.data[slot.offset..slot.offset + slot.len];
        let Ok(pos) = existing.binary_search(&target) else {
            return false;
        };
        let mut new_list = existing.to_vec();
        new_list.remove(pos);
        self.relocate(vertex, slot, &new_list);
        true
    }

    /// Merges a sorted, deduplicated batch of new targets into `vertex`'s
    /// neighbor list with a single relocate, instead of one relocate per
    /// edge the way repeated `insert_edge` calls would. Returns the number
    /// of targets actually inserted (targets already present are no-ops).
    pub fn insert_edges_batch(&mut self, vertex: VertexId, sorted_new_targets: &[VertexId]) -> usize {
        let Some(&slot) = self.slots.get(&vertex) else {
            return 0;
        };
        let existing = &self.data[slot.offset..slot.offset + slot.len];
        let mut new_list = Vec::with_capacity(existing.len() + sorted_new_targets.len());
        let (mut i, mut j) = (0, 0);
        let mut inserted = 0usize;
        while i < existing.len() && j < sorted_new_targets.len() {
            match existing[i].cmp(&sorted_new_targets[j]) {
                std::cmp::Ordering::Less => {
                    new_list.push(existing[i]);
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    new_list.push(sorted_new_targets[j]);
                    inserted += 1;
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    new_list.push(existing[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        new_list.extend_from_slice(&existing[i..]);
        while j < sorted_new_targets.len() {
            new_list.push(sorted_new_targets[j]);
            inserted += 1;
            j += 1;
        }
        if inserted == 0 {
            return 0;
        }
        self.relocate(vertex, slot, &new_list);
        inserted
    }

    /// Removes `vertex` from the block entirely, returning its sorted
    /// neighbor list (used when extracting to a private range tree).
    pub fn extract(&mut self, vertex: VertexId) -> Vec<VertexId> {
        let Some(slot) = self.slots.remove(&vertex) else {
            return Vec::new();
        };
        let neighbors = self.data[slot.offset..slot.offset + slot.len].to_vec();
        if slot.len > 0 {
            self.free.push(slot);
            self.free_len += slot.len;
        }
        neighbors
    }

    fn relocate(&mut self, vertex: VertexId, old_slot: Slot, new_list: &[VertexId]) {
        if old_slot.len > 0 {
            self.free.push(old_slot);
            self.free_len += old_slot.len;
        }
        let offset = self.allocate(new_list.len());
        self.data[offset..offset + new_list.len()].copy_from_slice(new_list);
        self.slots.insert(
            vertex,
            Slot {
                offset,
                len: new_list.len(),
            },
        );
        self.maybe_compact();
    }

    fn allocate(&mut self, len: usize) -> usize {
        if len == 0 {
            return self.data.len();
        }
        if let Some(pos) = self.free.iter().position(|f| f.len >= len) {
            let slot = self.free.remove(pos);
            self.free_len -= slot.len;
            if slot.len > len {
                self.free.push(Slot {
                    offset: slot.offset + len,
                    len: slot.len - len,
                });
                self.free_len += slot.len - len;
            }
            return slot.offset;
        }
        let offset = self.data.len();
        self.data.resize(offset + len, 0);
        offset
    }

    fn maybe_compact(&mut self) {
        if self.data.is_empty() {
            return;
        }
        if (self.free_len as f64) / (self.data.len() as f64) >= COMPACTION_THRESHOLD {
            self.compact();
        }
    }

    /// Rebuilds the buffer densely, eliminating all free-list fragments.
    /// The replaced buffer returns to the segment pool instead of the
    /// allocator.
    pub fn compact(&mut self) {
        let total: usize = self.slots.values().map(|s| s.len).sum();
        let mut new_data = self.pool.acquire();
        new_data.reserve(total.saturating_sub(new_data.capacity()));
        let mut new_slots = FxHashMap::with_capacity_and_hasher(self.slots.len(), Default::default());
        let mut entries: Vec<_> = self.slots.iter().map(|(&v, &s)| (v, s)).collect();
        entries.sort_by_key(|&(_, s)| s.offset);
        for (vertex, slot) in entries {
            let offset = new_data.len();
            new_data.extend_from_slice(&self.data[slot.offset..slot.offset + slot.len]);
            new_slots.insert(vertex, Slot { offset, len: slot.len });
        }
        let old_data = std::mem::replace(&mut self.data, new_data);
        self.pool.release(old_data);
        self.slots = new_slots;
        self.free.clear();
        self.free_len = 0;
    }
}

impl Default for ClusteredBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ClusteredBlock {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.data));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_read_neighbors() {
        let mut block = ClusteredBlock::new();
        block.insert_vertex(1);
        assert!(block.insert_edge(1, 30));
        assert!(block.insert_edge(1, 10));
        assert!(!block.insert_edge(1, 10));
        assert_eq!(block.neighbors(1), Some(&[10, 30][..]));
    }

    #[test]
    fn remove_edge_and_vertex() {
        let mut block = ClusteredBlock::new();
        block.insert_vertex(1);
        block.insert_edge(1, 5);
        block.insert_edge(1, 6);
        assert!(block.remove_edge(1, 5));
        assert!(!block.remove_edge(1, 5));
        assert_eq!(block.neighbors(1), Some(&[6][..]));

        block.remove_vertex(1);
        assert_eq!(block.neighbors(1), None);
    }

    #[test]
    fn extract_detaches_vertex_and_returns_sorted_neighbors() {
        let mut block = ClusteredBlock::new();
        block.insert_vertex(1);
        for n in [3u64, 1, 2] {
            block.insert_edge(1, n);
        }
        let extracted = block.extract(1);
        assert_eq!(extracted, vec![1, 2, 3]);
        assert_eq!(block.neighbors(1), None);
    }

    #[test]
    fn many_vertices_share_one_buffer_without_collision() {
        let mut block = ClusteredBlock::new();
        for v in 0u64..20 {
            block.insert_vertex(v);
            for n in 0u64..v % 5 {
                block.insert_edge(v, n * 100);
            }
        }
        for v in 0u64..20 {
            let expected: Vec<u64> = (0..v % 5).map(|n| n * 100).collect();
            assert_eq!(block.neighbors(v), Some(expected.as_slice()));
        }
    }

    #[test]
    fn insert_edges_batch_matches_sequential_inserts() {
        let mut sequential = ClusteredBlock::new();
        sequential.insert_vertex(1);
        for n in [30u64, 10, 5, 20] {
            sequential.insert_edge(1, n);
        }

        let mut batched = ClusteredBlock::new();
        batched.insert_vertex(1);
        let inserted = batched.insert_edges_batch(1, &[5, 10, 20, 30]);

        assert_eq!(inserted, 4);
        assert_eq!(batched.neighbors(1), sequential.neighbors(1));
    }

    #[test]
    fn insert_edges_batch_skips_targets_already_present() {
        let mut block = ClusteredBlock::new();
        block.insert_vertex(1);
        block.insert_edge(1, 10);
        let inserted = block.insert_edges_batch(1, &[5, 10, 15]);
        assert_eq!(inserted, 2);
        assert_eq!(block.neighbors(1), Some(&[5, 10, 15][..]));
    }

    #[test]
    fn compaction_preserves_all_neighbor_lists() {
        let mut block = ClusteredBlock::new();
        for v in 0u64..10 {
            block.insert_vertex(v);
            block.insert_edge(v, 1);
            block.insert_edge(v, 2);
        }
        for v in 0u64..10 {
            if v % 2 == 0 {
                block.remove_vertex(v);
            }
        }
        block.compact();
        for v in 0u64..10 {
            if v % 2 == 0 {
                assert_eq!(block.neighbors(v), None);
            } else {
                assert_eq!(block.neighbors(v), Some(&[1, 2][..]));
            }
        }
    }
}
