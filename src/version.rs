//! Shard version: one immutable snapshot of every vertex local to a shard
//! (§4.3). A shard's version chain is a singly linked list of these,
//! newest first; each version's `next` points at the version it
//! succeeded. Readers that began before a commit keep walking the chain
//! by timestamp; once nothing references a tail version, `shard.rs`
//! truncates `next` and lets `Arc` reclaim it — no explicit free list.

use crate::clustered::ClusteredBlock;
use crate::ids::{Timestamp, VertexId};
use crate::neighborhood::Tier;
use crate::property::{PropertyMap, PropertyValue};
use crate::sync::Arc;
use arc_swap::ArcSwapOption;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// A vertex's entry in a shard version: which tier holds its neighbors.
#[derive(Clone)]
pub struct VertexEntry {
    pub tier: Tier,
}

/// Up to a handful of inline scalar properties per edge, keyed by `target`
/// within a bucket. Buckets are indexed by `Version::local_slot(src, ..)`, so
/// each bucket holds exactly one source vertex's out-edges and a write only
/// copy-on-writes that one bucket instead of the whole shard's edge
/// properties (§4.3.6).
pub type EdgePropertyBucket = Arc<FxHashMap<VertexId, SmallVec<[PropertyValue; 4]>>>;
pub type EdgePropertyMap = Vec<EdgePropertyBucket>;

/// Same bucketing as `EdgePropertyMap`, for the supplemented string-property
/// feature.
pub type EdgeStringPropertyBucket = Arc<FxHashMap<VertexId, SmallVec<[Option<Arc<str>>; 2]>>>;
pub type EdgeStringPropertyMap = Vec<EdgeStringPropertyBucket>;

/// One immutable snapshot of a shard's vertices.
pub struct Version {
    pub timestamp: Timestamp,
    vertex_table: Vec<Option<VertexEntry>>,
    clustered: ClusteredBlock,
    vertex_properties: PropertyMap,
    edge_properties: EdgePropertyMap,
    edge_string_properties: EdgeStringPropertyMap,
    next: ArcSwapOption<Version>,
}

impl Version {
    /// An empty version at timestamp 0, sized for `shard_size` local
    /// slots.
    #[must_use]
    pub fn empty(shard_size: usize, vertex_property_columns: usize, vertex_string_columns: usize) -> Self {
        Self {
            timestamp: 0,
            vertex_table: vec![None; shard_size],
            clustered: ClusteredBlock::new(),
            vertex_properties: PropertyMap::new(vertex_property_columns, vertex_string_columns, shard_size),
            edge_properties: vec![Arc::new(FxHashMap::default()); shard_size],
            edge_string_properties: vec![Arc::new(FxHashMap::default()); shard_size],
            next: ArcSwapOption::from(None),
        }
    }

    /// Clones this version's contents into a fresh, unlinked version at a
    /// new timestamp — the starting point for a writer building the next
    /// version. `next` is left empty; the writer links it to the
    /// predecessor once the new version is ready to publish.
    #[must_use]
    pub fn fork(&self, timestamp: Timestamp) -> Self {
        Self {
            timestamp,
            vertex_table: self.vertex_table.clone(),
            clustered: self.clustered.clone(),
            vertex_properties: self.vertex_properties.clone(),
            edge_properties: self.edge_properties.clone(),
            edge_string_properties: self.edge_string_properties.clone(),
            next: ArcSwapOption::from(None),
        }
    }

    /// Links this version behind its predecessor in the chain.
    pub fn link(&self, predecessor: Arc<Version>) {
        self.next.store(Some(predecessor));
    }

    /// The version this one succeeded, if the chain hasn't been truncated
    /// past it by GC.
    #[must_use]
    pub fn next(&self) -> Option<Arc<Version>> {
        self.next.load_full()
    }

    /// Truncates the chain so nothing points past this version, letting
    /// `Arc` reclaim anything further back once readers release it.
    pub fn cut_tail(&self) {
        self.next.store(None);
    }

    #[must_use]
    pub fn local_slot(vertex: VertexId, shard_size: usize) -> usize {
        debug_assert!(shard_size.is_power_of_two());
        (vertex as usize) & (shard_size - 1)
    }

    #[must_use]
    pub fn has_vertex(&self, vertex: VertexId, shard_size: usize) -> bool {
        self.vertex_table[Self::local_slot(vertex, shard_size)].is_some()
    }

    #[must_use]
    pub fn vertex_entry(&self, vertex: VertexId, shard_size: usize) -> Option<&VertexEntry> {
        self.vertex_table[Self::local_slot(vertex, shard_size)].as_ref()
    }

    #[must_use]
    pub fn clustered_block(&self) -> &ClusteredBlock {
        &self.clustered
    }

    #[must_use]
    pub fn degree(&self, vertex: VertexId, shard_size: usize) -> usize {
        match self.vertex_entry(vertex, shard_size) {
            Some(entry) => entry.tier.degree(vertex, &self.clustered),
            None => 0,
        }
    }

    #[must_use]
    pub fn has_edge(&self, src: VertexId, dst: VertexId, shard_size: usize) -> bool {
        match self.vertex_entry(src, shard_size) {
            Some(entry) => entry.tier.contains(src, dst, &self.clustered),
            None => false,
        }
    }

    pub fn for_each_neighbor(&self, vertex: VertexId, shard_size: usize, f: impl FnMut(VertexId)) {
        if let Some(entry) = self.vertex_entry(vertex, shard_size) {
            entry.tier.for_each(vertex, &self.clustered, f);
        }
    }

    #[must_use]
    pub fn intersect_neighbors(&self, vertex: VertexId, shard_size: usize, other_sorted: &[VertexId]) -> Vec<VertexId> {
        match self.vertex_entry(vertex, shard_size) {
            Some(entry) => entry.tier.intersect_sorted(vertex, &self.clustered, other_sorted),
            None => Vec::new(),
        }
    }

    /// Registers a brand-new vertex as clustered with no neighbors.
    pub fn insert_vertex(&mut self, vertex: VertexId, shard_size: usize) {
        let slot = Self::local_slot(vertex, shard_size);
        self.clustered.insert_vertex(vertex);
        self.vertex_table[slot] = Some(VertexEntry { tier: Tier::Clustered });
    }

    /// Removes a vertex and its neighbor storage, wherever it currently
    /// lives.
    pub fn remove_vertex(&mut self, vertex: VertexId, shard_size: usize) {
        let slot = Self::local_slot(vertex, shard_size);
        if let Some(entry) = self.vertex_table[slot].take() {
            if matches!(entry.tier, Tier::Clustered) {
                self.clustered.remove_vertex(vertex);
            }
        }
        self.vertex_properties.clear_entry(slot);
    }

    /// Inserts edge `src -> dst`, extracting/promoting `src`'s tier as
    /// thresholds dictate.
    pub fn insert_edge(
        &mut self,
        src: VertexId,
        dst: VertexId,
        shard_size: usize,
        range_leaf_size: usize,
        art_extract_threshold: usize,
        art_leaf_size: usize,
    ) {
        let slot = Self::local_slot(src, shard_size);
        let Some(entry) = self.vertex_table[slot].as_mut() else {
            return;
        };
        match std::mem::take(&mut entry.tier) {
            Tier::Clustered => {
                self.clustered.insert_edge(src, dst);
                let extract_at = range_leaf_size / 2;
                entry.tier = if self.clustered.degree(src).unwrap_or(0) > extract_at {
                    let neighbors = self.clustered.extract(src);
                    tracing::trace!(vertex = src, degree = neighbors.len(), "extracting vertex out of clustered block");
                    Tier::extracted_from_clustered(&neighbors, range_leaf_size, art_extract_threshold, art_leaf_size)
                } else {
                    Tier::Clustered
                };
            }
            tier => {
                entry.tier = tier.insert(dst, range_leaf_size, art_extract_threshold, art_leaf_size);
            }
        }
    }

    /// Registers a batch of brand-new vertices as clustered with no
    /// neighbors. No batching payoff over `insert_vertex` at this tier —
    /// `ClusteredBlock::insert_vertex` is already O(1) — but this keeps the
    /// batch entry point uniform for callers driving both vertex and edge
    /// batches through the same API.
    pub fn insert_vertices_batch(&mut self, vertices: &[VertexId], shard_size: usize) {
        for &v in vertices {
            self.insert_vertex(v, shard_size);
        }
    }

    /// Merges a sorted, deduplicated batch of new targets into `src`'s
    /// neighbor list with a single relocate/rebuild of its backing tier,
    /// instead of one relocate/rebuild per edge the way repeated
    /// `insert_edge` calls would. Returns the number of targets actually
    /// inserted.
    pub fn insert_edges_batch(
        &mut self,
        src: VertexId,
        sorted_dedup_targets: &[VertexId],
        shard_size: usize,
        range_leaf_size: usize,
        art_extract_threshold: usize,
        art_leaf_size: usize,
    ) -> usize {
        let slot = Self::local_slot(src, shard_size);
        let Some(entry) = self.vertex_table[slot].as_mut() else {
            return 0;
        };
        match std::mem::take(&mut entry.tier) {
            Tier::Clustered => {
                let inserted = self.clustered.insert_edges_batch(src, sorted_dedup_targets);
                let extract_at = range_leaf_size / 2;
                entry.tier = if self.clustered.degree(src).unwrap_or(0) > extract_at {
                    let neighbors = self.clustered.extract(src);
                    tracing::trace!(
                        vertex = src,
                        degree = neighbors.len(),
                        "extracting vertex out of clustered block (batch)"
                    );
                    Tier::extracted_from_clustered(&neighbors, range_leaf_size, art_extract_threshold, art_leaf_size)
                } else {
                    Tier::Clustered
                };
                inserted
            }
            tier => {
                let before = tier.degree(src, &self.clustered);
                entry.tier = tier.insert_batch(sorted_dedup_targets, range_leaf_size, art_extract_threshold, art_leaf_size);
                entry.tier.degree(src, &self.clustered) - before
            }
        }
    }

    /// Removes edge `src -> dst`.
    pub fn remove_edge(&mut self, src: VertexId, dst: VertexId, shard_size: usize, range_leaf_size: usize) {
        let slot = Self::local_slot(src, shard_size);
        let Some(entry) = self.vertex_table[slot].as_mut() else {
            return;
        };
        match std::mem::take(&mut entry.tier) {
            Tier::Clustered => {
                self.clustered.remove_edge(src, dst);
                entry.tier = Tier::Clustered;
            }
            tier => {
                entry.tier = tier.remove(dst, range_leaf_size);
            }
        }
    }

    #[must_use]
    pub fn get_vertex_property(&self, vertex: VertexId, shard_size: usize, property_id: usize) -> Option<PropertyValue> {
        self.vertex_properties.get(Self::local_slot(vertex, shard_size), property_id)
    }

    pub fn set_vertex_property(&mut self, vertex: VertexId, shard_size: usize, property_id: usize, value: PropertyValue) {
        self.vertex_properties.set(Self::local_slot(vertex, shard_size), property_id, value);
    }

    #[must_use]
    pub fn get_edge_property(&self, src: VertexId, dst: VertexId, shard_size: usize, property_id: usize) -> Option<PropertyValue> {
        self.edge_properties[Self::local_slot(src, shard_size)]
            .get(&dst)
            .and_then(|vals| vals.get(property_id).copied())
    }

    pub fn set_edge_property(&mut self, src: VertexId, dst: VertexId, shard_size: usize, property_id: usize, value: PropertyValue) {
        let slot = Self::local_slot(src, shard_size);
        let mut bucket = (*self.edge_properties[slot]).clone();
        let entry = bucket.entry(dst).or_insert_with(SmallVec::new);
        if entry.len() <= property_id {
            entry.resize(property_id + 1, 0);
        }
        entry[property_id] = value;
        self.edge_properties[slot] = Arc::new(bucket);
    }

    #[must_use]
    pub fn get_vertex_string_property(&self, vertex: VertexId, shard_size: usize, property_id: usize) -> Option<Arc<str>> {
        self.vertex_properties.get_string(Self::local_slot(vertex, shard_size), property_id)
    }

    pub fn set_vertex_string_property(&mut self, vertex: VertexId, shard_size: usize, property_id: usize, value: Arc<str>) {
        self.vertex_properties
            .set_string(Self::local_slot(vertex, shard_size), property_id, value);
    }

    #[must_use]
    pub fn get_edge_string_property(&self, src: VertexId, dst: VertexId, shard_size: usize, property_id: usize) -> Option<Arc<str>> {
        self.edge_string_properties[Self::local_slot(src, shard_size)]
            .get(&dst)?
            .get(property_id)
            .cloned()
            .flatten()
    }

    pub fn set_edge_string_property(&mut self, src: VertexId, dst: VertexId, shard_size: usize, property_id: usize, value: Arc<str>) {
        let slot = Self::local_slot(src, shard_size);
        let mut bucket = (*self.edge_string_properties[slot]).clone();
        let entry = bucket.entry(dst).or_insert_with(SmallVec::new);
        if entry.len() <= property_id {
            entry.resize(property_id + 1, None);
        }
        entry[property_id] = Some(value);
        self.edge_string_properties[slot] = Arc::new(bucket);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_vertex_and_edge_round_trips() {
        let mut v = Version::empty(256, 0, 0);
        v.insert_vertex(1, 256);
        v.insert_vertex(2, 256);
        v.insert_edge(1, 2, 256, 16, 64, 8);
        assert!(v.has_edge(1, 2, 256));
        assert_eq!(v.degree(1, 256), 1);
    }

    #[test]
    fn extraction_transition_moves_vertex_out_of_clustered_block() {
        let mut v = Version::empty(256, 0, 0);
        v.insert_vertex(1, 256);
        for n in 0u64..20 {
            v.insert_edge(1, n + 10, 256, 16, 64, 8);
        }
        let entry = v.vertex_entry(1, 256).unwrap();
        assert!(matches!(entry.tier, Tier::Range(_)));
        assert_eq!(v.degree(1, 256), 20);
    }

    #[test]
    fn fork_shares_clustered_block_until_mutated() {
        let mut base = Version::empty(256, 0, 0);
        base.insert_vertex(1, 256);
        let forked = base.fork(1);
        assert!(forked.has_vertex(1, 256));
    }

    #[test]
    fn edge_properties_round_trip() {
        let mut v = Version::empty(256, 0, 0);
        v.insert_vertex(1, 256);
        v.insert_vertex(2, 256);
        v.insert_edge(1, 2, 256, 16, 64, 8);
        v.set_edge_property(1, 2, 256, 0, 42);
        assert_eq!(v.get_edge_property(1, 2, 256, 0), Some(42));
    }

    #[test]
    fn set_edge_property_only_touches_owning_bucket() {
        let mut v = Version::empty(256, 0, 0);
        v.insert_vertex(1, 256);
        v.insert_vertex(2, 256);
        v.insert_vertex(3, 256);
        v.insert_edge(1, 3, 256, 16, 64, 8);
        v.insert_edge(2, 3, 256, 16, 64, 8);
        let other_bucket_before = v.edge_properties[Version::local_slot(2, 256)].clone();
        v.set_edge_property(1, 3, 256, 0, 99);
        assert!(Arc::ptr_eq(&other_bucket_before, &v.edge_properties[Version::local_slot(2, 256)]));
        assert_eq!(v.get_edge_property(1, 3, 256, 0), Some(99));
        assert_eq!(v.get_edge_property(2, 3, 256, 0), None);
    }

    #[test]
    fn edge_string_properties_round_trip() {
        let mut v = Version::empty(256, 0, 0);
        v.insert_vertex(1, 256);
        v.insert_vertex(2, 256);
        v.insert_edge(1, 2, 256, 16, 64, 8);
        v.set_edge_string_property(1, 2, 256, 0, Arc::from("since-2020"));
        assert_eq!(v.get_edge_string_property(1, 2, 256, 0).as_deref(), Some("since-2020"));
    }

    #[test]
    fn vertex_string_properties_round_trip() {
        let mut v = Version::empty(256, 0, 1);
        v.insert_vertex(1, 256);
        v.set_vertex_string_property(1, 256, 0, Arc::from("alice"));
        assert_eq!(v.get_vertex_string_property(1, 256, 0).as_deref(), Some("alice"));
    }

    #[test]
    fn insert_edges_batch_matches_sequential_inserts() {
        let mut sequential = Version::empty(256, 0, 0);
        sequential.insert_vertex(1, 256);
        for n in [30u64, 10, 5, 20] {
            sequential.insert_edge(1, n, 256, 16, 64, 8);
        }

        let mut batched = Version::empty(256, 0, 0);
        batched.insert_vertex(1, 256);
        let inserted = batched.insert_edges_batch(1, &[5, 10, 20, 30], 256, 16, 64, 8);

        assert_eq!(inserted, 4);
        let mut a = Vec::new();
        sequential.for_each_neighbor(1, 256, |n| a.push(n));
        let mut b = Vec::new();
        batched.for_each_neighbor(1, 256, |n| b.push(n));
        assert_eq!(a, b);
    }

    #[test]
    fn insert_edges_batch_extracts_past_threshold() {
        let mut v = Version::empty(256, 0, 0);
        v.insert_vertex(1, 256);
        let targets: Vec<VertexId> = (10u64..30).collect();
        v.insert_edges_batch(1, &targets, 256, 16, 64, 8);
        let entry = v.vertex_entry(1, 256).unwrap();
        assert!(matches!(entry.tier, Tier::Range(_)));
        assert_eq!(v.degree(1, 256), 20);
    }

    #[test]
    fn remove_vertex_clears_properties() {
        let mut v = Version::empty(256, 1, 0);
        v.insert_vertex(1, 256);
        v.set_vertex_property(1, 256, 0, 7);
        v.remove_vertex(1, 256);
        assert_eq!(v.get_vertex_property(1, 256, 0), None);
    }
}
