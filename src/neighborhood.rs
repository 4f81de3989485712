//! The three-tier adaptive neighborhood (§4.3–§4.5): a vertex starts out
//! clustered inline with its peers, is extracted to a private range tree
//! once its degree crosses `range_leaf_size/2`, and is promoted again to an
//! ART once it crosses `art_extract_threshold`. This module hides the
//! tier behind one small dispatch type so `version.rs` and `txn.rs` never
//! match on `is_independent`/`is_art` bits directly — they call `Tier`
//! methods and let it route to the right backing structure, mirroring the
//! `if/else if/else` dispatch the original engine performs inline wherever
//! it walks a vertex's edges.

use crate::art::ArtNode;
use crate::clustered::ClusteredBlock;
use crate::ids::VertexId;
use crate::range_tree::RangeTree;

/// Which backing structure currently holds a vertex's neighbors.
#[derive(Clone, Default)]
pub enum Tier {
    /// Neighbors live in the shard version's shared `ClusteredBlock`.
    #[default]
    Clustered,
    /// Neighbors live in this vertex's own `RangeTree`.
    Range(RangeTree),
    /// Neighbors live in this vertex's own `ArtNode`.
    Art(ArtNode),
}

impl Tier {
    /// Degree, given the clustered block to consult when this vertex is
    /// still clustered.
    #[must_use]
    pub fn degree(&self, vertex: VertexId, clustered: &ClusteredBlock) -> usize {
        match self {
            Tier::Clustered => clustered.degree(vertex).unwrap_or(0),
            Tier::Range(tree) => tree.len(),
            Tier::Art(tree) => tree.len(),
        }
    }

    /// True if `target` is a neighbor.
    #[must_use]
    pub fn contains(&self, vertex: VertexId, target: VertexId, clustered: &ClusteredBlock) -> bool {
        match self {
            Tier::Clustered => clustered
                .neighbors(vertex)
                .is_some_and(|n| n.binary_search(&target).is_ok()),
            Tier::Range(tree) => tree.contains(target),
            Tier::Art(tree) => tree.contains(target, 0),
        }
    }

    /// Visits every neighbor in ascending order.
    pub fn for_each(&self, vertex: VertexId, clustered: &ClusteredBlock, mut f: impl FnMut(VertexId)) {
        match self {
            Tier::Clustered => {
                if let Some(n) = clustered.neighbors(vertex) {
                    n.iter().copied().for_each(f);
                }
            }
            Tier::Range(tree) => tree.for_each_element(f),
            Tier::Art(tree) => tree.for_each_element(&mut f),
        }
    }

    /// Sorted intersection of this vertex's neighbors with an
    /// already-sorted slice (the fast path used when intersecting two
    /// clustered or range-tree neighborhoods).
    #[must_use]
    pub fn intersect_sorted(
        &self,
        vertex: VertexId,
        clustered: &ClusteredBlock,
        other: &[VertexId],
    ) -> Vec<VertexId> {
        match self {
            Tier::Clustered => {
                let mut out = Vec::new();
                if let Some(own) = clustered.neighbors(vertex) {
                    let mut j = 0;
                    for &k in own {
                        while j < other.len() && other[j] < k {
                            j += 1;
                        }
                        if j < other.len() && other[j] == k {
                            out.push(k);
                        }
                    }
                }
                out
            }
            Tier::Range(tree) => tree.intersect_sorted(other),
            Tier::Art(tree) => tree.intersect_sorted(other),
        }
    }

    /// Inserts `target`, extracting/promoting tiers as thresholds dictate.
    /// Returns the (possibly new) tier and, if extraction/promotion moved
    /// this vertex out of the clustered block, signals the caller to call
    /// `ClusteredBlock::extract` beforehand — see `version.rs` for the
    /// sequencing; this method assumes that has already happened for a
    /// `Clustered -> Range` transition and receives the drained neighbors
    /// via `extracted`.
    #[must_use]
    pub fn insert(
        self,
        target: VertexId,
        range_leaf_size: usize,
        art_extract_threshold: usize,
        art_leaf_size: usize,
    ) -> Tier {
        match self {
            Tier::Range(mut tree) => {
                tree.insert_copy(target, range_leaf_size);
                if tree.len() > art_extract_threshold {
                    tracing::trace!(degree = tree.len(), art_extract_threshold, "promoting range tree to ART");
                    Tier::Art(tree.promote_to_art(art_leaf_size))
                } else {
                    Tier::Range(tree)
                }
            }
            Tier::Art(tree) => Tier::Art(tree.insert_copy(target, 0, art_leaf_size)),
            Tier::Clustered => {
                unreachable!("clustered inserts go through ClusteredBlock directly")
            }
        }
    }

    /// Merges a sorted, deduplicated batch of new targets into a
    /// non-clustered tier, promoting range to ART if the batch pushes
    /// degree past `art_extract_threshold`. Mirrors `insert`, but drives the
    /// backing tier's own batch merge instead of one insert per target.
    #[must_use]
    pub fn insert_batch(
        self,
        targets: &[VertexId],
        range_leaf_size: usize,
        art_extract_threshold: usize,
        art_leaf_size: usize,
    ) -> Tier {
        match self {
            Tier::Range(mut tree) => {
                tree.insert_batch(targets, range_leaf_size);
                if tree.len() > art_extract_threshold {
                    tracing::trace!(degree = tree.len(), art_extract_threshold, "promoting range tree to ART (batch)");
                    Tier::Art(tree.promote_to_art(art_leaf_size))
                } else {
                    Tier::Range(tree)
                }
            }
            Tier::Art(tree) => Tier::Art(tree.insert_batch(targets, art_leaf_size)),
            Tier::Clustered => {
                unreachable!("clustered batch inserts go through ClusteredBlock directly")
            }
        }
    }

    /// Removes `target` from a non-clustered tier.
    #[must_use]
    pub fn remove(self, target: VertexId, range_leaf_size: usize) -> Tier {
        match self {
            Tier::Range(mut tree) => {
                tree.remove_copy(target, range_leaf_size);
                Tier::Range(tree)
            }
            Tier::Art(tree) => Tier::Art(tree.remove_copy(target, 0)),
            Tier::Clustered => {
                unreachable!("clustered removes go through ClusteredBlock directly")
            }
        }
    }

    /// Builds the tier a freshly extracted vertex should start in, given
    /// its drained neighbor list.
    #[must_use]
    pub fn extracted_from_clustered(
        neighbors: &[VertexId],
        range_leaf_size: usize,
        art_extract_threshold: usize,
        art_leaf_size: usize,
    ) -> Tier {
        if neighbors.len() > art_extract_threshold {
            Tier::Art(ArtNode::bulk_build(neighbors, art_leaf_size))
        } else {
            Tier::Range(RangeTree::bulk_build(neighbors, range_leaf_size))
        }
    }
}
