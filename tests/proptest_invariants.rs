//! Property tests for the range-tree and ART neighbor tiers: sorted order
//! and membership must survive arbitrary insert/remove sequences,
//! regardless of the leaf-size knob driving splits/merges/promotions.

use meshgraph_core::art::ArtNode;
use meshgraph_core::range_tree::RangeTree;
use proptest::collection::vec as pvec;
use proptest::prelude::*;
use std::collections::BTreeSet;

fn sorted_elements_of_tree(tree: &RangeTree) -> Vec<u64> {
    let mut out = Vec::new();
    tree.for_each_element(|k| out.push(k));
    out
}

fn sorted_elements_of_art(node: &ArtNode) -> Vec<u64> {
    let mut out = Vec::new();
    node.for_each_element(&mut |k| out.push(k));
    out
}

fn is_sorted_and_deduped(keys: &[u64]) -> bool {
    keys.windows(2).all(|w| w[0] < w[1])
}

proptest! {
    #[test]
    fn range_tree_insert_sequence_stays_sorted(
        keys in pvec(0u64..500, 0..200),
        leaf_size in 4usize..32,
    ) {
        let mut tree = RangeTree::empty();
        let mut model = BTreeSet::new();
        for &k in &keys {
            tree.insert_copy(k, leaf_size);
            model.insert(k);
        }
        let observed = sorted_elements_of_tree(&tree);
        prop_assert!(is_sorted_and_deduped(&observed));
        let model: BTreeSet<u64> = model;
        prop_assert_eq!(&observed, &model.iter().copied().collect::<Vec<_>>());
        for k in 0u64..500 {
            prop_assert_eq!(tree.contains(k), model.contains(&k));
        }
    }

    #[test]
    fn range_tree_insert_then_remove_matches_btreeset(
        inserts in pvec(0u64..300, 1..150),
        removals in pvec(0u64..300, 0..150),
        leaf_size in 4usize..32,
    ) {
        let mut tree = RangeTree::empty();
        let mut model = BTreeSet::new();
        for &k in &inserts {
            tree.insert_copy(k, leaf_size);
            model.insert(k);
        }
        for &k in &removals {
            tree.remove_copy(k, leaf_size);
            model.remove(&k);
        }
        let observed = sorted_elements_of_tree(&tree);
        prop_assert!(is_sorted_and_deduped(&observed));
        prop_assert_eq!(observed, model.into_iter().collect::<Vec<_>>());
    }

    #[test]
    fn range_tree_bulk_build_matches_sequential_inserts(
        mut keys in pvec(0u64..1000, 0..300),
        leaf_size in 4usize..64,
    ) {
        keys.sort_unstable();
        keys.dedup();

        let bulk = RangeTree::bulk_build(&keys, leaf_size);
        let mut sequential = RangeTree::empty();
        for &k in &keys {
            sequential.insert_copy(k, leaf_size);
        }

        prop_assert_eq!(sorted_elements_of_tree(&bulk), sorted_elements_of_tree(&sequential));
    }

    #[test]
    fn art_insert_sequence_stays_sorted_and_member(
        keys in pvec(0u64..2000, 0..300),
        leaf_cap in 4usize..32,
    ) {
        let mut art = ArtNode::empty();
        let mut model = BTreeSet::new();
        for &k in &keys {
            art = art.insert_copy(k, 0, leaf_cap);
            model.insert(k);
        }
        let observed = sorted_elements_of_art(&art);
        prop_assert!(is_sorted_and_deduped(&observed));
        prop_assert_eq!(&observed, &model.iter().copied().collect::<Vec<_>>());
        for &k in &model {
            prop_assert!(art.contains(k, 0));
        }
    }

    #[test]
    fn art_insert_then_remove_matches_btreeset(
        inserts in pvec(0u64..1000, 1..200),
        removals in pvec(0u64..1000, 0..200),
        leaf_cap in 4usize..32,
    ) {
        let mut art = ArtNode::empty();
        let mut model = BTreeSet::new();
        for &k in &inserts {
            art = art.insert_copy(k, 0, leaf_cap);
            model.insert(k);
        }
        for &k in &removals {
            art = art.remove_copy(k, 0);
            model.remove(&k);
        }
        let observed = sorted_elements_of_art(&art);
        prop_assert!(is_sorted_and_deduped(&observed));
        prop_assert_eq!(&observed, &model.iter().copied().collect::<Vec<_>>());
        for k in 0u64..1000 {
            prop_assert_eq!(art.contains(k, 0), model.contains(&k));
        }
    }

    #[test]
    fn art_bulk_build_matches_sequential_inserts(
        mut keys in pvec(0u64..2000, 0..300),
        leaf_cap in 4usize..64,
    ) {
        keys.sort_unstable();
        keys.dedup();

        let bulk = ArtNode::bulk_build(&keys, leaf_cap);
        let mut sequential = ArtNode::empty();
        for &k in &keys {
            sequential = sequential.insert_copy(k, 0, leaf_cap);
        }

        prop_assert_eq!(sorted_elements_of_art(&bulk), sorted_elements_of_art(&sequential));
    }

    #[test]
    fn range_tree_promoted_to_art_preserves_sorted_membership(
        mut keys in pvec(0u64..500, 1..200),
        range_leaf_size in 4usize..32,
        art_leaf_cap in 4usize..32,
    ) {
        keys.sort_unstable();
        keys.dedup();

        let tree = RangeTree::bulk_build(&keys, range_leaf_size);
        let art = tree.promote_to_art(art_leaf_cap);

        prop_assert_eq!(sorted_elements_of_art(&art), keys);
    }
}
