//! Property-based tests for the Merkle Search Tree
//!
//! Uses a `BTreeMap` as the reference model: whatever holds for the map
//! must hold for the tree, and equal logical contents must yield equal
//! root CIDs no matter how they were reached.

use std::collections::BTreeMap;
use std::sync::Arc;

use cid::Cid as IpldCid;
use proptest::prelude::*;
use twill::mst::util;
use twill::{MemoryBlockStore, Mst, NodeEntry, DAG_CBOR_CID_CODEC, SHA2_256};

fn test_cid(n: u8) -> IpldCid {
    let data = [n; 32];
    let mh = multihash::Multihash::wrap(SHA2_256, &data).unwrap();
    IpldCid::new_v1(DAG_CBOR_CID_CODEC, mh)
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
}

async fn build(pairs: &[(String, u8)]) -> Mst<MemoryBlockStore> {
    let mut tree = Mst::create(Arc::new(MemoryBlockStore::new()), 0)
        .await
        .unwrap();
    for (key, n) in pairs {
        tree.add(key, test_cid(*n)).await.unwrap();
    }
    tree
}

/// Record-path-shaped and short flat keys.
fn key_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z]{1,12}",
        "[a-z]{2,6}\\.[a-z]{2,6}\\.[a-z]{2,6}/[a-z0-9]{4,10}",
    ]
}

/// Distinct key→value-seed pairs.
fn entry_map(max: usize) -> impl Strategy<Value = BTreeMap<String, u8>> {
    prop::collection::btree_map(key_strategy(), any::<u8>(), 1..max)
}

/// Two independent orderings of the same entries.
fn two_orderings(
    max: usize,
) -> impl Strategy<Value = (Vec<(String, u8)>, Vec<(String, u8)>)> {
    entry_map(max).prop_flat_map(|map| {
        let pairs: Vec<(String, u8)> = map.into_iter().collect();
        (
            Just(pairs.clone()).prop_shuffle(),
            Just(pairs).prop_shuffle(),
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_root_is_insertion_order_independent((a, b) in two_orderings(16)) {
        let rt = runtime();
        let (root_a, root_b) = rt.block_on(async {
            let tree_a = build(&a).await;
            let tree_b = build(&b).await;
            (tree_a.root(), tree_b.root())
        });
        prop_assert_eq!(root_a, root_b);
    }

    #[test]
    fn prop_added_keys_round_trip(
        map in entry_map(16),
        probe in key_strategy(),
    ) {
        let rt = runtime();
        let pairs: Vec<(String, u8)> = map.iter().map(|(k, v)| (k.clone(), *v)).collect();

        rt.block_on(async {
            let tree = build(&pairs).await;

            for (key, n) in &pairs {
                assert_eq!(tree.get(key).await.unwrap(), Some(test_cid(*n)));
            }
            if !map.contains_key(&probe) {
                assert_eq!(tree.get(&probe).await.unwrap(), None);
            }
        });
    }

    #[test]
    fn prop_walk_is_ordered_and_layered(map in entry_map(24)) {
        let rt = runtime();
        let pairs: Vec<(String, u8)> = map.iter().map(|(k, v)| (k.clone(), *v)).collect();

        rt.block_on(async {
            let tree = build(&pairs).await;

            let mut leaf_keys: Vec<String> = Vec::new();
            tree.walk(&mut |layer, key| {
                if let Some(key) = key {
                    // Every leaf sits at its natural layer.
                    assert_eq!(util::leading_zeros_on_hash(key), layer);
                    leaf_keys.push(key.to_string());
                }
            })
            .await
            .unwrap();

            // In-order traversal yields exactly the model's keys, sorted.
            let expected: Vec<String> = map.keys().cloned().collect();
            assert_eq!(leaf_keys, expected);
        });
    }

    #[test]
    fn prop_no_adjacent_subtree_pointers(map in entry_map(24)) {
        let rt = runtime();
        let pairs: Vec<(String, u8)> = map.iter().map(|(k, v)| (k.clone(), *v)).collect();

        rt.block_on(async {
            let tree = build(&pairs).await;

            let mut stack = vec![(tree.root(), tree.layer())];
            while let Some((cid, layer)) = stack.pop() {
                let node = Mst::load(tree.storage().clone(), cid, Some(layer))
                    .await
                    .unwrap();
                let mut prev_was_tree = false;
                for entry in node.entries() {
                    match entry {
                        NodeEntry::Tree(ptr) => {
                            assert!(!prev_was_tree, "adjacent subtree pointers");
                            prev_was_tree = true;
                            stack.push((*ptr, layer.saturating_sub(1)));
                        }
                        NodeEntry::Leaf { .. } => prev_was_tree = false,
                    }
                }
            }
        });
    }

    #[test]
    fn prop_edit_preserves_shape(
        map in entry_map(16),
        pick in any::<prop::sample::Index>(),
    ) {
        let rt = runtime();
        let pairs: Vec<(String, u8)> = map.iter().map(|(k, v)| (k.clone(), *v)).collect();
        let (target, old) = pairs[pick.index(pairs.len())].clone();

        rt.block_on(async {
            let mut tree = build(&pairs).await;
            let shape_before = tree.structure().await.unwrap();

            tree.edit(&target, test_cid(old.wrapping_add(1))).await.unwrap();

            assert_eq!(
                tree.get(&target).await.unwrap(),
                Some(test_cid(old.wrapping_add(1)))
            );
            assert_eq!(tree.structure().await.unwrap(), shape_before);
        });
    }

    #[test]
    fn prop_merge_with_self_is_identity(map in entry_map(16)) {
        let rt = runtime();
        let pairs: Vec<(String, u8)> = map.iter().map(|(k, v)| (k.clone(), *v)).collect();

        rt.block_on(async {
            let mut tree = build(&pairs).await;
            let root = tree.root();

            let other = Mst::load(tree.storage().clone(), root, Some(tree.layer()))
                .await
                .unwrap();

            assert_eq!(tree.merge_in(&other).await.unwrap(), root);
        });
    }

    #[test]
    fn prop_merge_of_flat_trees_equals_union(
        map in prop::collection::btree_map(
            key_strategy().prop_filter("layer-0 keys", |k| util::leading_zeros_on_hash(k) == 0),
            any::<u8>(),
            3..18,
        ),
    ) {
        let rt = runtime();

        // Partition into ours-only / theirs-only / shared. All keys are
        // layer 0, so both trees stay flat and merging is pure leaf
        // interleaving.
        let mut ours = Vec::new();
        let mut theirs = Vec::new();
        let mut union: BTreeMap<String, u8> = BTreeMap::new();
        for (i, (key, n)) in map.into_iter().enumerate() {
            match i % 3 {
                0 => {
                    ours.push((key.clone(), n));
                    union.insert(key, n);
                }
                1 => {
                    theirs.push((key.clone(), n));
                    union.insert(key, n);
                }
                _ => {
                    // Shared key, incoming side carries a different value.
                    ours.push((key.clone(), n));
                    theirs.push((key.clone(), n.wrapping_add(1)));
                    union.insert(key, n.wrapping_add(1));
                }
            }
        }

        rt.block_on(async {
            let mut a = build(&ours).await;
            let b = build(&theirs).await;
            let merged_root = a.merge_in(&b).await.unwrap();

            let union_pairs: Vec<(String, u8)> = union.into_iter().collect();
            let direct = build(&union_pairs).await;

            assert_eq!(merged_root, direct.root());
        });
    }
}
