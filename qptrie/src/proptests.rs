use std::collections::BTreeMap;

use proptest::prelude::*;

use crate::stats::TrieStatsTrait;
use crate::{Leq, QpTrie, TrieError};

#[derive(Clone, Debug)]
enum Op {
    GetIns(Vec<u8>, u32),
    Del(Vec<u8>),
    DelFirst,
    Leq(Vec<u8>),
}

/// Short keys over a small alphabet, so prefixes and shared nibbles are common. Includes the
/// empty key and zero bytes.
fn arb_key() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(
        prop_oneof![Just(0u8), Just(b'a'), Just(b'b'), Just(b'q'), Just(0xff)],
        0..5,
    )
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (arb_key(), any::<u32>()).prop_map(|(k, v)| Op::GetIns(k, v)),
        2 => arb_key().prop_map(Op::Del),
        1 => Just(Op::DelFirst),
        2 => arb_key().prop_map(Op::Leq),
    ]
}

fn assert_matches_model(trie: &QpTrie<u32>, model: &BTreeMap<Vec<u8>, u32>) {
    assert_eq!(trie.weight(), model.len());
    assert_eq!(trie.get_trie_stats().num_leaves, model.len());
    let entries: Vec<(Vec<u8>, u32)> = trie.iter().map(|(k, v)| (k.to_vec(), *v)).collect();
    let expected: Vec<(Vec<u8>, u32)> = model.iter().map(|(k, v)| (k.clone(), *v)).collect();
    assert_eq!(entries, expected);
}

proptest! {
    /// Property: any sequence of operations behaves like the same sequence on a BTreeMap
    #[test]
    fn prop_ops_match_btreemap(ops in prop::collection::vec(arb_op(), 0..200)) {
        let mut trie = QpTrie::<u32>::new();
        let mut model = BTreeMap::new();

        for op in ops {
            match op {
                Op::GetIns(key, value) => {
                    let slot = trie.get_ins(&key).unwrap();
                    let expected = model.entry(key).or_insert(0);
                    prop_assert_eq!(*slot, *expected);
                    *slot = value;
                    *expected = value;
                }
                Op::Del(key) => {
                    match model.remove(&key) {
                        Some(value) => prop_assert_eq!(trie.del(&key), Ok(value)),
                        None => prop_assert_eq!(trie.del(&key), Err(TrieError::NotFound)),
                    }
                }
                Op::DelFirst => {
                    let mut buf = [0u8; 8];
                    match model.pop_first() {
                        Some((key, value)) => {
                            let (len, removed) = trie.del_first(&mut buf).unwrap();
                            prop_assert_eq!(&buf[..len], key.as_slice());
                            prop_assert_eq!(removed, value);
                        }
                        None => prop_assert_eq!(trie.del_first(&mut buf), Err(TrieError::NotFound)),
                    }
                }
                Op::Leq(key) => {
                    let expected = model.range(..=key.clone()).next_back();
                    match (trie.get_leq(&key), expected) {
                        (Leq::NotFound, None) => {}
                        (Leq::Exact(k, v), Some((mk, mv))) => {
                            prop_assert_eq!(k, key.as_slice());
                            prop_assert_eq!(k, mk.as_slice());
                            prop_assert_eq!(*v, *mv);
                        }
                        (Leq::Predecessor(k, v), Some((mk, mv))) => {
                            prop_assert!(k < key.as_slice());
                            prop_assert_eq!(k, mk.as_slice());
                            prop_assert_eq!(*v, *mv);
                        }
                        (found, expected) => {
                            prop_assert!(false, "got {:?}, expected {:?}", found.key(), expected);
                        }
                    }
                }
            }
        }

        assert_matches_model(&trie, &model);
        match trie.get_first() {
            Some((k, _)) => prop_assert_eq!(Some(k), model.keys().next().map(Vec::as_slice)),
            None => prop_assert!(model.is_empty()),
        }
    }

    /// Property: insertion order does not matter
    #[test]
    fn prop_insertion_order_independent(keys in prop::collection::vec(arb_key(), 0..60)) {
        let mut forward = QpTrie::new();
        let mut backward = QpTrie::new();
        for (i, key) in keys.iter().enumerate() {
            forward.insert(key, i).unwrap();
        }
        for (i, key) in keys.iter().enumerate().rev() {
            backward.get_or_insert_with(key, || i).unwrap();
        }
        // Last write wins forwards, first write backwards: same value per key.
        let a: Vec<_> = forward.iter().collect();
        let b: Vec<_> = backward.iter().collect();
        prop_assert_eq!(a, b);
    }

    /// Property: deleting everything in any order empties the trie
    #[test]
    fn prop_delete_all(keys in prop::collection::btree_set("[a-c]{0,6}", 0..80), seed in any::<u64>()) {
        let mut trie = QpTrie::new();
        for key in &keys {
            trie.insert(key.as_bytes(), key.len()).unwrap();
        }
        let mut order: Vec<&String> = keys.iter().collect();
        let len = order.len();
        if len > 1 {
            order.rotate_left((seed % len as u64) as usize);
        }
        for (removed, key) in order.iter().enumerate() {
            prop_assert_eq!(trie.del(key.as_bytes()), Ok(key.len()));
            prop_assert_eq!(trie.weight(), len - removed - 1);
        }
        prop_assert!(trie.is_empty());
        prop_assert_eq!(trie.iter().next(), None);
    }
}
