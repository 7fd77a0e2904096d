//! Miri tests for node memory safety.
//!
//! Twig arrays and key copies are raw allocations that the trie grows, shrinks and frees by
//! hand. These tests drive every reallocation path with owning values (`Box`, `String`) so Miri
//! catches leaks, double frees and reads of moved-out twigs, and check through a counting
//! allocator that nothing is left behind.
//!
//! Note: These tests are only compiled when SIMD features are disabled,
//! as Miri cannot handle SIMD instructions.

#![cfg(not(feature = "simd_keys"))]

use qptrie::{CountingAllocator, Global, Leq, QpTrie, TrieError};

fn keys() -> Vec<Vec<u8>> {
    let mut keys: Vec<Vec<u8>> = vec![b"".to_vec(), b"\0".to_vec(), b"\xff\xff".to_vec()];
    for a in [b'a', b'b', b'q'] {
        keys.push(vec![a]);
        for b in [0u8, b'a', b'z', 0xf0] {
            keys.push(vec![a, b]);
            keys.push(vec![a, b, b'x']);
        }
    }
    keys
}

#[test]
fn miri_boxed_values_insert_delete() {
    let alloc = CountingAllocator::new();
    let mut trie = QpTrie::new_in(&alloc);
    let keys = keys();

    for (i, key) in keys.iter().enumerate() {
        assert!(trie.insert(key, Box::new(i)).unwrap().is_none());
    }
    assert_eq!(trie.weight(), keys.len());

    // Replacing drops the old box.
    assert_eq!(trie.insert(b"a", Box::new(1000)).unwrap().map(|b| *b), Some(3));

    // Every other key, then the rest: shrinks and collapses at every level.
    for key in keys.iter().step_by(2) {
        assert!(trie.del(key).is_ok());
    }
    for key in keys.iter().skip(1).step_by(2) {
        assert!(trie.del(key).is_ok());
    }
    assert!(trie.is_empty());
    assert_eq!(alloc.live_allocations(), 0);
}

#[test]
fn miri_string_values_clear_and_drop() {
    let alloc = CountingAllocator::new();
    {
        let mut trie = QpTrie::new_in(&alloc);
        for key in keys() {
            *trie.get_or_insert_with(&key, String::new).unwrap() = format!("{key:?}");
        }
        assert!(alloc.live_allocations() > 0);
        trie.clear();
        assert_eq!(alloc.live_allocations(), 0);

        for key in keys() {
            trie.get_ins(&key).unwrap().push_str("again");
        }
        assert!(alloc.live_bytes() > 0);
    }
    // Dropped with entries still present.
    assert_eq!(alloc.live_allocations(), 0);
    assert_eq!(alloc.live_bytes(), 0);
}

#[test]
fn miri_iterators_and_leq() {
    let mut trie = QpTrie::new_in(Global);
    for key in keys() {
        trie.insert(&key, Box::new(key.len())).unwrap();
    }

    for (key, value) in trie.iter_mut() {
        **value += key.len();
    }
    for (key, value) in &trie {
        assert_eq!(**value, key.len() * 2);
    }

    match trie.get_leq(b"b\xff") {
        Leq::Predecessor(key, value) => {
            assert_eq!(key, b"b\xf0x");
            **value = 0;
        }
        _ => panic!("expected a predecessor"),
    }
    assert_eq!(trie.get(b"b\xf0x").map(|b| **b), Some(0));

    let mut buf = [0u8; 4];
    while !trie.is_empty() {
        let (len, value) = trie.del_first(&mut buf).unwrap();
        drop(value);
        assert!(len <= 3);
    }
}

#[test]
fn miri_oversized_buffer_request() {
    let mut trie = QpTrie::new();
    trie.insert(b"longer key", Box::new(1)).unwrap();
    let mut buf = [0u8; 3];
    assert_eq!(
        trie.del_first(&mut buf).unwrap_err(),
        TrieError::InsufficientSpace {
            needed: 10,
            available: 3
        }
    );
    assert_eq!(trie.weight(), 1);
}
