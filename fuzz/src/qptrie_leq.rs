#![no_main]

use std::collections::BTreeSet;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use qptrie::{Leq, QpTrie};

#[derive(Arbitrary, Debug)]
struct LeqInput {
    keys: Vec<Vec<u8>>,
    queries: Vec<Vec<u8>>,
}

fuzz_target!(|input: LeqInput| {
    let mut trie = QpTrie::new();
    let mut set = BTreeSet::new();
    for key in &input.keys {
        trie.insert(key, key.len()).unwrap();
        set.insert(key.as_slice());
    }

    for query in &input.queries {
        let expected = set.range(..=query.as_slice()).next_back().copied();
        match trie.get_leq(query) {
            Leq::Exact(k, v) => {
                assert_eq!(k, query.as_slice());
                assert_eq!(Some(k), expected);
                assert_eq!(*v, k.len());
            }
            Leq::Predecessor(k, v) => {
                assert!(k < query.as_slice());
                assert_eq!(Some(k), expected);
                assert_eq!(*v, k.len());
            }
            Leq::NotFound => assert_eq!(expected, None),
        }
    }
});
