#![no_main]

use std::collections::BTreeMap;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use qptrie::{QpTrie, TrieError};

#[derive(Arbitrary, Debug)]
enum MapMethod {
    Get { key: Vec<u8> },
    GetIns { key: Vec<u8>, val: usize },
    Update { key: Vec<u8>, val: usize },
    Delete { key: Vec<u8> },
    DeleteFirst { buf_len: u8 },
}

fuzz_target!(|methods: Vec<MapMethod>| {
    let capacity = 10_000_000;
    let mut trie = QpTrie::<usize>::new();
    let mut bt_map = BTreeMap::<Vec<u8>, usize>::new();

    for m_c in methods.chunks(1024) {
        for m in m_c {
            match m {
                MapMethod::Get { key } => {
                    assert_eq!(trie.get(key), bt_map.get(key));
                }
                MapMethod::GetIns { key, val } => {
                    if bt_map.len() < capacity {
                        let slot = trie.get_ins(key).unwrap();
                        let bt_slot = bt_map.entry(key.clone()).or_default();
                        assert_eq!(*slot, *bt_slot);
                        *slot = *val;
                        *bt_slot = *val;
                    }
                }
                MapMethod::Update { key, val } => {
                    let old_bt = bt_map.get_mut(key);
                    let old_trie = trie.get_try(key);
                    assert_eq!(old_trie, old_bt);

                    if let Some(old_bt) = old_bt {
                        *old_bt = *val;
                        if let Some(old_trie) = old_trie {
                            *old_trie = *val;
                        }
                    }
                    assert_eq!(trie.get(key), bt_map.get(key));
                }
                MapMethod::Delete { key } => {
                    let btr = bt_map.remove(key);
                    let trier = trie.del(key);
                    match btr {
                        Some(v) => assert_eq!(trier, Ok(v)),
                        None => assert_eq!(trier, Err(TrieError::NotFound)),
                    }
                }
                MapMethod::DeleteFirst { buf_len } => {
                    let mut buf = vec![0u8; *buf_len as usize];
                    let result = trie.del_first(&mut buf);
                    match bt_map.first_key_value() {
                        None => assert_eq!(result, Err(TrieError::NotFound)),
                        Some((k, _)) if k.len() > buf.len() => {
                            assert_eq!(
                                result,
                                Err(TrieError::InsufficientSpace {
                                    needed: k.len(),
                                    available: buf.len()
                                })
                            );
                        }
                        Some(_) => {
                            let (k, v) = bt_map.pop_first().unwrap();
                            assert_eq!(result, Ok((k.len(), v)));
                            assert_eq!(&buf[..k.len()], k.as_slice());
                        }
                    }
                }
            }
            assert_eq!(trie.weight(), bt_map.len());
        }
    }

    assert!(trie.iter().map(|(k, v)| (k, *v)).eq(bt_map.iter().map(|(k, v)| (k.as_slice(), *v))));
});
