//! # qptrie
//!
//! A QP-trie ("quadbit popcount patricia trie"): an ordered map from arbitrary byte strings to
//! values, built for large sets of short keys such as DNS names.
//!
//! ## Overview
//!
//! Every branch of the trie decides on one 4-bit nibble of the key. Rather than reserving a slot
//! for each of the sixteen nibble values, a branch keeps a 17-position bitmap and a densely packed
//! twig array holding only the children that exist; the array index of a child is the number of
//! bitmap bits below its own. The extra bitmap position stands for "the key ends before this
//! byte", which lets keys that are prefixes of other keys live in the same trie and keeps them in
//! lexicographic byte order.
//!
//! ## Usage
//!
//! ```rust
//! use qptrie::{QpTrie, TrieError};
//!
//! let mut trie = QpTrie::<u64>::new();
//! *trie.get_ins(b"www.example.com")? = 10;
//! *trie.get_ins(b"example.com")? = 20;
//!
//! assert_eq!(trie.get(b"example.com"), Some(&20));
//! assert_eq!(trie.weight(), 2);
//!
//! let keys: Vec<&[u8]> = trie.iter().map(|(key, _)| key).collect();
//! assert_eq!(keys, vec![&b"example.com"[..], b"www.example.com"]);
//!
//! assert_eq!(trie.del(b"example.com")?, 20);
//! assert_eq!(trie.del(b"example.com"), Err(TrieError::NotFound));
//! # Ok::<(), TrieError>(())
//! ```
//!
//! ## Memory
//!
//! Key copies and twig arrays come from an [`Allocator`] chosen when the trie is created
//! ([`QpTrie::new_in`]). Operations that need memory report a refused allocation as
//! [`TrieError::AllocationFailure`] and leave the trie as it was.
//!
//! ## Feature flags
//!
//! - `simd_keys` (default): compare keys 16 bytes at a time with SSE2 on x86_64.

pub mod alloc;
pub mod error;
pub mod iter;
mod node;
#[cfg(test)]
mod proptests;
pub mod stats;
pub mod trie;
pub mod utils;

pub use crate::alloc::{AllocError, Allocator, CountingAllocator, Global};
pub use crate::error::{TrieError, TrieResult};
pub use crate::iter::{Iter, IterMut};
pub use crate::node::MAX_KEY_LEN;
pub use crate::stats::{FanOutStats, TrieStats, TrieStatsTrait};
pub use crate::trie::{Leq, LeqKind, QpTrie};
