//! Statistics and introspection for a QP-trie.
//!
//! The figures describe the shape of the trie rather than its contents: how many branches there
//! are, how wide they are and how deep the leaves sit. Useful for:
//! - Checking structural invariants in tests
//! - Estimating memory use per key in benchmarks
//! - Comparing key distributions

use std::collections::HashMap;

use crate::node::{END_OF_KEY, Node, TWIG_WIDTH};

pub trait TrieStatsTrait {
    fn get_trie_stats(&self) -> TrieStats;
}

/// Totals for all branches of one fan-out.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FanOutStats {
    pub fan_out: usize,
    pub total_branches: usize,
    /// Share of the 17 bitmap positions in use.
    pub density: f64,
}

#[derive(Debug, Default, Clone)]
pub struct TrieStats {
    /// Keyed by number of twigs.
    pub fan_out_stats: HashMap<usize, FanOutStats>,
    pub num_leaves: usize,
    pub num_branches: usize,
    pub num_twigs: usize,
    /// Branches between the root and the deepest leaf.
    pub max_depth: usize,
    /// Bytes held by key copies.
    pub key_bytes: usize,
    /// Keys stored at an end-of-key twig, i.e. proper prefixes of other keys.
    pub prefix_keys: usize,
    pub avg_fan_out: f64,
}

impl TrieStats {
    pub(crate) fn finish(mut self) -> Self {
        if self.num_branches > 0 {
            self.avg_fan_out = self.num_twigs as f64 / self.num_branches as f64;
        }
        self
    }
}

pub(crate) fn update_trie_stats<V>(trie_stats: &mut TrieStats, node: &Node<V>, depth: usize) {
    trie_stats.max_depth = trie_stats.max_depth.max(depth);
    let branch = match node {
        Node::Leaf(leaf) => {
            trie_stats.num_leaves += 1;
            trie_stats.key_bytes += leaf.key().len();
            return;
        }
        Node::Branch(branch) => branch,
    };

    let fan_out = branch.len();
    trie_stats.num_branches += 1;
    trie_stats.num_twigs += fan_out;
    if branch.has_twig(END_OF_KEY) {
        trie_stats.prefix_keys += 1;
    }
    trie_stats
        .fan_out_stats
        .entry(fan_out)
        .and_modify(|e| e.total_branches += 1)
        .or_insert(FanOutStats {
            fan_out,
            total_branches: 1,
            density: fan_out as f64 / TWIG_WIDTH as f64,
        });

    for twig in branch.twigs() {
        update_trie_stats(trie_stats, twig, depth + 1);
    }
}

#[cfg(test)]
mod tests {
    use crate::QpTrie;
    use crate::stats::TrieStatsTrait;

    #[test]
    fn test_empty_stats() {
        let stats = QpTrie::<()>::new().get_trie_stats();
        assert_eq!(stats.num_leaves, 0);
        assert_eq!(stats.num_branches, 0);
        assert_eq!(stats.avg_fan_out, 0.0);
    }

    #[test]
    fn test_stats_shape() {
        let mut trie = QpTrie::new();
        // 'a' = 0x61, 'b' = 0x62, 'q' = 0x71.
        for key in [&b"a"[..], b"b", b"q", b"qq"] {
            trie.insert(key, ()).unwrap();
        }
        let stats = trie.get_trie_stats();
        assert_eq!(stats.num_leaves, 4);
        assert_eq!(stats.key_bytes, 5);
        assert_eq!(stats.prefix_keys, 1);
        // Root on the high nibble of byte 0, below it "a"/"b" on the low nibble and "q"/"qq"
        // on the end of key.
        assert_eq!(stats.num_branches, 3);
        assert_eq!(stats.num_twigs, 6);
        assert_eq!(stats.max_depth, 2);
        assert_eq!(stats.avg_fan_out, 2.0);
        assert_eq!(stats.fan_out_stats[&2].total_branches, 3);
        assert_eq!(stats.num_twigs, stats.num_leaves + stats.num_branches - 1);
    }
}
