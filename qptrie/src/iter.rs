use std::iter::FusedIterator;
use std::slice;

use crate::node::{Branch, Leaf, Node};

/// Ascending-order cursor over the entries of a [`QpTrie`](crate::QpTrie).
///
/// Sits on one leaf at a time: [`key`](Self::key) and [`value`](Self::value) read it,
/// [`advance`](Self::advance) moves to the next one. Also usable as a plain [`Iterator`].
pub struct Iter<'a, V> {
    // Branches on the path to the current leaf, each with the index of the next twig to visit.
    stack: Vec<(&'a Branch<V>, usize)>,
    leaf: Option<&'a Leaf<V>>,
    remaining: usize,
}

impl<'a, V> Iter<'a, V> {
    pub(crate) fn new(root: Option<&'a Node<V>>, weight: usize) -> Self {
        let mut iter = Self {
            stack: Vec::new(),
            leaf: None,
            remaining: weight,
        };
        if let Some(root) = root {
            iter.descend_leftmost(root);
        }
        iter
    }

    fn descend_leftmost(&mut self, mut node: &'a Node<V>) {
        loop {
            match node {
                Node::Leaf(leaf) => {
                    self.leaf = Some(leaf);
                    return;
                }
                Node::Branch(branch) => {
                    self.stack.push((branch, 1));
                    node = &branch.twigs()[0];
                }
            }
        }
    }

    /// Move to the next entry. Does nothing once finished.
    pub fn advance(&mut self) {
        if self.leaf.take().is_none() {
            return;
        }
        self.remaining -= 1;
        while let Some(frame) = self.stack.last_mut() {
            let (branch, next) = *frame;
            if next < branch.len() {
                frame.1 += 1;
                self.descend_leftmost(&branch.twigs()[next]);
                return;
            }
            self.stack.pop();
        }
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.leaf.is_none()
    }

    /// Key of the current entry.
    #[inline]
    pub fn key(&self) -> Option<&'a [u8]> {
        Some(self.leaf?.key())
    }

    #[inline]
    pub fn value(&self) -> Option<&'a V> {
        Some(self.leaf?.value())
    }
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (&'a [u8], &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let leaf = self.leaf?;
        self.advance();
        Some(leaf.parts())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V> ExactSizeIterator for Iter<'_, V> {}

impl<V> FusedIterator for Iter<'_, V> {}

/// Ascending-order iterator over the entries of a [`QpTrie`](crate::QpTrie), with mutable values.
pub struct IterMut<'a, V> {
    // One iterator over the remaining twigs of every branch on the path to the next leaf.
    node_iter_stack: Vec<slice::IterMut<'a, Node<V>>>,
    remaining: usize,
}

impl<'a, V> IterMut<'a, V> {
    pub(crate) fn new(root: Option<&'a mut Node<V>>, weight: usize) -> Self {
        let node_iter_stack = match root {
            Some(root) => vec![slice::from_mut(root).iter_mut()],
            None => Vec::new(),
        };
        Self {
            node_iter_stack,
            remaining: weight,
        }
    }
}

impl<'a, V> Iterator for IterMut<'a, V> {
    type Item = (&'a [u8], &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let last_iter = self.node_iter_stack.last_mut()?;
            let Some(node) = last_iter.next() else {
                self.node_iter_stack.pop();
                continue;
            };
            match node {
                Node::Leaf(leaf) => {
                    self.remaining -= 1;
                    return Some(leaf.parts_mut());
                }
                Node::Branch(branch) => self.node_iter_stack.push(branch.twigs_mut().iter_mut()),
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V> ExactSizeIterator for IterMut<'_, V> {}

impl<V> FusedIterator for IterMut<'_, V> {}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rand::{Rng, rng};

    use crate::QpTrie;

    #[test]
    fn test_iter_empty() {
        let trie = QpTrie::<u8>::new();
        let mut iter = trie.iter();
        assert_eq!(iter.len(), 0);
        assert!(iter.next().is_none());
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_iter_single() {
        let mut trie = QpTrie::new();
        trie.insert(b"only", 1).unwrap();
        let entries: Vec<_> = trie.iter().collect();
        assert_eq!(entries, vec![(b"only" as &[u8], &1)]);
    }

    #[test]
    fn test_cursor_interface() {
        let mut trie = QpTrie::new();
        for (i, key) in [&b"b"[..], b"", b"ab", b"a"].into_iter().enumerate() {
            trie.insert(key, i).unwrap();
        }

        let mut cursor = trie.iter();
        let mut seen = Vec::new();
        while !cursor.is_finished() {
            seen.push((cursor.key().unwrap().to_vec(), *cursor.value().unwrap()));
            cursor.advance();
        }
        assert_eq!(
            seen,
            vec![(b"".to_vec(), 1), (b"a".to_vec(), 3), (b"ab".to_vec(), 2), (b"b".to_vec(), 0)]
        );
        assert_eq!(cursor.key(), None);
        assert_eq!(cursor.len(), 0);
        cursor.advance();
        assert!(cursor.is_finished());
        assert_eq!(cursor.next(), None);
    }

    #[test]
    fn test_iter_sorted_random_keys() {
        let mut trie = QpTrie::new();
        let mut model = BTreeSet::new();
        let mut rng = rng();
        for _ in 0..5_000 {
            let key: Vec<u8> = (0..rng.random_range(0..8)).map(|_| rng.random()).collect();
            trie.insert(&key, key.len()).unwrap();
            model.insert(key);
        }

        let iter = trie.iter();
        assert_eq!(iter.len(), model.len());
        let keys: Vec<Vec<u8>> = iter.map(|(k, _)| k.to_vec()).collect();
        let expected: Vec<Vec<u8>> = model.into_iter().collect();
        assert_eq!(keys, expected);
    }

    #[test]
    fn test_iter_mut_updates_values() {
        let mut trie = QpTrie::new();
        for i in 0..256u32 {
            trie.insert(&[i as u8, 0, i as u8], i).unwrap();
        }
        let mut iter = trie.iter_mut();
        assert_eq!(iter.size_hint(), (256, Some(256)));
        iter.next();
        assert_eq!(iter.len(), 255);
        for (key, value) in iter {
            assert_eq!(key[0] as u32, *value);
            *value += 1000;
        }
        assert_eq!(trie.get(&[0, 0, 0]), Some(&0));
        assert_eq!(trie.get(&[7, 0, 7]), Some(&1007));
        assert_eq!(trie.get(&[255, 0, 255]), Some(&1255));
    }
}
