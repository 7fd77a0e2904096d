//! QP-trie implementation.
//!
//! This module contains the main [`QpTrie`] type and the result type of its
//! predecessor query, [`Leq`].

use std::fmt::{Debug, Formatter};

use tracing::{debug, trace, warn};

use crate::alloc::{AllocError, Allocator, Global};
use crate::error::{TrieError, TrieResult};
use crate::iter::{Iter, IterMut};
use crate::node::{Divergence, Leaf, MAX_KEY_LEN, Node};
use crate::stats::{TrieStats, TrieStatsTrait, update_trie_stats};

/// A QP-trie: an ordered map from byte strings to values, branching on 4-bit nibbles.
///
/// Each branch decides on one nibble of the key and keeps a 17-position bitmap (one position for
/// "the key ends here", sixteen for the nibble values) together with a twig array holding exactly
/// as many children as the bitmap has bits set. Leaves keep a full copy of their key. This keeps
/// per-entry overhead small for large sets of short keys, such as names derived from DNS.
///
/// ## Features
///
/// - **Ordered**: iteration, minimum and predecessor queries follow lexicographic byte order,
///   with a key sorting before every key it is a prefix of.
/// - **Dense**: every twig is a present child; twig arrays grow on insertion and shrink on
///   removal when memory allows.
/// - **Pluggable memory**: every key copy and twig array comes from an [`Allocator`].
///
/// ## Examples
///
/// ```rust
/// use qptrie::{Leq, QpTrie};
///
/// let mut trie = QpTrie::<u32>::new();
/// *trie.get_ins(b"example.com")? = 1;
/// *trie.get_ins(b"example.net")? = 2;
///
/// assert_eq!(trie.get(b"example.com"), Some(&1));
/// assert_eq!(trie.weight(), 2);
///
/// match trie.get_leq(b"example.org") {
///     Leq::Predecessor(key, value) => {
///         assert_eq!(key, b"example.net");
///         assert_eq!(*value, 2);
///     }
///     _ => unreachable!(),
/// }
/// # Ok::<(), qptrie::TrieError>(())
/// ```
pub struct QpTrie<V, A: Allocator = Global> {
    root: Option<Node<V>>,
    weight: usize,
    alloc: A,
}

/// Outcome of [`QpTrie::get_leq`].
#[derive(Debug)]
pub enum Leq<'a, V> {
    /// The queried key is stored.
    Exact(&'a [u8], &'a mut V),
    /// The greatest stored key below the queried key.
    Predecessor(&'a [u8], &'a mut V),
    /// Every stored key sorts after the queried key.
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeqKind {
    Exact,
    Predecessor,
    NotFound,
}

impl<'a, V> Leq<'a, V> {
    pub fn kind(&self) -> LeqKind {
        match self {
            Leq::Exact(..) => LeqKind::Exact,
            Leq::Predecessor(..) => LeqKind::Predecessor,
            Leq::NotFound => LeqKind::NotFound,
        }
    }

    pub fn key(&self) -> Option<&'a [u8]> {
        match self {
            Leq::Exact(key, _) | Leq::Predecessor(key, _) => Some(*key),
            Leq::NotFound => None,
        }
    }

    pub fn into_value(self) -> Option<&'a mut V> {
        match self {
            Leq::Exact(_, value) | Leq::Predecessor(_, value) => Some(value),
            Leq::NotFound => None,
        }
    }
}

fn alloc_failed(err: AllocError) -> TrieError {
    warn!(
        size = err.layout().size(),
        align = err.layout().align(),
        "trie allocation failed"
    );
    err.into()
}

impl<V> QpTrie<V> {
    /// Create a new empty trie backed by the global heap.
    pub fn new() -> Self {
        Self::new_in(Global)
    }
}

impl<V> Default for QpTrie<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, A: Allocator> QpTrie<V, A> {
    /// Create a new empty trie whose nodes and key copies come from `alloc`. Nothing is
    /// allocated until the first insertion.
    pub fn new_in(alloc: A) -> Self {
        Self {
            root: None,
            weight: 0,
            alloc,
        }
    }

    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    /// Number of stored keys.
    #[inline]
    pub fn weight(&self) -> usize {
        self.weight
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.weight
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Release every entry, keeping the trie usable.
    pub fn clear(&mut self) {
        if let Some(root) = self.root.take() {
            debug!(weight = self.weight, "clearing trie");
            unsafe { root.free(&self.alloc) };
        }
        self.weight = 0;
    }

    pub fn get(&self, key: &[u8]) -> Option<&V> {
        let mut node = self.root.as_ref()?;
        loop {
            match node {
                Node::Branch(branch) => node = branch.child(key)?,
                Node::Leaf(leaf) => {
                    return if leaf.key() == key {
                        Some(leaf.value())
                    } else {
                        None
                    };
                }
            }
        }
    }

    /// Look up `key`, returning its value slot for reading or overwriting.
    #[inline]
    pub fn get_try(&mut self, key: &[u8]) -> Option<&mut V> {
        Some(self.find_leaf_mut(key)?.value_mut())
    }

    #[inline]
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Look up `key`, inserting it with `V::default()` if absent. Returns the value slot either
    /// way; an existing value is left as it was.
    ///
    /// On allocation failure the trie is left exactly as it was.
    pub fn get_ins(&mut self, key: &[u8]) -> TrieResult<&mut V>
    where
        V: Default,
    {
        self.get_or_insert_with(key, V::default)
    }

    /// Insert a key-value pair.
    ///
    /// Follows standard Rust container conventions by returning the old value when a key is
    /// replaced.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(old_value))` if a previous value was replaced
    /// - `Ok(None)` if this was a new key
    pub fn insert(&mut self, key: &[u8], value: V) -> TrieResult<Option<V>> {
        if let Some(slot) = self.get_try(key) {
            return Ok(Some(std::mem::replace(slot, value)));
        }
        self.get_or_insert_with(key, move || value)?;
        Ok(None)
    }

    /// Like [`get_ins`](Self::get_ins), with the value for a new key produced by `make`.
    pub fn get_or_insert_with<F>(&mut self, key: &[u8], make: F) -> TrieResult<&mut V>
    where
        F: FnOnce() -> V,
    {
        if key.len() > MAX_KEY_LEN {
            return Err(TrieError::InvalidArgument("key longer than MAX_KEY_LEN"));
        }

        let Some(root) = self.root.as_ref() else {
            let leaf = Leaf::new_in(key, make(), &self.alloc).map_err(alloc_failed)?;
            trace!(key_len = key.len(), "new root leaf");
            self.weight += 1;
            return Ok(self.root.insert(Node::Leaf(leaf)).expect_leaf_mut().value_mut());
        };

        let Some(divergence) = Divergence::between(key, root.closest_leaf(key).key()) else {
            // Already stored.
            return self.get_try(key).ok_or(TrieError::NotFound);
        };

        let leaf = Leaf::new_in(key, make(), &self.alloc).map_err(alloc_failed)?;
        let Some(root) = self.root.as_mut() else {
            unreachable!("root checked above");
        };
        let value = Self::insert_below(root, key, &divergence, Node::Leaf(leaf), &self.alloc)
            .map_err(alloc_failed)?;
        self.weight += 1;
        Ok(value)
    }

    /// Places `node` (the leaf for `key`) at `divergence`, descending from `slot`.
    fn insert_below<'a>(
        mut slot: &'a mut Node<V>,
        key: &[u8],
        divergence: &Divergence,
        node: Node<V>,
        alloc: &A,
    ) -> Result<&'a mut V, AllocError> {
        enum Step {
            Descend,
            Grow,
            Split,
        }

        loop {
            let step = match &*slot {
                Node::Branch(branch) if branch.crit() < divergence.crit => Step::Descend,
                Node::Branch(branch) if branch.crit() == divergence.crit => Step::Grow,
                _ => Step::Split,
            };

            match step {
                Step::Descend => {
                    let Node::Branch(branch) = slot else {
                        unreachable!()
                    };
                    // Above the divergence point the key agrees with the stored keys, so its
                    // twig is present.
                    slot = match branch.child_mut(key) {
                        Some(child) => child,
                        None => unreachable!("key parts from the trie above its divergence point"),
                    };
                }
                Step::Grow => {
                    let Node::Branch(branch) = slot else {
                        unreachable!()
                    };
                    let index = branch.insert_twig(divergence.key_bit, node, alloc)?;
                    trace!(
                        twigs = branch.len(),
                        crit = ?branch.crit(),
                        "grew branch"
                    );
                    return Ok(branch.twigs_mut()[index].expect_leaf_mut().value_mut());
                }
                Step::Split => {
                    let index = slot.split(
                        divergence.crit,
                        divergence.leaf_bit,
                        divergence.key_bit,
                        node,
                        alloc,
                    )?;
                    trace!(crit = ?divergence.crit, "split subtree");
                    let Node::Branch(branch) = slot else {
                        unreachable!()
                    };
                    return Ok(branch.twigs_mut()[index].expect_leaf_mut().value_mut());
                }
            }
        }
    }

    /// Remove `key`, returning its value.
    ///
    /// Only fails with [`TrieError::NotFound`]. Running out of memory never stops a delete.
    pub fn del(&mut self, key: &[u8]) -> TrieResult<V> {
        let root = self.root.as_mut().ok_or(TrieError::NotFound)?;
        let removed = if root.is_leaf() {
            if root.min_leaf().key() != key {
                return Err(TrieError::NotFound);
            }
            match self.root.take() {
                Some(node) => node,
                None => unreachable!(),
            }
        } else {
            Self::remove_below(root, key, &self.alloc)?
        };
        self.weight -= 1;
        match removed {
            Node::Leaf(leaf) => Ok(unsafe { leaf.into_value(&self.alloc) }),
            Node::Branch(_) => unreachable!("only leaves are removed"),
        }
    }

    /// Detaches the leaf for `key` from the subtree under the branch in `slot`.
    fn remove_below(mut slot: &mut Node<V>, key: &[u8], alloc: &A) -> TrieResult<Node<V>> {
        enum Step {
            Descend(usize),
            Shrink(usize),
            Collapse(usize),
        }

        loop {
            let step = {
                let Node::Branch(branch) = &*slot else {
                    unreachable!("descent only visits branches")
                };
                let bit = branch.twig_bit(key);
                if !branch.has_twig(bit) {
                    return Err(TrieError::NotFound);
                }
                let index = branch.twig_index(bit);
                match &branch.twigs()[index] {
                    Node::Branch(_) => Step::Descend(index),
                    Node::Leaf(leaf) if leaf.key() != key => return Err(TrieError::NotFound),
                    Node::Leaf(_) if branch.len() > 2 => Step::Shrink(bit),
                    Node::Leaf(_) => Step::Collapse(bit),
                }
            };

            match step {
                Step::Descend(index) => {
                    let Node::Branch(branch) = slot else {
                        unreachable!()
                    };
                    slot = &mut branch.twigs_mut()[index];
                }
                Step::Shrink(bit) => {
                    let Node::Branch(branch) = slot else {
                        unreachable!()
                    };
                    return Ok(branch.remove_twig(bit, alloc));
                }
                Step::Collapse(bit) => {
                    trace!("collapsing two-twig branch");
                    return Ok(slot.collapse(bit, alloc));
                }
            }
        }
    }

    /// Remove the smallest key, copying it into `buf`. Returns the key length and the value.
    ///
    /// Fails with [`TrieError::InsufficientSpace`] without touching the trie or `buf` when the
    /// key does not fit.
    pub fn del_first(&mut self, buf: &mut [u8]) -> TrieResult<(usize, V)> {
        let root = self.root.as_ref().ok_or(TrieError::NotFound)?;
        let key = root.min_leaf().key();
        if key.len() > buf.len() {
            return Err(TrieError::InsufficientSpace {
                needed: key.len(),
                available: buf.len(),
            });
        }
        let len = key.len();
        buf[..len].copy_from_slice(key);
        // The key is present, so this cannot fail.
        let value = self.del(&buf[..len])?;
        Ok((len, value))
    }

    /// The smallest key and its value slot.
    pub fn get_first(&mut self) -> Option<(&[u8], &mut V)> {
        Some(self.root.as_mut()?.min_leaf_mut().parts_mut())
    }

    /// Find `key`, or failing that the greatest key below it.
    pub fn get_leq(&mut self, key: &[u8]) -> Leq<'_, V> {
        let Some(root) = self.root.as_ref() else {
            return Leq::NotFound;
        };
        let Some(divergence) = Divergence::between(key, root.closest_leaf(key).key()) else {
            return match self.find_leaf_mut(key) {
                Some(leaf) => {
                    let (key, value) = leaf.parts_mut();
                    Leq::Exact(key, value)
                }
                None => Leq::NotFound,
            };
        };
        let Some(root) = self.root.as_mut() else {
            return Leq::NotFound;
        };
        match Self::predecessor(root, key, &divergence) {
            Some(leaf) => {
                let (key, value) = leaf.parts_mut();
                Leq::Predecessor(key, value)
            }
            None => Leq::NotFound,
        }
    }

    /// The greatest leaf under `node` sorting below `key`, where `key` is absent and parts from
    /// the stored keys at `divergence`.
    fn predecessor<'a>(
        node: &'a mut Node<V>,
        key: &[u8],
        divergence: &Divergence,
    ) -> Option<&'a mut Leaf<V>> {
        let above = matches!(&*node, Node::Branch(branch) if branch.crit() <= divergence.crit);
        if !above {
            // Everything here agrees with the closest leaf at the divergence point, so the
            // whole subtree sorts on one side of the key.
            return if divergence.key_bit > divergence.leaf_bit {
                Some(node.max_leaf_mut())
            } else {
                None
            };
        }

        let Node::Branch(branch) = node else {
            unreachable!()
        };
        if branch.crit() == divergence.crit {
            let below = branch.twig_index(divergence.key_bit);
            return branch.twigs_mut()[..below]
                .last_mut()
                .map(Node::max_leaf_mut);
        }

        let index = branch.twig_index(branch.twig_bit(key));
        let (lower, rest) = branch.twigs_mut().split_at_mut(index);
        match Self::predecessor(&mut rest[0], key, divergence) {
            Some(leaf) => Some(leaf),
            None => lower.last_mut().map(Node::max_leaf_mut),
        }
    }

    /// Call `f` on every value in key order, stopping at the first error.
    pub fn apply<E, F>(&mut self, mut f: F) -> Result<(), E>
    where
        F: FnMut(&mut V) -> Result<(), E>,
    {
        self.iter_mut().try_for_each(|(_, value)| f(value))
    }

    /// Iterate over all entries in ascending key order.
    pub fn iter(&self) -> Iter<'_, V> {
        Iter::new(self.root.as_ref(), self.weight)
    }

    /// Iterate over all entries in ascending key order, with mutable values.
    pub fn iter_mut(&mut self) -> IterMut<'_, V> {
        IterMut::new(self.root.as_mut(), self.weight)
    }

    fn find_leaf_mut(&mut self, key: &[u8]) -> Option<&mut Leaf<V>> {
        let mut node = self.root.as_mut()?;
        loop {
            match node {
                Node::Branch(branch) => node = branch.child_mut(key)?,
                Node::Leaf(leaf) => {
                    return if leaf.key() == key { Some(leaf) } else { None };
                }
            }
        }
    }
}

impl<V, A: Allocator> Drop for QpTrie<V, A> {
    fn drop(&mut self) {
        if let Some(root) = self.root.take() {
            unsafe { root.free(&self.alloc) };
        }
    }
}

impl<V, A: Allocator> TrieStatsTrait for QpTrie<V, A> {
    fn get_trie_stats(&self) -> TrieStats {
        let mut stats = TrieStats::default();
        if let Some(root) = &self.root {
            update_trie_stats(&mut stats, root, 0);
        }
        stats.finish()
    }
}

impl<V: Debug, A: Allocator> Debug for QpTrie<V, A> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(
                self.iter()
                    .map(|(key, value)| (String::from_utf8_lossy(key), value)),
            )
            .finish()
    }
}

impl<'a, V, A: Allocator> IntoIterator for &'a QpTrie<V, A> {
    type Item = (&'a [u8], &'a V);
    type IntoIter = Iter<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, V, A: Allocator> IntoIterator for &'a mut QpTrie<V, A> {
    type Item = (&'a [u8], &'a mut V);
    type IntoIter = IterMut<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

impl<K: AsRef<[u8]>, V, A: Allocator> Extend<(K, V)> for QpTrie<V, A> {
    /// Panics on oversized keys; aborts through `handle_alloc_error` when memory runs out, like
    /// the standard collections.
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            match self.insert(key.as_ref(), value) {
                Ok(_) => {}
                Err(TrieError::AllocationFailure(layout)) => std::alloc::handle_alloc_error(layout),
                Err(err) => panic!("cannot insert key: {err}"),
            }
        }
    }
}

impl<K: AsRef<[u8]>, V> FromIterator<(K, V)> for QpTrie<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut trie = QpTrie::new();
        trie.extend(iter);
        trie
    }
}
