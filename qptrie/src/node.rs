use std::alloc::Layout;
use std::mem::ManuallyDrop;
use std::ptr::{self, NonNull};
use std::slice;

use crate::alloc::{AllocError, Allocator};
use crate::utils::bitset::{Bitset32, BitsetTrait};
use crate::utils::u8_keys::first_mismatch;

/// Longest key a trie accepts.
pub const MAX_KEY_LEN: usize = u32::MAX as usize;

/// One bitmap position for "key ends here" plus one per nibble value.
pub(crate) const TWIG_WIDTH: usize = 17;

/// Bitmap position taken by keys that end before the branch's byte.
pub(crate) const END_OF_KEY: usize = 0;

pub(crate) type Bitmap = Bitset32<TWIG_WIDTH>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Nibble {
    High,
    Low,
}

/// The half-byte of the key a branch decides on. Orders the way keys are compared: by byte
/// index, high nibble before low nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Crit {
    index: u32,
    nibble: Nibble,
}

impl Crit {
    pub(crate) fn new(index: usize, nibble: Nibble) -> Self {
        debug_assert!(index <= MAX_KEY_LEN);
        Self {
            index: index as u32,
            nibble,
        }
    }

    /// Bitmap position selected by `key` at this critical position.
    #[inline]
    pub(crate) fn twig_bit(&self, key: &[u8]) -> usize {
        let Some(&byte) = key.get(self.index as usize) else {
            return END_OF_KEY;
        };
        let nibble = match self.nibble {
            Nibble::High => byte >> 4,
            Nibble::Low => byte & 0x0f,
        };
        nibble as usize + 1
    }
}

/// The first nibble at which a query key parts from a stored key, with the bitmap position each
/// of them selects there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Divergence {
    pub(crate) crit: Crit,
    pub(crate) key_bit: usize,
    pub(crate) leaf_bit: usize,
}

impl Divergence {
    /// `None` when both keys are equal.
    pub(crate) fn between(key: &[u8], stored: &[u8]) -> Option<Self> {
        let index = first_mismatch(key, stored);
        let nibble = match (key.get(index), stored.get(index)) {
            (None, None) => return None,
            (Some(a), Some(b)) if (a ^ b) & 0xf0 == 0 => Nibble::Low,
            // Differing high nibbles, or one key ends here.
            _ => Nibble::High,
        };
        let crit = Crit::new(index, nibble);
        Some(Self {
            crit,
            key_bit: crit.twig_bit(key),
            leaf_bit: crit.twig_bit(stored),
        })
    }
}

/// Owned copy of a key, allocated through the trie's allocator.
pub(crate) struct KeyBytes {
    ptr: NonNull<u8>,
    len: u32,
}

impl KeyBytes {
    fn layout(len: usize) -> Result<Layout, AllocError> {
        Layout::array::<u8>(len).map_err(|_| AllocError::new(Layout::new::<u8>()))
    }

    fn copy_in<A: Allocator>(key: &[u8], alloc: &A) -> Result<Self, AllocError> {
        debug_assert!(key.len() <= MAX_KEY_LEN);
        if key.is_empty() {
            return Ok(Self {
                ptr: NonNull::dangling(),
                len: 0,
            });
        }
        let ptr = alloc.allocate(Self::layout(key.len())?)?;
        unsafe { ptr::copy_nonoverlapping(key.as_ptr(), ptr.as_ptr(), key.len()) };
        Ok(Self {
            ptr,
            len: key.len() as u32,
        })
    }

    #[inline]
    fn as_slice(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len as usize) }
    }

    /// # Safety
    ///
    /// Must have been created with `alloc`.
    unsafe fn free<A: Allocator>(self, alloc: &A) {
        if self.len == 0 {
            return;
        }
        if let Ok(layout) = Self::layout(self.len as usize) {
            unsafe { alloc.deallocate(self.ptr, layout) };
        }
    }
}

pub(crate) struct Leaf<V> {
    key: KeyBytes,
    value: ManuallyDrop<V>,
}

impl<V> Leaf<V> {
    pub(crate) fn new_in<A: Allocator>(key: &[u8], value: V, alloc: &A) -> Result<Self, AllocError> {
        Ok(Self {
            key: KeyBytes::copy_in(key, alloc)?,
            value: ManuallyDrop::new(value),
        })
    }

    #[inline]
    pub(crate) fn key(&self) -> &[u8] {
        self.key.as_slice()
    }

    #[inline]
    pub(crate) fn value(&self) -> &V {
        &*self.value
    }

    #[inline]
    pub(crate) fn value_mut(&mut self) -> &mut V {
        &mut *self.value
    }

    #[inline]
    pub(crate) fn parts(&self) -> (&[u8], &V) {
        (self.key.as_slice(), &*self.value)
    }

    #[inline]
    pub(crate) fn parts_mut(&mut self) -> (&[u8], &mut V) {
        (self.key.as_slice(), &mut *self.value)
    }

    /// Releases the key copy and hands the value back.
    ///
    /// # Safety
    ///
    /// Must have been created with `alloc`.
    pub(crate) unsafe fn into_value<A: Allocator>(self, alloc: &A) -> V {
        let Leaf { key, value } = self;
        unsafe { key.free(alloc) };
        ManuallyDrop::into_inner(value)
    }
}

pub(crate) struct Branch<V> {
    crit: Crit,
    bitmap: Bitmap,
    // `bitmap.size()` nodes ordered by bitmap position, in a block sized for `cap`.
    twigs: NonNull<Node<V>>,
    cap: u8,
}

impl<V> Branch<V> {
    fn twig_layout(len: usize) -> Layout {
        debug_assert!(len > 0 && len <= TWIG_WIDTH);
        match Layout::array::<Node<V>>(len) {
            Ok(layout) => layout,
            Err(_) => unreachable!("a twig array holds at most {TWIG_WIDTH} nodes"),
        }
    }

    fn alloc_twigs<A: Allocator>(len: usize, alloc: &A) -> Result<NonNull<Node<V>>, AllocError> {
        Ok(alloc.allocate(Self::twig_layout(len))?.cast())
    }

    #[inline]
    pub(crate) fn crit(&self) -> Crit {
        self.crit
    }

    #[cfg(test)]
    pub(crate) fn bitmap(&self) -> Bitmap {
        self.bitmap
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.bitmap.size()
    }

    #[inline]
    pub(crate) fn twigs(&self) -> &[Node<V>] {
        unsafe { slice::from_raw_parts(self.twigs.as_ptr(), self.len()) }
    }

    #[inline]
    pub(crate) fn twigs_mut(&mut self) -> &mut [Node<V>] {
        unsafe { slice::from_raw_parts_mut(self.twigs.as_ptr(), self.len()) }
    }

    #[inline]
    pub(crate) fn twig_bit(&self, key: &[u8]) -> usize {
        self.crit.twig_bit(key)
    }

    #[inline]
    pub(crate) fn has_twig(&self, bit: usize) -> bool {
        self.bitmap.check(bit)
    }

    /// Array index of the twig at `bit`, or where it would go: the number of twigs below it.
    #[inline]
    pub(crate) fn twig_index(&self, bit: usize) -> usize {
        self.bitmap.rank(bit)
    }

    #[inline]
    pub(crate) fn child(&self, key: &[u8]) -> Option<&Node<V>> {
        let bit = self.twig_bit(key);
        if !self.has_twig(bit) {
            return None;
        }
        Some(&self.twigs()[self.twig_index(bit)])
    }

    #[inline]
    pub(crate) fn child_mut(&mut self, key: &[u8]) -> Option<&mut Node<V>> {
        let bit = self.twig_bit(key);
        if !self.has_twig(bit) {
            return None;
        }
        let index = self.twig_index(bit);
        Some(&mut self.twigs_mut()[index])
    }

    /// Attaches `node` at the free position `bit`, reallocating the twig array one slot larger
    /// unless a spare slot is left over from an earlier shrink. Returns the array index of the
    /// new twig. On failure `node` is released.
    pub(crate) fn insert_twig<A: Allocator>(
        &mut self,
        bit: usize,
        node: Node<V>,
        alloc: &A,
    ) -> Result<usize, AllocError> {
        debug_assert!(!self.has_twig(bit));
        let len = self.len();
        let index = self.twig_index(bit);
        if len < self.cap as usize {
            unsafe {
                let twigs = self.twigs.as_ptr();
                ptr::copy(twigs.add(index), twigs.add(index + 1), len - index);
                twigs.add(index).write(node);
            }
            self.bitmap.set(bit);
            return Ok(index);
        }
        let twigs = match Self::alloc_twigs(len + 1, alloc) {
            Ok(twigs) => twigs,
            Err(err) => {
                unsafe { node.free(alloc) };
                return Err(err);
            }
        };
        unsafe {
            let old = self.twigs.as_ptr();
            let new = twigs.as_ptr();
            ptr::copy_nonoverlapping(old, new, index);
            new.add(index).write(node);
            ptr::copy_nonoverlapping(old.add(index), new.add(index + 1), len - index);
            alloc.deallocate(self.twigs.cast(), Self::twig_layout(self.cap as usize));
        }
        self.twigs = twigs;
        self.cap = (len + 1) as u8;
        self.bitmap.set(bit);
        Ok(index)
    }

    /// Detaches the twig at `bit` and moves the rest into a twig array one slot smaller. If that
    /// array can't be allocated the twigs are compacted in place and the larger block is kept.
    /// The branch must keep at least two twigs; see [`Node::collapse`] otherwise.
    pub(crate) fn remove_twig<A: Allocator>(&mut self, bit: usize, alloc: &A) -> Node<V> {
        debug_assert!(self.has_twig(bit));
        let len = self.len();
        debug_assert!(len > 2);
        let index = self.twig_index(bit);
        let old = self.twigs.as_ptr();
        let removed = unsafe { ptr::read(old.add(index)) };
        match Self::alloc_twigs(len - 1, alloc) {
            Ok(twigs) => unsafe {
                let new = twigs.as_ptr();
                ptr::copy_nonoverlapping(old, new, index);
                ptr::copy_nonoverlapping(old.add(index + 1), new.add(index), len - index - 1);
                alloc.deallocate(self.twigs.cast(), Self::twig_layout(self.cap as usize));
                self.twigs = twigs;
                self.cap = (len - 1) as u8;
            },
            Err(_) => unsafe { ptr::copy(old.add(index + 1), old.add(index), len - index - 1) },
        }
        self.bitmap.unset(bit);
        removed
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.cap as usize
    }

    /// # Safety
    ///
    /// Must have been built with `alloc`.
    unsafe fn free<A: Allocator>(self, alloc: &A) {
        for index in 0..self.len() {
            unsafe { ptr::read(self.twigs.as_ptr().add(index)).free(alloc) };
        }
        unsafe { alloc.deallocate(self.twigs.cast(), Self::twig_layout(self.cap as usize)) };
    }
}

/// A trie node. Nodes carry no drop glue: their memory belongs to the trie's allocator and is
/// released through [`Node::free`].
pub(crate) enum Node<V> {
    Leaf(Leaf<V>),
    Branch(Branch<V>),
}

impl<V> Node<V> {
    #[inline]
    pub(crate) fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    pub(crate) fn expect_leaf_mut(&mut self) -> &mut Leaf<V> {
        match self {
            Node::Leaf(leaf) => leaf,
            Node::Branch(_) => unreachable!("expected a leaf"),
        }
    }

    /// Follows `key` where the bitmap allows and the lowest twig where it doesn't. The leaf
    /// reached shares every branch decision with `key` up to the first point where `key` parts
    /// from the stored set.
    pub(crate) fn closest_leaf(&self, key: &[u8]) -> &Leaf<V> {
        let mut node = self;
        loop {
            match node {
                Node::Leaf(leaf) => return leaf,
                Node::Branch(branch) => {
                    node = match branch.child(key) {
                        Some(child) => child,
                        None => &branch.twigs()[0],
                    }
                }
            }
        }
    }

    pub(crate) fn min_leaf(&self) -> &Leaf<V> {
        let mut node = self;
        loop {
            match node {
                Node::Leaf(leaf) => return leaf,
                Node::Branch(branch) => node = &branch.twigs()[0],
            }
        }
    }

    pub(crate) fn min_leaf_mut(&mut self) -> &mut Leaf<V> {
        let mut node = self;
        loop {
            match node {
                Node::Leaf(leaf) => return leaf,
                Node::Branch(branch) => node = &mut branch.twigs_mut()[0],
            }
        }
    }

    pub(crate) fn max_leaf_mut(&mut self) -> &mut Leaf<V> {
        let mut node = self;
        loop {
            match node {
                Node::Leaf(leaf) => return leaf,
                Node::Branch(branch) => {
                    let last = branch.len() - 1;
                    node = &mut branch.twigs_mut()[last];
                }
            }
        }
    }

    /// Replaces this subtree with a two-twig branch at `crit` that holds the old subtree at
    /// `old_bit` and `node` at `new_bit`. Returns the array index of `node`. On failure the
    /// subtree is untouched and `node` is released.
    pub(crate) fn split<A: Allocator>(
        &mut self,
        crit: Crit,
        old_bit: usize,
        new_bit: usize,
        node: Node<V>,
        alloc: &A,
    ) -> Result<usize, AllocError> {
        debug_assert_ne!(old_bit, new_bit);
        let twigs = match Branch::<V>::alloc_twigs(2, alloc) {
            Ok(twigs) => twigs,
            Err(err) => {
                unsafe { node.free(alloc) };
                return Err(err);
            }
        };
        let (new_index, old_index) = if new_bit < old_bit { (0, 1) } else { (1, 0) };
        let mut bitmap = Bitmap::new();
        bitmap.set(old_bit);
        bitmap.set(new_bit);
        unsafe {
            let old = ptr::read(self);
            twigs.as_ptr().add(old_index).write(old);
            twigs.as_ptr().add(new_index).write(node);
            ptr::write(
                self,
                Node::Branch(Branch {
                    crit,
                    bitmap,
                    twigs,
                    cap: 2,
                }),
            );
        }
        Ok(new_index)
    }

    /// Removes the twig at `bit` from a two-twig branch and puts the other twig in the branch's
    /// place. Returns the removed twig. Never allocates.
    pub(crate) fn collapse<A: Allocator>(&mut self, bit: usize, alloc: &A) -> Node<V> {
        let Node::Branch(branch) = self else {
            unreachable!("only branches collapse");
        };
        debug_assert_eq!(branch.len(), 2);
        let index = branch.twig_index(bit);
        let twigs = branch.twigs;
        let layout = Branch::<V>::twig_layout(branch.cap as usize);
        unsafe {
            let removed = ptr::read(twigs.as_ptr().add(index));
            let kept = ptr::read(twigs.as_ptr().add(1 - index));
            alloc.deallocate(twigs.cast(), layout);
            ptr::write(self, kept);
            removed
        }
    }

    /// Releases this subtree: key copies, twig arrays, and values (which are dropped).
    ///
    /// # Safety
    ///
    /// Every allocation in the subtree must come from `alloc`.
    pub(crate) unsafe fn free<A: Allocator>(self, alloc: &A) {
        match self {
            Node::Leaf(leaf) => drop(unsafe { leaf.into_value(alloc) }),
            Node::Branch(branch) => unsafe { branch.free(alloc) },
        }
    }
}

// Nodes own everything they point to.
unsafe impl<V: Send> Send for Leaf<V> {}
unsafe impl<V: Sync> Sync for Leaf<V> {}
unsafe impl<V: Send> Send for Branch<V> {}
unsafe impl<V: Sync> Sync for Branch<V> {}
