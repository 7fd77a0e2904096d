//! Allocation capability used for every node and key buffer of a trie.
//!
//! A trie never talks to the global heap directly. Key copies and twig arrays are requested from
//! an [`Allocator`], which defaults to [`Global`]. Callers that need arena-style or accounted
//! memory pass their own implementation to [`QpTrie::new_in`](crate::QpTrie::new_in); a shared
//! reference to an allocator is an allocator too, so one context can back several tries.

use std::alloc::Layout;
use std::cell::Cell;
use std::fmt::{Display, Formatter};
use std::ptr::NonNull;

/// The allocator refused to provide a block of the given layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocError(Layout);

impl AllocError {
    pub fn new(layout: Layout) -> Self {
        Self(layout)
    }

    pub fn layout(&self) -> Layout {
        self.0
    }
}

impl Display for AllocError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "memory allocation of {} bytes failed", self.0.size())
    }
}

impl std::error::Error for AllocError {}

/// A pair of allocate/free operations over fixed-size blocks.
///
/// # Safety
///
/// Blocks returned by `allocate` must be valid for reads and writes of `layout.size()` bytes,
/// aligned to `layout.align()`, and stay valid until passed to `deallocate` with the same layout.
/// The trie never asks for zero-sized blocks.
pub unsafe trait Allocator {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate` on this allocator with exactly `layout`, and
    /// must not be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

unsafe impl<A: Allocator + ?Sized> Allocator for &A {
    #[inline]
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        (**self).allocate(layout)
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { (**self).deallocate(ptr, layout) }
    }
}

/// The platform heap.
#[derive(Debug, Default, Clone, Copy)]
pub struct Global;

unsafe impl Allocator for Global {
    #[inline]
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        debug_assert!(layout.size() > 0);
        let ptr = unsafe { std::alloc::alloc(layout) };
        NonNull::new(ptr).ok_or(AllocError(layout))
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) }
    }
}

/// Forwards to another allocator while keeping track of what is currently handed out.
///
/// Used to measure the memory a trie holds per key and to check that clearing or dropping a
/// trie gives everything back.
#[derive(Debug, Default)]
pub struct CountingAllocator<A: Allocator = Global> {
    inner: A,
    live_allocations: Cell<usize>,
    live_bytes: Cell<usize>,
    total_allocations: Cell<usize>,
}

impl CountingAllocator<Global> {
    pub fn new() -> Self {
        Self::wrapping(Global)
    }
}

impl<A: Allocator> CountingAllocator<A> {
    pub fn wrapping(inner: A) -> Self {
        Self {
            inner,
            live_allocations: Cell::new(0),
            live_bytes: Cell::new(0),
            total_allocations: Cell::new(0),
        }
    }

    /// Blocks handed out and not yet returned.
    pub fn live_allocations(&self) -> usize {
        self.live_allocations.get()
    }

    /// Bytes handed out and not yet returned.
    pub fn live_bytes(&self) -> usize {
        self.live_bytes.get()
    }

    /// Successful allocations over the allocator's whole life.
    pub fn total_allocations(&self) -> usize {
        self.total_allocations.get()
    }
}

unsafe impl<A: Allocator> Allocator for CountingAllocator<A> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let ptr = self.inner.allocate(layout)?;
        self.live_allocations.set(self.live_allocations.get() + 1);
        self.live_bytes.set(self.live_bytes.get() + layout.size());
        self.total_allocations.set(self.total_allocations.get() + 1);
        Ok(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.live_allocations.set(self.live_allocations.get() - 1);
        self.live_bytes.set(self.live_bytes.get() - layout.size());
        unsafe { self.inner.deallocate(ptr, layout) }
    }
}
