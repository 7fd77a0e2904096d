//! Error type shared by the fallible trie operations.

use std::alloc::Layout;

use thiserror::Error;

use crate::alloc::AllocError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TrieError {
    /// The key, or any entry at all, is absent.
    #[error("key not found")]
    NotFound,
    /// A caller-supplied output buffer cannot hold the key being copied out.
    #[error("output buffer too small: key needs {needed} bytes, buffer holds {available}")]
    InsufficientSpace { needed: usize, available: usize },
    /// The trie's allocator refused a block.
    #[error("allocation of {} bytes (align {}) failed", .0.size(), .0.align())]
    AllocationFailure(Layout),
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

impl From<AllocError> for TrieError {
    fn from(err: AllocError) -> Self {
        TrieError::AllocationFailure(err.layout())
    }
}

pub type TrieResult<T> = Result<T, TrieError>;
