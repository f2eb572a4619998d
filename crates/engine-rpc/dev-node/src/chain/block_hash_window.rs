//! Sliding window of the most recent block hashes.
//!
//! Mirrors `BLOCKHASH`: the last `capacity` heights up to and including the
//! head are served, everything else reads as [`SENTINEL_HASH`].

use alloy_primitives::B256;
use engine_rpc_core::SENTINEL_HASH;
use std::{
    collections::VecDeque,
    num::NonZeroU64,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WindowError {
    #[error("Block height {got} does not extend the window head, expected {expected}")]
    NonContiguous { expected: u64, got: u64 },
}

/// Fixed-capacity, height-contiguous hash window.
#[derive(Debug, Clone)]
pub struct BlockHashWindow {
    capacity: NonZeroU64,
    /// Height of `hashes[0]`. Meaningless while the window is empty.
    oldest: u64,
    hashes: VecDeque<B256>,
}

impl BlockHashWindow {
    pub fn new(capacity: NonZeroU64) -> Self {
        Self {
            capacity,
            oldest: 0,
            hashes: VecDeque::new(),
        }
    }

    /// Appends the hash for `height`, evicting the oldest entry when full.
    ///
    /// The first push may start at any height; every later push must be for
    /// `head + 1`.
    pub fn push(&mut self, height: u64, hash: B256) -> Result<(), WindowError> {
        if let Some(head) = self.head() {
            let expected = head + 1;
            if height != expected {
                return Err(WindowError::NonContiguous {
                    expected,
                    got: height,
                });
            }
        } else {
            self.oldest = height;
        }

        self.hashes.push_back(hash);
        if self.hashes.len() as u64 > self.capacity.get() {
            self.hashes.pop_front();
            self.oldest += 1;
        }
        Ok(())
    }

    /// Hash recorded for `height`, or the sentinel if it is not retained.
    pub fn get(&self, height: u64) -> B256 {
        if height < self.oldest {
            return SENTINEL_HASH;
        }
        usize::try_from(height - self.oldest)
            .ok()
            .and_then(|offset| self.hashes.get(offset))
            .copied()
            .unwrap_or(SENTINEL_HASH)
    }

    /// Newest retained height.
    pub fn head(&self) -> Option<u64> {
        (!self.hashes.is_empty()).then(|| self.oldest + self.hashes.len() as u64 - 1)
    }

    /// Oldest retained height.
    pub fn oldest(&self) -> Option<u64> {
        (!self.hashes.is_empty()).then_some(self.oldest)
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn capacity(&self) -> NonZeroU64 {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}
