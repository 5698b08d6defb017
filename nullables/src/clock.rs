//! Nullable clock — deterministic block height for testing.

use greenproof_types::{BlockHeight, HeightSource};
use std::sync::atomic::{AtomicU64, Ordering};

/// A deterministic height source.
///
/// Height only advances when you tell it to.
pub struct NullClock {
    current: AtomicU64,
}

impl NullClock {
    pub fn new(initial_height: u64) -> Self {
        Self {
            current: AtomicU64::new(initial_height),
        }
    }

    /// Get the current height.
    pub fn now(&self) -> BlockHeight {
        BlockHeight::new(self.current.load(Ordering::SeqCst))
    }

    /// Advance by a number of blocks.
    pub fn advance(&self, blocks: u64) {
        self.current.fetch_add(blocks, Ordering::SeqCst);
    }

    /// Set the height to a specific value.
    pub fn set(&self, height: u64) {
        self.current.store(height, Ordering::SeqCst);
    }
}

impl HeightSource for NullClock {
    fn current_height(&self) -> BlockHeight {
        self.now()
    }
}
