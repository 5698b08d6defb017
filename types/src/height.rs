//! Logical block height — the only notion of "now" the engine knows.
//!
//! Heights are supplied by the host and never decrease. Expiry, cooldown and
//! cycle boundaries are all measured in blocks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A monotonically non-decreasing logical height.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockHeight(u64);

impl BlockHeight {
    pub fn new(height: u64) -> Self {
        Self(height)
    }

    pub fn get(&self) -> u64 {
        self.0
    }

    /// Height `blocks` after this one, saturating at `u64::MAX`.
    pub fn offset(&self, blocks: u64) -> Self {
        Self(self.0.saturating_add(blocks))
    }

    /// Blocks elapsed between this height and `now` (0 if `now` is earlier).
    pub fn elapsed_since(&self, now: BlockHeight) -> u64 {
        now.0.saturating_sub(self.0)
    }
}

impl fmt::Display for BlockHeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for BlockHeight {
    fn from(height: u64) -> Self {
        Self(height)
    }
}

/// Host-side source of the current height.
pub trait HeightSource: Send + Sync {
    fn current_height(&self) -> BlockHeight;
}
