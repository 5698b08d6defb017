//! Eligibility entries and per-claimant claim records.

use greenproof_types::{BlockHeight, Category, Identity};
use serde::{Deserialize, Serialize};

/// Stored at `elig/<id>` when a proof is approved. The id is the proof id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityEntry {
    pub id: u64,
    pub submitter: Identity,
    pub category: Category,
    pub approved: bool,
    /// Height of approval; the cooldown runs from here.
    pub approved_at: BlockHeight,
}

impl EligibilityEntry {
    /// Blocks left before a claim is allowed at `now`; 0 once it is.
    pub fn cooldown_remaining(&self, cooldown_blocks: u64, now: BlockHeight) -> u64 {
        cooldown_blocks.saturating_sub(self.approved_at.elapsed_since(now))
    }
}

/// Stored at `claim/<eligibility id>/<claimant>`.
///
/// Created unclaimed alongside the eligibility entry; flipped exactly once.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub claimed: bool,
    /// Paid amount, 0 until claimed.
    pub amount: u128,
    /// Cycle the payout was counted against.
    pub cycle: u64,
    pub claimed_at: Option<BlockHeight>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooldown_counts_down_from_approval() {
        let entry = EligibilityEntry {
            id: 1,
            submitter: Identity::new("farmer"),
            category: Category::Organic,
            approved: true,
            approved_at: BlockHeight::new(1_000),
        };
        assert_eq!(entry.cooldown_remaining(144, BlockHeight::new(1_010)), 134);
        assert_eq!(entry.cooldown_remaining(144, BlockHeight::new(1_144)), 0);
        assert_eq!(entry.cooldown_remaining(144, BlockHeight::new(5_000)), 0);
        assert_eq!(entry.cooldown_remaining(0, BlockHeight::new(1_000)), 0);
    }
}
