//! Reward cycle registers and the pure arithmetic over them.

use std::collections::BTreeMap;

use greenproof_types::{BlockHeight, Category, EngineError, Identity, PayoutMode, RewardParams};
use serde::{Deserialize, Serialize};

/// Stored at `meta/reward_cycle`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardCycleState {
    /// Identity allowed to change the reward registers.
    pub authority: Identity,
    pub treasury_balance: u128,
    pub current_cycle: u64,
    /// Start of the current cycle. Always a multiple of the cycle length
    /// away from the first boundary.
    pub last_cycle_boundary: BlockHeight,
    pub cycle_duration_blocks: u64,
    pub per_cycle_cap: u128,
    /// Paid out since `last_cycle_boundary`.
    pub distributed_this_cycle: u128,
    pub base_reward: u128,
    pub cooldown_blocks: u64,
    pub payout_mode: PayoutMode,
    pub multipliers: BTreeMap<Category, u32>,
}

impl RewardCycleState {
    /// Fresh registers with an empty treasury, cycle 0 starting at `start`.
    pub fn new(authority: Identity, params: &RewardParams, start: BlockHeight) -> Self {
        Self {
            authority,
            treasury_balance: 0,
            current_cycle: 0,
            last_cycle_boundary: start,
            cycle_duration_blocks: params.cycle_duration_blocks,
            per_cycle_cap: params.per_cycle_cap,
            distributed_this_cycle: 0,
            base_reward: params.base_reward,
            cooldown_blocks: params.cooldown_blocks,
            payout_mode: params.payout_mode,
            multipliers: params.multipliers.clone(),
        }
    }

    /// Height at which the next cycle begins.
    pub fn next_boundary(&self) -> BlockHeight {
        self.last_cycle_boundary.offset(self.cycle_duration_blocks)
    }

    /// Catch up to the cycle containing `now`.
    ///
    /// Skips every elapsed cycle in whole `cycle_duration_blocks` steps, so
    /// the boundary stays on the fixed grid and never runs past `now`.
    /// Returns whether any cycle boundary was crossed.
    pub fn advance(&mut self, now: BlockHeight) -> bool {
        if self.cycle_duration_blocks == 0 || now < self.next_boundary() {
            return false;
        }
        let steps = self.last_cycle_boundary.elapsed_since(now) / self.cycle_duration_blocks;
        self.current_cycle = self.current_cycle.saturating_add(steps);
        self.last_cycle_boundary = self
            .last_cycle_boundary
            .offset(steps.saturating_mul(self.cycle_duration_blocks));
        self.distributed_this_cycle = 0;
        true
    }

    pub fn multiplier(&self, category: Category) -> Option<u32> {
        self.multipliers.get(&category).copied()
    }

    /// `base_reward * multiplier / 100`, truncated.
    pub fn reward_for(&self, category: Category) -> Result<u128, EngineError> {
        let multiplier = self
            .multiplier(category)
            .ok_or(EngineError::InvalidCategory(category))?;
        self.base_reward
            .checked_mul(u128::from(multiplier))
            .map(|scaled| scaled / 100)
            .ok_or_else(|| EngineError::InvalidInput(format!("reward for {category} overflows")))
    }

    /// Room left under the per-cycle cap.
    pub fn cap_remaining(&self) -> u128 {
        self.per_cycle_cap.saturating_sub(self.distributed_this_cycle)
    }
}
