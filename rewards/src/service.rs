//! Reward Distribution Service — claims, treasury deposits and the
//! authority-gated reward registers.
//!
//! Same discipline as the verification side: validate, stage into one
//! [`WriteBatch`], move tokens, commit. A refused token call drops the batch.

use std::sync::Arc;

use greenproof_store::{KvStore, WriteBatch};
use greenproof_types::params::{check_multiplier, check_positive};
use greenproof_types::{BlockHeight, Category, EngineError, Identity, PayoutMode, TokenLedger};
use tracing::{debug, info, warn};

use crate::claim::{ClaimRecord, EligibilityEntry};
use crate::cycle::RewardCycleState;
use crate::events::RewardEvent;
use crate::ledger::RewardLedger;

/// What a successful claim paid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimReceipt {
    pub id: u64,
    pub claimant: Identity,
    pub amount: u128,
    pub cycle: u64,
}

pub struct RewardService<S: KvStore> {
    ledger: Arc<RewardLedger<S>>,
    token: Arc<dyn TokenLedger>,
    pending_events: Vec<RewardEvent>,
}

impl<S: KvStore> RewardService<S> {
    pub fn new(ledger: Arc<RewardLedger<S>>, token: Arc<dyn TokenLedger>) -> Self {
        Self {
            ledger,
            token,
            pending_events: Vec::new(),
        }
    }

    pub fn ledger(&self) -> &Arc<RewardLedger<S>> {
        &self.ledger
    }

    // ── Claims ──────────────────────────────────────────────────────────

    /// Pay the reward for eligibility `id` to `caller`.
    pub fn claim(&mut self, id: u64, caller: &Identity, now: BlockHeight) -> Result<ClaimReceipt, EngineError> {
        let mut batch = WriteBatch::new();
        let entry = self
            .ledger
            .eligibility(&batch, id)?
            .ok_or_else(|| EngineError::NotFound(format!("eligibility {id}")))?;
        if *caller != entry.submitter {
            return Err(EngineError::Unauthorized(caller.clone()));
        }
        if !entry.approved {
            return Err(EngineError::NotApproved { id });
        }
        let mut record = self
            .ledger
            .claim_record(&batch, id, caller)?
            .unwrap_or_default();
        if record.claimed {
            return Err(EngineError::AlreadyClaimed {
                id,
                claimant: caller.clone(),
            });
        }

        let mut state = self.ledger.state(&batch)?;
        let remaining = entry.cooldown_remaining(state.cooldown_blocks, now);
        if remaining > 0 {
            return Err(EngineError::CooldownActive { remaining });
        }

        let advanced = state.advance(now);
        let amount = state.reward_for(entry.category)?;
        if amount > state.cap_remaining() {
            return Err(EngineError::LimitReached(format!(
                "reward {amount} exceeds the {} left in cycle {} (cap {})",
                state.cap_remaining(),
                state.current_cycle,
                state.per_cycle_cap
            )));
        }
        if amount > state.treasury_balance {
            return Err(EngineError::InsufficientTreasury {
                needed: amount,
                available: state.treasury_balance,
            });
        }

        state.treasury_balance -= amount;
        state.distributed_this_cycle += amount;
        record = ClaimRecord {
            claimed: true,
            amount,
            cycle: state.current_cycle,
            claimed_at: Some(now),
        };
        self.ledger.put_state(&mut batch, &state)?;
        self.ledger.put_claim_record(&mut batch, id, caller, &record)?;

        self.pay(state.payout_mode, amount, caller)?;
        self.ledger.store().commit(batch)?;

        if advanced {
            self.cycle_advanced(&state);
        }
        info!(id, claimant = %caller, amount, cycle = state.current_cycle, "reward claimed");
        self.pending_events.push(RewardEvent::RewardClaimed {
            id,
            claimant: caller.clone(),
            amount,
            cycle: state.current_cycle,
        });
        Ok(ClaimReceipt {
            id,
            claimant: caller.clone(),
            amount,
            cycle: state.current_cycle,
        })
    }

    fn pay(&self, mode: PayoutMode, amount: u128, to: &Identity) -> Result<(), EngineError> {
        let result = match mode {
            PayoutMode::Transfer => self.token.transfer_out(amount, to),
            PayoutMode::Mint => self.token.mint(amount, to),
        };
        result.map_err(|e| {
            warn!(claimant = %to, amount, ?mode, error = %e, "reward payout refused");
            EngineError::from(e)
        })
    }

    // ── Cycle & treasury ────────────────────────────────────────────────

    /// Step into the next cycle if its boundary has been reached. Also runs
    /// implicitly on every claim.
    pub fn advance_cycle(&mut self, now: BlockHeight) -> Result<bool, EngineError> {
        let mut batch = WriteBatch::new();
        let mut state = self.ledger.state(&batch)?;
        if !state.advance(now) {
            return Ok(false);
        }
        self.ledger.put_state(&mut batch, &state)?;
        self.ledger.store().commit(batch)?;
        self.cycle_advanced(&state);
        Ok(true)
    }

    fn cycle_advanced(&mut self, state: &RewardCycleState) {
        info!(
            cycle = state.current_cycle,
            boundary = %state.last_cycle_boundary,
            "reward cycle advanced"
        );
        self.pending_events.push(RewardEvent::CycleAdvanced {
            cycle: state.current_cycle,
            boundary: state.last_cycle_boundary.get(),
        });
    }

    /// Move `amount` from `from` into the treasury.
    pub fn deposit_treasury(&mut self, from: &Identity, amount: u128) -> Result<u128, EngineError> {
        check_positive("deposit amount", amount)?;
        let mut batch = WriteBatch::new();
        let mut state = self.ledger.state(&batch)?;
        state.treasury_balance = state
            .treasury_balance
            .checked_add(amount)
            .ok_or_else(|| EngineError::InvalidInput("treasury balance overflow".into()))?;
        self.ledger.put_state(&mut batch, &state)?;

        self.token.transfer_in(amount, from).map_err(|e| {
            warn!(from = %from, amount, error = %e, "treasury deposit refused");
            EngineError::from(e)
        })?;
        self.ledger.store().commit(batch)?;

        debug!(from = %from, amount, balance = state.treasury_balance, "treasury deposit");
        self.pending_events.push(RewardEvent::TreasuryDeposited {
            from: from.clone(),
            amount,
            balance: state.treasury_balance,
        });
        Ok(state.treasury_balance)
    }

    // ── Administration ──────────────────────────────────────────────────

    /// Apply `change` to the registers if `caller` is the authority.
    fn update(
        &mut self,
        caller: &Identity,
        name: &'static str,
        value: String,
        change: impl FnOnce(&mut RewardCycleState),
    ) -> Result<(), EngineError> {
        let mut batch = WriteBatch::new();
        let mut state = self.ledger.state(&batch)?;
        if *caller != state.authority {
            return Err(EngineError::Unauthorized(caller.clone()));
        }
        change(&mut state);
        self.ledger.put_state(&mut batch, &state)?;
        self.ledger.store().commit(batch)?;

        info!(parameter = name, %value, "reward parameter changed");
        self.pending_events
            .push(RewardEvent::ParameterChanged { name, value });
        Ok(())
    }

    pub fn set_base_reward(&mut self, caller: &Identity, value: u128) -> Result<(), EngineError> {
        check_positive("base_reward", value)?;
        self.update(caller, "base_reward", value.to_string(), |s| s.base_reward = value)
    }

    pub fn set_multiplier(
        &mut self,
        caller: &Identity,
        category: Category,
        value: u32,
    ) -> Result<(), EngineError> {
        check_multiplier(value)?;
        self.update(caller, "multiplier", format!("{category}={value}"), |s| {
            s.multipliers.insert(category, value);
        })
    }

    /// After removal, approvals in `category` fail `InvalidCategory`.
    pub fn remove_multiplier(&mut self, caller: &Identity, category: Category) -> Result<(), EngineError> {
        self.update(caller, "multiplier", format!("{category} removed"), |s| {
            s.multipliers.remove(&category);
        })
    }

    /// Takes effect from the next boundary check; the current boundary
    /// stays where it is.
    pub fn set_cycle_duration(&mut self, caller: &Identity, blocks: u64) -> Result<(), EngineError> {
        check_positive("cycle_duration_blocks", u128::from(blocks))?;
        self.update(caller, "cycle_duration_blocks", blocks.to_string(), |s| {
            s.cycle_duration_blocks = blocks
        })
    }

    pub fn set_per_cycle_cap(&mut self, caller: &Identity, value: u128) -> Result<(), EngineError> {
        check_positive("per_cycle_cap", value)?;
        self.update(caller, "per_cycle_cap", value.to_string(), |s| s.per_cycle_cap = value)
    }

    pub fn set_cooldown_blocks(&mut self, caller: &Identity, blocks: u64) -> Result<(), EngineError> {
        self.update(caller, "cooldown_blocks", blocks.to_string(), |s| {
            s.cooldown_blocks = blocks
        })
    }

    pub fn set_payout_mode(&mut self, caller: &Identity, mode: PayoutMode) -> Result<(), EngineError> {
        self.update(caller, "payout_mode", format!("{mode:?}"), |s| s.payout_mode = mode)
    }

    pub fn set_authority(&mut self, caller: &Identity, new_authority: &Identity) -> Result<(), EngineError> {
        if !new_authority.is_valid() {
            return Err(EngineError::InvalidInput(format!(
                "invalid authority identity {:?}",
                new_authority.as_str()
            )));
        }
        let next = new_authority.clone();
        self.update(caller, "authority", new_authority.to_string(), |s| s.authority = next)
    }

    // ── Queries ─────────────────────────────────────────────────────────

    pub fn get_cycle_state(&self) -> Result<RewardCycleState, EngineError> {
        self.ledger.state(&WriteBatch::new())
    }

    pub fn get_treasury_balance(&self) -> Result<u128, EngineError> {
        Ok(self.get_cycle_state()?.treasury_balance)
    }

    pub fn get_current_cycle(&self) -> Result<u64, EngineError> {
        Ok(self.get_cycle_state()?.current_cycle)
    }

    pub fn get_multiplier(&self, category: Category) -> Result<Option<u32>, EngineError> {
        Ok(self.get_cycle_state()?.multiplier(category))
    }

    pub fn get_eligibility(&self, id: u64) -> Result<Option<EligibilityEntry>, EngineError> {
        self.ledger.eligibility(&WriteBatch::new(), id)
    }

    /// Whether `claimant` has already been paid for eligibility `id`.
    pub fn get_claim_status(&self, id: u64, claimant: &Identity) -> Result<bool, EngineError> {
        Ok(self
            .get_claim(id, claimant)?
            .is_some_and(|record| record.claimed))
    }

    pub fn get_claim(&self, id: u64, claimant: &Identity) -> Result<Option<ClaimRecord>, EngineError> {
        self.ledger.claim_record(&WriteBatch::new(), id, claimant)
    }

    pub fn drain_events(&mut self) -> Vec<RewardEvent> {
        std::mem::take(&mut self.pending_events)
    }
}
