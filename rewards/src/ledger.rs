//! Reward Cycle Ledger — persistent reward registers, eligibility entries
//! and claim records, all behind the shared [`KvStore`].
//!
//! The ledger keeps no state of its own besides the store handle. Every read
//! goes through the caller's [`WriteBatch`] so a half-built operation sees
//! its own staged writes.

use std::sync::Arc;

use greenproof_store::{keys, KvStore, WriteBatch};
use greenproof_types::{BlockHeight, EngineError, Identity, RewardParams};
use greenproof_verification::{EligibilityRecord, EligibilitySink};
use tracing::{debug, info};

use crate::claim::{ClaimRecord, EligibilityEntry};
use crate::cycle::RewardCycleState;

pub struct RewardLedger<S: KvStore> {
    store: Arc<S>,
}

impl<S: KvStore> RewardLedger<S> {
    /// Open the ledger, seeding the registers from `params` if the store
    /// holds none yet. Saved registers win over `authority` and `params`.
    pub fn open(
        store: Arc<S>,
        authority: Identity,
        params: &RewardParams,
        now: BlockHeight,
    ) -> Result<Self, EngineError> {
        let ledger = Self { store };
        let key = keys::meta(keys::META_REWARD_CYCLE);
        match greenproof_store::read::<RewardCycleState, _>(ledger.store.as_ref(), &key)? {
            Some(saved) => {
                info!(
                    cycle = saved.current_cycle,
                    treasury = saved.treasury_balance,
                    "loaded reward registers from store"
                );
            }
            None => {
                if !authority.is_valid() {
                    return Err(EngineError::InvalidInput(format!(
                        "invalid authority identity {:?}",
                        authority.as_str()
                    )));
                }
                params.validate()?;
                let state = RewardCycleState::new(authority, params, now);
                let mut batch = WriteBatch::new();
                ledger.put_state(&mut batch, &state)?;
                ledger.store.commit(batch)?;
            }
        }
        Ok(ledger)
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn state(&self, batch: &WriteBatch) -> Result<RewardCycleState, EngineError> {
        batch
            .read_through(self.store.as_ref(), &keys::meta(keys::META_REWARD_CYCLE))?
            .ok_or_else(|| EngineError::Storage("reward registers missing".into()))
    }

    pub fn put_state(&self, batch: &mut WriteBatch, state: &RewardCycleState) -> Result<(), EngineError> {
        batch.put_record(&keys::meta(keys::META_REWARD_CYCLE), state)?;
        Ok(())
    }

    pub fn eligibility(&self, batch: &WriteBatch, id: u64) -> Result<Option<EligibilityEntry>, EngineError> {
        Ok(batch.read_through(self.store.as_ref(), &keys::eligibility(id))?)
    }

    pub fn claim_record(
        &self,
        batch: &WriteBatch,
        id: u64,
        claimant: &Identity,
    ) -> Result<Option<ClaimRecord>, EngineError> {
        Ok(batch.read_through(self.store.as_ref(), &keys::claim(id, claimant))?)
    }

    pub fn put_claim_record(
        &self,
        batch: &mut WriteBatch,
        id: u64,
        claimant: &Identity,
        record: &ClaimRecord,
    ) -> Result<(), EngineError> {
        batch.put_record(&keys::claim(id, claimant), record)?;
        Ok(())
    }
}

impl<S: KvStore> EligibilitySink for RewardLedger<S> {
    /// Stage the eligibility entry and its unclaimed claim record.
    ///
    /// Fails `InvalidCategory` if the category has no multiplier, which
    /// aborts the finalizing attestation with it.
    fn register_eligibility(
        &self,
        batch: &mut WriteBatch,
        record: EligibilityRecord,
    ) -> Result<(), EngineError> {
        let state = self.state(batch)?;
        if state.multiplier(record.category).is_none() {
            return Err(EngineError::InvalidCategory(record.category));
        }
        if self.eligibility(batch, record.id)?.is_some() {
            return Err(EngineError::AlreadyExists(format!("eligibility {}", record.id)));
        }

        let entry = EligibilityEntry {
            id: record.id,
            submitter: record.submitter,
            category: record.category,
            approved: record.approved,
            approved_at: record.approved_at,
        };
        batch.put_record(&keys::eligibility(entry.id), &entry)?;
        self.put_claim_record(batch, entry.id, &entry.submitter, &ClaimRecord::default())?;

        debug!(id = entry.id, submitter = %entry.submitter, category = %entry.category, "eligibility staged");
        Ok(())
    }
}
