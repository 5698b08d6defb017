//! The engine facade: both services over one store, behind one writer lock.
//!
//! Mutations take the write lock and run to completion before the next one
//! starts, so two attestations can never both see "quorum not yet reached".
//! Queries take the read lock and see a consistent snapshot.
//!
//! "Now" comes from the host's [`HeightSource`]. The engine never hands a
//! service a height lower than one it already used.

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use greenproof_rewards::{
    ClaimReceipt, EligibilityEntry, RewardCycleState, RewardEvent, RewardLedger, RewardService,
};
use greenproof_store::KvStore;
use greenproof_types::{
    BlockHeight, Category, EngineConfig, EngineError, EvidenceHash, HeightSource, Identity,
    PayoutMode, TokenLedger, VerificationParams,
};
use greenproof_verification::{
    AttestOutcome, Attestation, Proof, StatusChange, VerificationEvent, VerificationService,
    Verifier,
};
use tracing::{info, warn};

/// Any event either service emitted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineEvent {
    Verification(VerificationEvent),
    Reward(RewardEvent),
}

struct Inner<S: KvStore> {
    verification: VerificationService<S>,
    rewards: RewardService<S>,
    /// Highest height handed to a service so far.
    last_height: BlockHeight,
}

impl<S: KvStore> Inner<S> {
    fn clamp(&mut self, observed: BlockHeight) -> BlockHeight {
        if observed < self.last_height {
            warn!(observed = %observed, last = %self.last_height, "height source went backwards");
        } else {
            self.last_height = observed;
        }
        self.last_height
    }
}

pub struct Engine<S: KvStore> {
    inner: RwLock<Inner<S>>,
    clock: Arc<dyn HeightSource>,
}

impl<S: KvStore + 'static> Engine<S> {
    /// Open both services over `store`. Registers already in the store win
    /// over `config`.
    pub fn open(
        store: Arc<S>,
        token: Arc<dyn TokenLedger>,
        clock: Arc<dyn HeightSource>,
        config: &EngineConfig,
    ) -> Result<Self, EngineError> {
        let now = clock.current_height();
        let ledger = Arc::new(RewardLedger::open(
            store.clone(),
            config.authority.clone(),
            &config.reward,
            now,
        )?);
        let verification = VerificationService::open(
            store,
            token.clone(),
            ledger.clone(),
            config.authority.clone(),
            config.verification.clone(),
        )?;
        let rewards = RewardService::new(ledger, token);

        info!(
            authority = %verification.authority(),
            height = %now,
            quorum = verification.params().quorum_threshold,
            "engine opened"
        );
        Ok(Self {
            inner: RwLock::new(Inner {
                verification,
                rewards,
                last_height: now,
            }),
            clock,
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner<S>>, EngineError> {
        self.inner
            .write()
            .map_err(|_| EngineError::Storage("engine lock poisoned".into()))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner<S>>, EngineError> {
        self.inner
            .read()
            .map_err(|_| EngineError::Storage("engine lock poisoned".into()))
    }

    /// Run a mutation under the write lock with the clamped current height.
    fn mutate<T>(
        &self,
        op: impl FnOnce(&mut Inner<S>, BlockHeight) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let mut inner = self.write()?;
        let now = inner.clamp(self.clock.current_height());
        op(&mut *inner, now)
    }

    /// Height the next mutation would run at.
    pub fn current_height(&self) -> Result<BlockHeight, EngineError> {
        let inner = self.read()?;
        Ok(inner.last_height.max(self.clock.current_height()))
    }

    // ── Verification ────────────────────────────────────────────────────

    pub fn register(&self, identity: &Identity) -> Result<Verifier, EngineError> {
        self.mutate(|i, now| i.verification.register(identity, now))
    }

    pub fn stake(&self, identity: &Identity, amount: u128) -> Result<Verifier, EngineError> {
        self.mutate(|i, now| i.verification.stake(identity, amount, now))
    }

    pub fn unstake(&self, identity: &Identity, amount: u128) -> Result<Verifier, EngineError> {
        self.mutate(|i, now| i.verification.unstake(identity, amount, now))
    }

    pub fn submit(
        &self,
        submitter: &Identity,
        category: Category,
        location: &str,
        evidence: EvidenceHash,
    ) -> Result<u64, EngineError> {
        self.mutate(|i, now| {
            i.verification
                .submit(submitter, category, location, evidence, now)
        })
    }

    pub fn attest(
        &self,
        proof_id: u64,
        verifier: &Identity,
        approved: bool,
        confidence: u8,
    ) -> Result<AttestOutcome, EngineError> {
        self.mutate(|i, now| {
            i.verification
                .attest(proof_id, verifier, approved, confidence, now)
        })
    }

    pub fn reject(&self, proof_id: u64, caller: &Identity, reason: &str) -> Result<(), EngineError> {
        self.mutate(|i, now| i.verification.reject(proof_id, caller, reason, now))
    }

    pub fn close(&self, proof_id: u64, caller: &Identity) -> Result<(), EngineError> {
        self.mutate(|i, now| i.verification.close(proof_id, caller, now))
    }

    // ── Rewards ─────────────────────────────────────────────────────────

    pub fn claim(&self, id: u64, caller: &Identity) -> Result<ClaimReceipt, EngineError> {
        self.mutate(|i, now| i.rewards.claim(id, caller, now))
    }

    pub fn deposit_treasury(&self, from: &Identity, amount: u128) -> Result<u128, EngineError> {
        self.mutate(|i, _| i.rewards.deposit_treasury(from, amount))
    }

    pub fn advance_cycle(&self) -> Result<bool, EngineError> {
        self.mutate(|i, now| i.rewards.advance_cycle(now))
    }

    // ── Administration ──────────────────────────────────────────────────

    pub fn set_quorum_threshold(&self, caller: &Identity, value: u32) -> Result<(), EngineError> {
        self.mutate(|i, _| i.verification.set_quorum_threshold(caller, value))
    }

    pub fn set_expiry_window(&self, caller: &Identity, value: u64) -> Result<(), EngineError> {
        self.mutate(|i, _| i.verification.set_expiry_window(caller, value))
    }

    pub fn set_max_submissions_per_user(&self, caller: &Identity, value: u32) -> Result<(), EngineError> {
        self.mutate(|i, _| i.verification.set_max_submissions_per_user(caller, value))
    }

    pub fn set_min_stake(&self, caller: &Identity, value: u128) -> Result<(), EngineError> {
        self.mutate(|i, _| i.verification.set_min_stake(caller, value))
    }

    pub fn set_blocked(&self, caller: &Identity, identity: &Identity, blocked: bool) -> Result<(), EngineError> {
        self.mutate(|i, _| i.verification.set_blocked(caller, identity, blocked))
    }

    /// Hand the authority role to `new_authority` on both services.
    ///
    /// The caller must hold the role on both sides before either is touched.
    /// If the reward side still fails to commit, the verification side is
    /// handed back to `caller`.
    pub fn set_authority(&self, caller: &Identity, new_authority: &Identity) -> Result<(), EngineError> {
        self.mutate(|i, _| {
            if i.verification.authority() != caller
                || i.rewards.get_cycle_state()?.authority != *caller
            {
                return Err(EngineError::Unauthorized(caller.clone()));
            }
            if !new_authority.is_valid() {
                return Err(EngineError::InvalidInput(format!(
                    "invalid authority identity {:?}",
                    new_authority.as_str()
                )));
            }
            i.verification.set_authority(caller, new_authority)?;
            if let Err(e) = i.rewards.set_authority(caller, new_authority) {
                warn!(error = %e, "reward authority transfer failed, restoring verification authority");
                i.verification.set_authority(new_authority, caller)?;
                return Err(e);
            }
            Ok(())
        })
    }

    pub fn set_base_reward(&self, caller: &Identity, value: u128) -> Result<(), EngineError> {
        self.mutate(|i, _| i.rewards.set_base_reward(caller, value))
    }

    pub fn set_multiplier(&self, caller: &Identity, category: Category, value: u32) -> Result<(), EngineError> {
        self.mutate(|i, _| i.rewards.set_multiplier(caller, category, value))
    }

    pub fn remove_multiplier(&self, caller: &Identity, category: Category) -> Result<(), EngineError> {
        self.mutate(|i, _| i.rewards.remove_multiplier(caller, category))
    }

    pub fn set_cycle_duration(&self, caller: &Identity, blocks: u64) -> Result<(), EngineError> {
        self.mutate(|i, _| i.rewards.set_cycle_duration(caller, blocks))
    }

    pub fn set_per_cycle_cap(&self, caller: &Identity, value: u128) -> Result<(), EngineError> {
        self.mutate(|i, _| i.rewards.set_per_cycle_cap(caller, value))
    }

    pub fn set_cooldown_blocks(&self, caller: &Identity, blocks: u64) -> Result<(), EngineError> {
        self.mutate(|i, _| i.rewards.set_cooldown_blocks(caller, blocks))
    }

    pub fn set_payout_mode(&self, caller: &Identity, mode: PayoutMode) -> Result<(), EngineError> {
        self.mutate(|i, _| i.rewards.set_payout_mode(caller, mode))
    }

    /// Take every event buffered since the last drain, verification first.
    pub fn drain_events(&self) -> Result<Vec<EngineEvent>, EngineError> {
        let mut inner = self.write()?;
        let mut events: Vec<EngineEvent> = inner
            .verification
            .drain_events()
            .into_iter()
            .map(EngineEvent::Verification)
            .collect();
        events.extend(inner.rewards.drain_events().into_iter().map(EngineEvent::Reward));
        Ok(events)
    }

    // ── Queries ─────────────────────────────────────────────────────────

    pub fn get_proof(&self, id: u64) -> Result<Option<Proof>, EngineError> {
        self.read()?.verification.get_proof(id)
    }

    pub fn get_attestation(&self, proof_id: u64, verifier: &Identity) -> Result<Option<Attestation>, EngineError> {
        self.read()?.verification.get_attestation(proof_id, verifier)
    }

    pub fn get_attesters(&self, proof_id: u64) -> Result<BTreeSet<Identity>, EngineError> {
        self.read()?.verification.get_attesters(proof_id)
    }

    pub fn get_verifier(&self, identity: &Identity) -> Result<Option<Verifier>, EngineError> {
        self.read()?.verification.get_verifier(identity)
    }

    pub fn reputation(&self, identity: &Identity) -> Result<u8, EngineError> {
        self.read()?.verification.reputation(identity)
    }

    pub fn get_user_submission_count(&self, identity: &Identity) -> Result<u32, EngineError> {
        self.read()?.verification.get_user_submission_count(identity)
    }

    pub fn is_blocked(&self, identity: &Identity) -> Result<bool, EngineError> {
        self.read()?.verification.is_blocked(identity)
    }

    /// Expiry as of the current height.
    pub fn is_expired(&self, id: u64) -> Result<bool, EngineError> {
        let now = self.current_height()?;
        self.read()?.verification.is_expired(id, now)
    }

    pub fn has_quorum(&self, id: u64) -> Result<bool, EngineError> {
        self.read()?.verification.has_quorum(id)
    }

    pub fn score(&self, id: u64) -> Result<u8, EngineError> {
        self.read()?.verification.score(id)
    }

    pub fn get_status_history(&self, id: u64) -> Result<Vec<StatusChange>, EngineError> {
        self.read()?.verification.get_status_history(id)
    }

    pub fn next_proof_id(&self) -> Result<u64, EngineError> {
        self.read()?.verification.next_proof_id()
    }

    pub fn verification_params(&self) -> Result<VerificationParams, EngineError> {
        Ok(self.read()?.verification.params().clone())
    }

    pub fn authority(&self) -> Result<Identity, EngineError> {
        Ok(self.read()?.verification.authority().clone())
    }

    pub fn get_treasury_balance(&self) -> Result<u128, EngineError> {
        self.read()?.rewards.get_treasury_balance()
    }

    pub fn get_current_cycle(&self) -> Result<u64, EngineError> {
        self.read()?.rewards.get_current_cycle()
    }

    pub fn get_claim_status(&self, id: u64, claimant: &Identity) -> Result<bool, EngineError> {
        self.read()?.rewards.get_claim_status(id, claimant)
    }

    pub fn get_multiplier(&self, category: Category) -> Result<Option<u32>, EngineError> {
        self.read()?.rewards.get_multiplier(category)
    }

    pub fn get_eligibility(&self, id: u64) -> Result<Option<EligibilityEntry>, EngineError> {
        self.read()?.rewards.get_eligibility(id)
    }

    pub fn get_cycle_state(&self) -> Result<RewardCycleState, EngineError> {
        self.read()?.rewards.get_cycle_state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use greenproof_nullables::{NullClock, NullKvStore, NullTokenLedger};
    use greenproof_types::RewardParams;

    fn engine(clock: Arc<NullClock>) -> Engine<NullKvStore> {
        Engine::open(
            Arc::new(NullKvStore::new()),
            Arc::new(NullTokenLedger::new()),
            clock,
            &EngineConfig::new(Identity::new("authority")),
        )
        .unwrap()
    }

    #[test]
    fn height_never_moves_backwards() {
        let clock = Arc::new(NullClock::new(500));
        let engine = engine(clock.clone());
        let farmer = Identity::new("farmer");
        engine
            .submit(&farmer, Category::Organic, "Cusco", EvidenceHash::new([1; 32]))
            .unwrap();

        clock.set(100);
        assert_eq!(engine.current_height().unwrap(), BlockHeight::new(500));
        let id = engine
            .submit(&farmer, Category::Organic, "Cusco", EvidenceHash::new([2; 32]))
            .unwrap();
        let proof = engine.get_proof(id).unwrap().unwrap();
        assert_eq!(proof.created_at, BlockHeight::new(500));
    }

    #[test]
    fn authority_transfer_covers_both_services() {
        let engine = engine(Arc::new(NullClock::new(0)));
        let old = Identity::new("authority");
        let new = Identity::new("council");
        engine.set_authority(&old, &new).unwrap();

        assert_eq!(engine.authority().unwrap(), new);
        assert_eq!(engine.get_cycle_state().unwrap().authority, new);
        assert_eq!(
            engine.set_base_reward(&old, 5),
            Err(EngineError::Unauthorized(old.clone()))
        );
        assert!(engine.set_quorum_threshold(&new, 4).is_ok());
    }

    #[test]
    fn authority_transfer_needs_the_role_on_both_sides() {
        let store = Arc::new(NullKvStore::new());
        RewardLedger::open(
            store.clone(),
            Identity::new("treasurer"),
            &RewardParams::default(),
            BlockHeight::new(0),
        )
        .unwrap();
        let engine = Engine::open(
            store.clone(),
            Arc::new(NullTokenLedger::new()),
            Arc::new(NullClock::new(0)),
            &EngineConfig::new(Identity::new("authority")),
        )
        .unwrap();
        let before = store.snapshot();

        let admin = Identity::new("authority");
        assert_eq!(
            engine.set_authority(&admin, &Identity::new("council")),
            Err(EngineError::Unauthorized(admin.clone()))
        );
        assert_eq!(engine.authority().unwrap(), admin);
        assert_eq!(
            engine.get_cycle_state().unwrap().authority,
            Identity::new("treasurer")
        );
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn failed_reward_commit_hands_verification_authority_back() {
        let store = Arc::new(NullKvStore::new());
        let engine = Engine::open(
            store.clone(),
            Arc::new(NullTokenLedger::new()),
            Arc::new(NullClock::new(0)),
            &EngineConfig::new(Identity::new("authority")),
        )
        .unwrap();
        let admin = Identity::new("authority");
        let council = Identity::new("council");

        // Let the verification commit through and fail the reward one.
        store.fail_commit_after(1);
        assert!(engine.set_authority(&admin, &council).is_err());
        assert_eq!(engine.authority().unwrap(), admin);
        assert_eq!(engine.get_cycle_state().unwrap().authority, admin);
    }

    #[test]
    fn events_drain_in_service_order() {
        let engine = engine(Arc::new(NullClock::new(0)));
        engine
            .set_cooldown_blocks(&Identity::new("authority"), 10)
            .unwrap();
        engine.register(&Identity::new("v1")).unwrap();

        let events = engine.drain_events().unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], EngineEvent::Verification(_)));
        assert!(matches!(events[1], EngineEvent::Reward(_)));
        assert!(engine.drain_events().unwrap().is_empty());
    }
}
