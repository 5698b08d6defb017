//! Verification Service — orchestrates registration, staking, submission,
//! attestation, rejection and withdrawal over the four stores.
//!
//! Every mutating call follows the same shape: validate everything against
//! the committed state, stage all writes in one [`WriteBatch`], call the
//! Token Ledger if funds move, then commit. Any failure before the commit
//! drops the batch, so a failed call leaves no trace.

use std::collections::BTreeSet;
use std::sync::Arc;

use greenproof_store::{keys, KvStore, WriteBatch};
use greenproof_types::params::{check_expiry_window, check_positive, check_quorum_threshold};
use greenproof_types::{
    BlockHeight, Category, EngineError, EvidenceHash, Identity, TokenLedger, VerificationParams,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::attestation::{Attestation, AttestationStore, MAX_CONFIDENCE};
use crate::events::VerificationEvent;
use crate::handoff::{EligibilityRecord, EligibilitySink};
use crate::history::{StatusChange, StatusHistory};
use crate::proof::{validate_submission, Proof, ProofStatus, ProofStore};
use crate::quorum::QuorumEngine;
use crate::stake::{StakeLedger, Verifier, INITIAL_REPUTATION};

/// Longest rejection reason accepted.
pub const MAX_REASON_LEN: usize = 256;

/// Result of a successful attestation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttestOutcome {
    /// The attestation was stored; the proof is still Pending.
    Recorded,
    /// The attestation completed the quorum and the proof is now Approved.
    Finalized { score: u8 },
}

/// Persisted snapshot of the verification registers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct Registers {
    authority: Identity,
    params: VerificationParams,
}

pub struct VerificationService<S: KvStore> {
    store: Arc<S>,
    token: Arc<dyn TokenLedger>,
    sink: Arc<dyn EligibilitySink>,
    registers: Registers,
    stakes: StakeLedger,
    proofs: ProofStore,
    attestations: AttestationStore,
    quorum: QuorumEngine,
    history: StatusHistory,
    /// Events for the host to drain.
    pending_events: Vec<VerificationEvent>,
}

impl<S: KvStore> VerificationService<S> {
    /// Open the service over `store`.
    ///
    /// If the store already holds a register snapshot (from an earlier run or
    /// later admin changes) that snapshot wins over `authority` and `params`.
    pub fn open(
        store: Arc<S>,
        token: Arc<dyn TokenLedger>,
        sink: Arc<dyn EligibilitySink>,
        authority: Identity,
        params: VerificationParams,
    ) -> Result<Self, EngineError> {
        let key = keys::meta(keys::META_VERIFICATION_PARAMS);
        let registers = match greenproof_store::read::<Registers, _>(store.as_ref(), &key)? {
            Some(saved) => {
                info!(authority = %saved.authority, "loaded verification registers from store");
                saved
            }
            None => {
                if !authority.is_valid() {
                    return Err(EngineError::InvalidInput(format!(
                        "invalid authority identity {:?}",
                        authority.as_str()
                    )));
                }
                params.validate()?;
                let registers = Registers { authority, params };
                let mut batch = WriteBatch::new();
                batch.put_record(&key, &registers)?;
                store.commit(batch)?;
                registers
            }
        };

        Ok(Self {
            store,
            token,
            sink,
            registers,
            stakes: StakeLedger,
            proofs: ProofStore,
            attestations: AttestationStore,
            quorum: QuorumEngine,
            history: StatusHistory,
            pending_events: Vec::new(),
        })
    }

    // ── Identity & stake ────────────────────────────────────────────────

    pub fn register(&mut self, identity: &Identity, now: BlockHeight) -> Result<Verifier, EngineError> {
        let mut batch = WriteBatch::new();
        let verifier = self.stakes.register(&*self.store, &mut batch, identity, now)?;
        self.store.commit(batch)?;

        debug!(verifier = %identity, "verifier registered");
        self.pending_events.push(VerificationEvent::VerifierRegistered {
            verifier: identity.clone(),
        });
        Ok(verifier)
    }

    /// Lock `amount` of the verifier's tokens as stake.
    pub fn stake(
        &mut self,
        identity: &Identity,
        amount: u128,
        now: BlockHeight,
    ) -> Result<Verifier, EngineError> {
        let mut batch = WriteBatch::new();
        let verifier = self.stakes.stake(&*self.store, &mut batch, identity, amount, now)?;
        self.token.transfer_in(amount, identity).map_err(|e| {
            warn!(verifier = %identity, amount, error = %e, "stake transfer refused");
            EngineError::from(e)
        })?;
        self.store.commit(batch)?;

        debug!(verifier = %identity, amount, total = verifier.stake, "stake added");
        self.pending_events.push(VerificationEvent::Staked {
            verifier: identity.clone(),
            amount,
            total: verifier.stake,
        });
        Ok(verifier)
    }

    /// Return `amount` of stake. Locked while any attestation is open.
    pub fn unstake(
        &mut self,
        identity: &Identity,
        amount: u128,
        now: BlockHeight,
    ) -> Result<Verifier, EngineError> {
        let mut batch = WriteBatch::new();
        let verifier = self.stakes.unstake(&*self.store, &mut batch, identity, amount, now)?;
        self.token.transfer_out(amount, identity).map_err(|e| {
            warn!(verifier = %identity, amount, error = %e, "unstake transfer refused");
            EngineError::from(e)
        })?;
        self.store.commit(batch)?;

        debug!(verifier = %identity, amount, total = verifier.stake, "stake returned");
        self.pending_events.push(VerificationEvent::Unstaked {
            verifier: identity.clone(),
            amount,
            total: verifier.stake,
        });
        Ok(verifier)
    }

    // ── Proof lifecycle ─────────────────────────────────────────────────

    /// Create a Pending proof and return its id.
    pub fn submit(
        &mut self,
        submitter: &Identity,
        category: Category,
        location: &str,
        evidence: EvidenceHash,
        now: BlockHeight,
    ) -> Result<u64, EngineError> {
        let store = &*self.store;
        let mut batch = WriteBatch::new();
        let params = &self.registers.params;

        if !submitter.is_valid() {
            return Err(EngineError::InvalidInput(format!(
                "invalid submitter {:?}",
                submitter.as_str()
            )));
        }
        if self.blocked(submitter)? {
            return Err(EngineError::Blocked(submitter.clone()));
        }
        let count = self.proofs.submission_count(store, &batch, submitter)?;
        if count >= params.max_submissions_per_user {
            return Err(EngineError::LimitReached(format!(
                "{submitter} has {count} of {} submissions",
                params.max_submissions_per_user
            )));
        }
        validate_submission(location, &evidence)?;

        let proof = self.proofs.create(
            store,
            &mut batch,
            submitter,
            category,
            location.to_string(),
            evidence,
            params.expiry_window,
            now,
        )?;
        self.history.append(
            store,
            &mut batch,
            proof.id,
            &StatusChange {
                updater: submitter.clone(),
                old_status: None,
                new_status: ProofStatus::Pending,
                reason: "submitted".into(),
                height: now,
            },
        )?;
        store.commit(batch)?;

        debug!(id = proof.id, submitter = %submitter, %category, expiry = %proof.expiry, "proof submitted");
        self.pending_events.push(VerificationEvent::ProofSubmitted {
            id: proof.id,
            submitter: submitter.clone(),
            category,
        });
        Ok(proof.id)
    }

    /// Record an attestation; finalizes the proof in the same commit if this
    /// approval completes the quorum.
    pub fn attest(
        &mut self,
        proof_id: u64,
        verifier: &Identity,
        approved: bool,
        confidence: u8,
        now: BlockHeight,
    ) -> Result<AttestOutcome, EngineError> {
        let store = &*self.store;
        let mut batch = WriteBatch::new();
        let params = &self.registers.params;

        let mut record = match self.stakes.get(store, &batch, verifier)? {
            Some(v) if v.can_attest(params.min_stake) => v,
            other => {
                return Err(EngineError::InsufficientStake {
                    needed: params.min_stake,
                    have: other.filter(|v| v.registered).map_or(0, |v| v.stake),
                })
            }
        };
        let mut proof = self.proofs.require(store, &batch, proof_id)?;
        if proof.closed {
            return Err(EngineError::Closed(proof_id));
        }
        if proof.is_expired(now) {
            return Err(EngineError::Expired {
                id: proof_id,
                expiry: proof.expiry.get(),
            });
        }
        if confidence > MAX_CONFIDENCE {
            return Err(EngineError::InvalidInput(format!(
                "confidence {confidence} outside [0, {MAX_CONFIDENCE}]"
            )));
        }
        if *verifier == proof.submitter {
            return Err(EngineError::Unauthorized(verifier.clone()));
        }

        self.attestations.record(
            store,
            &mut batch,
            &Attestation {
                proof_id,
                verifier: verifier.clone(),
                approved,
                confidence,
                timestamp: now,
            },
        )?;
        record.active_commitments += 1;
        record.last_activity = now;
        self.stakes.put(&mut batch, &record)?;

        let mut outcome = AttestOutcome::Recorded;
        if approved {
            let tally = self.quorum.evaluate(store, &batch, proof_id)?;
            if self.quorum.has_quorum(&tally, params.quorum_threshold) {
                let score = self.quorum.score(&tally);
                self.finalize(&mut batch, &mut proof, score, verifier, now)?;
                outcome = AttestOutcome::Finalized { score };
            }
        }
        store.commit(batch)?;

        debug!(proof_id, verifier = %verifier, approved, confidence, "attestation recorded");
        self.pending_events.push(VerificationEvent::AttestationRecorded {
            proof_id,
            verifier: verifier.clone(),
            approved,
            confidence,
        });
        if let AttestOutcome::Finalized { score } = outcome {
            info!(proof_id, score, submitter = %proof.submitter, "proof approved on quorum");
            self.pending_events.push(VerificationEvent::ProofFinalized {
                id: proof_id,
                submitter: proof.submitter.clone(),
                category: proof.category,
                score,
            });
        }
        Ok(outcome)
    }

    /// Stage the Approved transition, reputation gain, eligibility hand-off
    /// and commitment settlement.
    fn finalize(
        &self,
        batch: &mut WriteBatch,
        proof: &mut Proof,
        score: u8,
        trigger: &Identity,
        now: BlockHeight,
    ) -> Result<(), EngineError> {
        let store = &*self.store;
        proof.score = score;
        proof.close_as(ProofStatus::Approved);
        self.proofs.put(batch, proof)?;
        self.stakes
            .adjust_reputation(store, batch, &proof.submitter, true, now)?;
        self.sink.register_eligibility(
            batch,
            EligibilityRecord {
                id: proof.id,
                submitter: proof.submitter.clone(),
                category: proof.category,
                approved: true,
                approved_at: now,
            },
        )?;
        self.settle_attesters(batch, proof.id)?;
        self.history.append(
            store,
            batch,
            proof.id,
            &StatusChange {
                updater: trigger.clone(),
                old_status: Some(ProofStatus::Pending),
                new_status: ProofStatus::Approved,
                reason: "quorum reached".into(),
                height: now,
            },
        )
    }

    /// Reject a Pending proof. Not gated by expiry, so stale proofs can
    /// still be rejected.
    pub fn reject(
        &mut self,
        proof_id: u64,
        caller: &Identity,
        reason: &str,
        now: BlockHeight,
    ) -> Result<(), EngineError> {
        let store = &*self.store;
        let mut batch = WriteBatch::new();

        self.require_rejector(caller)?;
        if reason.len() > MAX_REASON_LEN {
            return Err(EngineError::InvalidInput(format!(
                "reason longer than {MAX_REASON_LEN} bytes"
            )));
        }
        let mut proof = self.proofs.require(store, &batch, proof_id)?;
        if proof.status != ProofStatus::Pending {
            return Err(EngineError::InvalidStatus {
                id: proof_id,
                status: proof.status.to_string(),
            });
        }

        proof.close_as(ProofStatus::Rejected);
        self.proofs.put(&mut batch, &proof)?;
        self.stakes
            .adjust_reputation(store, &mut batch, &proof.submitter, false, now)?;
        self.settle_attesters(&mut batch, proof_id)?;
        self.history.append(
            store,
            &mut batch,
            proof_id,
            &StatusChange {
                updater: caller.clone(),
                old_status: Some(ProofStatus::Pending),
                new_status: ProofStatus::Rejected,
                reason: reason.to_string(),
                height: now,
            },
        )?;
        store.commit(batch)?;

        info!(proof_id, by = %caller, reason, "proof rejected");
        self.pending_events.push(VerificationEvent::ProofRejected {
            id: proof_id,
            by: caller.clone(),
            reason: reason.to_string(),
        });
        Ok(())
    }

    /// Withdraw a proof. The only exit for a Pending proof nobody attests,
    /// including one past its expiry.
    pub fn close(&mut self, proof_id: u64, caller: &Identity, now: BlockHeight) -> Result<(), EngineError> {
        let store = &*self.store;
        let mut batch = WriteBatch::new();

        let mut proof = self.proofs.require(store, &batch, proof_id)?;
        if *caller != proof.submitter && *caller != self.registers.authority {
            return Err(EngineError::Unauthorized(caller.clone()));
        }
        if proof.closed {
            return Err(EngineError::Closed(proof_id));
        }

        proof.close_as(ProofStatus::Withdrawn);
        self.proofs.put(&mut batch, &proof)?;
        self.settle_attesters(&mut batch, proof_id)?;
        self.history.append(
            store,
            &mut batch,
            proof_id,
            &StatusChange {
                updater: caller.clone(),
                old_status: Some(ProofStatus::Pending),
                new_status: ProofStatus::Withdrawn,
                reason: "withdrawn".into(),
                height: now,
            },
        )?;
        store.commit(batch)?;

        info!(proof_id, by = %caller, "proof withdrawn");
        self.pending_events.push(VerificationEvent::ProofWithdrawn {
            id: proof_id,
            by: caller.clone(),
        });
        Ok(())
    }

    /// Release the commitment of every verifier that attested `proof_id`.
    fn settle_attesters(&self, batch: &mut WriteBatch, proof_id: u64) -> Result<(), EngineError> {
        let store = &*self.store;
        for verifier in self.attestations.attesters(store, batch, proof_id)? {
            self.stakes.settle_commitment(store, batch, &verifier)?;
        }
        Ok(())
    }

    /// The authority, or a registered verifier holding the minimum stake.
    fn require_rejector(&self, caller: &Identity) -> Result<(), EngineError> {
        if *caller == self.registers.authority {
            return Ok(());
        }
        let min_stake = self.registers.params.min_stake;
        match self.stakes.get(&*self.store, &WriteBatch::new(), caller)? {
            Some(v) if v.can_attest(min_stake) => Ok(()),
            Some(v) if v.registered => Err(EngineError::InsufficientStake {
                needed: min_stake,
                have: v.stake,
            }),
            _ => Err(EngineError::Unauthorized(caller.clone())),
        }
    }

    // ── Administration ──────────────────────────────────────────────────

    fn require_authority(&self, caller: &Identity) -> Result<(), EngineError> {
        if *caller != self.registers.authority {
            return Err(EngineError::Unauthorized(caller.clone()));
        }
        Ok(())
    }

    /// Persist `registers` and adopt them.
    fn save_registers(
        &mut self,
        registers: Registers,
        name: &'static str,
        value: String,
    ) -> Result<(), EngineError> {
        let mut batch = WriteBatch::new();
        batch.put_record(&keys::meta(keys::META_VERIFICATION_PARAMS), &registers)?;
        self.store.commit(batch)?;
        self.registers = registers;

        info!(parameter = name, %value, "verification parameter changed");
        self.pending_events
            .push(VerificationEvent::ParameterChanged { name, value });
        Ok(())
    }

    pub fn set_quorum_threshold(&mut self, caller: &Identity, value: u32) -> Result<(), EngineError> {
        self.require_authority(caller)?;
        check_quorum_threshold(value)?;
        let mut registers = self.registers.clone();
        registers.params.quorum_threshold = value;
        self.save_registers(registers, "quorum_threshold", value.to_string())
    }

    pub fn set_expiry_window(&mut self, caller: &Identity, value: u64) -> Result<(), EngineError> {
        self.require_authority(caller)?;
        check_expiry_window(value)?;
        let mut registers = self.registers.clone();
        registers.params.expiry_window = value;
        self.save_registers(registers, "expiry_window", value.to_string())
    }

    pub fn set_max_submissions_per_user(
        &mut self,
        caller: &Identity,
        value: u32,
    ) -> Result<(), EngineError> {
        self.require_authority(caller)?;
        check_positive("max_submissions_per_user", u128::from(value))?;
        let mut registers = self.registers.clone();
        registers.params.max_submissions_per_user = value;
        self.save_registers(registers, "max_submissions_per_user", value.to_string())
    }

    pub fn set_min_stake(&mut self, caller: &Identity, value: u128) -> Result<(), EngineError> {
        self.require_authority(caller)?;
        check_positive("min_stake", value)?;
        let mut registers = self.registers.clone();
        registers.params.min_stake = value;
        self.save_registers(registers, "min_stake", value.to_string())
    }

    pub fn set_authority(&mut self, caller: &Identity, new_authority: &Identity) -> Result<(), EngineError> {
        self.require_authority(caller)?;
        if !new_authority.is_valid() {
            return Err(EngineError::InvalidInput(format!(
                "invalid authority identity {:?}",
                new_authority.as_str()
            )));
        }
        let mut registers = self.registers.clone();
        registers.authority = new_authority.clone();
        self.save_registers(registers, "authority", new_authority.to_string())
    }

    /// Block or unblock an identity from submitting proofs.
    pub fn set_blocked(
        &mut self,
        caller: &Identity,
        identity: &Identity,
        blocked: bool,
    ) -> Result<(), EngineError> {
        self.require_authority(caller)?;
        let mut batch = WriteBatch::new();
        if blocked {
            batch.put_record(&keys::blocked(identity), &true)?;
        } else {
            batch.delete(keys::blocked(identity));
        }
        self.store.commit(batch)?;
        info!(identity = %identity, blocked, "submitter block flag changed");
        Ok(())
    }

    // ── Queries ─────────────────────────────────────────────────────────

    pub fn get_proof(&self, id: u64) -> Result<Option<Proof>, EngineError> {
        self.proofs.get(&*self.store, &WriteBatch::new(), id)
    }

    pub fn get_attestation(
        &self,
        proof_id: u64,
        verifier: &Identity,
    ) -> Result<Option<Attestation>, EngineError> {
        self.attestations
            .get(&*self.store, &WriteBatch::new(), proof_id, verifier)
    }

    pub fn get_attesters(&self, proof_id: u64) -> Result<BTreeSet<Identity>, EngineError> {
        self.attestations
            .attesters(&*self.store, &WriteBatch::new(), proof_id)
    }

    pub fn get_verifier(&self, identity: &Identity) -> Result<Option<Verifier>, EngineError> {
        self.stakes.get(&*self.store, &WriteBatch::new(), identity)
    }

    /// Reputation of any identity; untouched identities sit at the initial 50.
    pub fn reputation(&self, identity: &Identity) -> Result<u8, EngineError> {
        Ok(self
            .get_verifier(identity)?
            .map_or(INITIAL_REPUTATION, |v| v.reputation))
    }

    pub fn get_user_submission_count(&self, identity: &Identity) -> Result<u32, EngineError> {
        self.proofs
            .submission_count(&*self.store, &WriteBatch::new(), identity)
    }

    pub fn is_blocked(&self, identity: &Identity) -> Result<bool, EngineError> {
        self.blocked(identity)
    }

    fn blocked(&self, identity: &Identity) -> Result<bool, EngineError> {
        Ok(self.store.get(&keys::blocked(identity))?.is_some())
    }

    pub fn is_expired(&self, id: u64, now: BlockHeight) -> Result<bool, EngineError> {
        let proof = self.proofs.require(&*self.store, &WriteBatch::new(), id)?;
        Ok(proof.is_expired(now))
    }

    pub fn has_quorum(&self, id: u64) -> Result<bool, EngineError> {
        let batch = WriteBatch::new();
        self.proofs.require(&*self.store, &batch, id)?;
        let tally = self.quorum.evaluate(&*self.store, &batch, id)?;
        Ok(self
            .quorum
            .has_quorum(&tally, self.registers.params.quorum_threshold))
    }

    /// Current score from the stored attestations.
    pub fn score(&self, id: u64) -> Result<u8, EngineError> {
        let batch = WriteBatch::new();
        self.proofs.require(&*self.store, &batch, id)?;
        let tally = self.quorum.evaluate(&*self.store, &batch, id)?;
        Ok(self.quorum.score(&tally))
    }

    pub fn get_status_history(&self, id: u64) -> Result<Vec<StatusChange>, EngineError> {
        self.history.entries(&*self.store, id)
    }

    pub fn next_proof_id(&self) -> Result<u64, EngineError> {
        self.proofs.next_id(&*self.store, &WriteBatch::new())
    }

    pub fn params(&self) -> &VerificationParams {
        &self.registers.params
    }

    pub fn authority(&self) -> &Identity {
        &self.registers.authority
    }

    /// Drain all pending events.
    pub fn drain_events(&mut self) -> Vec<VerificationEvent> {
        std::mem::take(&mut self.pending_events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use greenproof_nullables::{NullKvStore, NullTokenLedger};
    use std::sync::Mutex;

    /// Sink that remembers every record it is handed, optionally refusing.
    #[derive(Default)]
    struct RecordingSink {
        records: Mutex<Vec<EligibilityRecord>>,
        refuse: Mutex<Option<EngineError>>,
    }

    impl EligibilitySink for RecordingSink {
        fn register_eligibility(
            &self,
            _batch: &mut WriteBatch,
            record: EligibilityRecord,
        ) -> Result<(), EngineError> {
            if let Some(err) = self.refuse.lock().unwrap().clone() {
                return Err(err);
            }
            self.records.lock().unwrap().push(record);
            Ok(())
        }
    }

    struct Harness {
        store: Arc<NullKvStore>,
        token: Arc<NullTokenLedger>,
        sink: Arc<RecordingSink>,
        svc: VerificationService<NullKvStore>,
    }

    fn id(s: &str) -> Identity {
        Identity::new(s)
    }

    fn h(n: u64) -> BlockHeight {
        BlockHeight::new(n)
    }

    fn evidence() -> EvidenceHash {
        EvidenceHash::new([9; 32])
    }

    fn harness() -> Harness {
        let store = Arc::new(NullKvStore::new());
        let token = Arc::new(NullTokenLedger::new());
        let sink = Arc::new(RecordingSink::default());
        let svc = VerificationService::open(
            store.clone(),
            token.clone(),
            sink.clone(),
            id("authority"),
            VerificationParams::default(),
        )
        .unwrap();
        Harness { store, token, sink, svc }
    }

    /// Register, fund and stake `name` with the minimum stake.
    fn staked_verifier(hs: &mut Harness, name: &str) -> Identity {
        let v = id(name);
        hs.token.credit(&v, 10_000);
        hs.svc.register(&v, h(1)).unwrap();
        hs.svc.stake(&v, 1_000, h(1)).unwrap();
        v
    }

    fn submit_organic(hs: &mut Harness, now: u64) -> u64 {
        hs.svc
            .submit(&id("farmer"), Category::Organic, "Navarra", evidence(), h(now))
            .unwrap()
    }

    // ── Full lifecycle ──────────────────────────────────────────────────

    #[test]
    fn three_approvals_finalize_with_truncated_score() {
        let mut hs = harness();
        let verifiers: Vec<Identity> = ["v1", "v2", "v3"]
            .iter()
            .map(|n| staked_verifier(&mut hs, n))
            .collect();

        let pid = submit_organic(&mut hs, 100);
        assert_eq!(pid, 1);
        let proof = hs.svc.get_proof(pid).unwrap().unwrap();
        assert_eq!(proof.status, ProofStatus::Pending);
        assert_eq!(proof.expiry, h(100 + 52_560));

        assert_eq!(
            hs.svc.attest(pid, &verifiers[0], true, 90, h(110)).unwrap(),
            AttestOutcome::Recorded
        );
        assert_eq!(
            hs.svc.attest(pid, &verifiers[1], true, 80, h(111)).unwrap(),
            AttestOutcome::Recorded
        );
        assert_eq!(hs.svc.get_verifier(&verifiers[0]).unwrap().unwrap().active_commitments, 1);
        assert_eq!(
            hs.svc.attest(pid, &verifiers[2], true, 100, h(112)).unwrap(),
            AttestOutcome::Finalized { score: 90 }
        );

        let proof = hs.svc.get_proof(pid).unwrap().unwrap();
        assert_eq!(proof.status, ProofStatus::Approved);
        assert!(proof.closed);
        assert_eq!(proof.score, 90);
        assert_eq!(hs.svc.reputation(&id("farmer")).unwrap(), 60);
        for v in &verifiers {
            assert_eq!(hs.svc.get_verifier(v).unwrap().unwrap().active_commitments, 0);
        }

        let records = hs.sink.records.lock().unwrap().clone();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, pid);
        assert_eq!(records[0].category, Category::Organic);
        assert_eq!(records[0].approved_at, h(112));

        let events = hs.svc.drain_events();
        assert!(events.iter().any(|e| matches!(
            e,
            VerificationEvent::ProofFinalized { id: 1, score: 90, .. }
        )));
        let history = hs.svc.get_status_history(pid).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].new_status, ProofStatus::Approved);
    }

    #[test]
    fn attestation_after_quorum_fails_closed() {
        let mut hs = harness();
        let vs: Vec<Identity> = ["v1", "v2", "v3", "v4"]
            .iter()
            .map(|n| staked_verifier(&mut hs, n))
            .collect();
        let pid = submit_organic(&mut hs, 10);
        for v in &vs[..3] {
            hs.svc.attest(pid, v, true, 75, h(20)).unwrap();
        }
        assert_eq!(
            hs.svc.attest(pid, &vs[3], true, 75, h(21)),
            Err(EngineError::Closed(pid))
        );
    }

    #[test]
    fn rejecting_attestations_never_finalize() {
        let mut hs = harness();
        let vs: Vec<Identity> = ["v1", "v2", "v3", "v4"]
            .iter()
            .map(|n| staked_verifier(&mut hs, n))
            .collect();
        let pid = submit_organic(&mut hs, 10);
        for v in &vs[..3] {
            assert_eq!(
                hs.svc.attest(pid, v, false, 100, h(20)).unwrap(),
                AttestOutcome::Recorded
            );
        }
        assert!(!hs.svc.has_quorum(pid).unwrap());
        assert_eq!(hs.svc.score(pid).unwrap(), 0);
        assert_eq!(
            hs.svc.get_proof(pid).unwrap().unwrap().status,
            ProofStatus::Pending
        );
    }

    #[test]
    fn duplicate_attestation_leaves_state_unchanged() {
        let mut hs = harness();
        let v = staked_verifier(&mut hs, "v1");
        let pid = submit_organic(&mut hs, 10);
        hs.svc.attest(pid, &v, true, 70, h(11)).unwrap();

        let before = hs.store.snapshot();
        assert_eq!(
            hs.svc.attest(pid, &v, false, 10, h(12)),
            Err(EngineError::DuplicateAttestation {
                proof_id: pid,
                verifier: v.clone()
            })
        );
        assert_eq!(hs.store.snapshot(), before);
    }

    #[test]
    fn attest_requires_registration_and_stake() {
        let mut hs = harness();
        let pid = submit_organic(&mut hs, 10);

        assert_eq!(
            hs.svc.attest(pid, &id("stranger"), true, 50, h(11)),
            Err(EngineError::InsufficientStake { needed: 1_000, have: 0 })
        );

        let poor = id("poor");
        hs.token.credit(&poor, 500);
        hs.svc.register(&poor, h(1)).unwrap();
        hs.svc.stake(&poor, 400, h(1)).unwrap();
        assert_eq!(
            hs.svc.attest(pid, &poor, true, 50, h(11)),
            Err(EngineError::InsufficientStake { needed: 1_000, have: 400 })
        );
    }

    #[test]
    fn attest_input_checks() {
        let mut hs = harness();
        let v = staked_verifier(&mut hs, "v1");
        assert!(matches!(
            hs.svc.attest(42, &v, true, 50, h(1)),
            Err(EngineError::NotFound(_))
        ));
        let pid = submit_organic(&mut hs, 10);
        assert!(matches!(
            hs.svc.attest(pid, &v, true, 101, h(11)),
            Err(EngineError::InvalidInput(_))
        ));
        assert_eq!(
            hs.svc.attest(pid, &v, true, 100, h(10 + 52_561)),
            Err(EngineError::Expired { id: pid, expiry: 10 + 52_560 })
        );
        assert!(hs.svc.attest(pid, &v, true, 100, h(10 + 52_560)).is_ok());
    }

    #[test]
    fn submitter_cannot_attest_own_proof() {
        let mut hs = harness();
        let farmer = staked_verifier(&mut hs, "farmer");
        let pid = submit_organic(&mut hs, 10);
        assert_eq!(
            hs.svc.attest(pid, &farmer, true, 100, h(11)),
            Err(EngineError::Unauthorized(farmer))
        );
    }

    // ── Reject / close ──────────────────────────────────────────────────

    #[test]
    fn reject_lowers_reputation_and_records_reason() {
        let mut hs = harness();
        let v = staked_verifier(&mut hs, "v1");
        let pid = submit_organic(&mut hs, 10);
        hs.svc.attest(pid, &v, false, 90, h(11)).unwrap();

        hs.svc.reject(pid, &v, "evidence unreadable", h(12)).unwrap();
        let proof = hs.svc.get_proof(pid).unwrap().unwrap();
        assert_eq!(proof.status, ProofStatus::Rejected);
        assert!(proof.closed);
        assert_eq!(hs.svc.reputation(&id("farmer")).unwrap(), 45);
        assert_eq!(hs.svc.get_verifier(&v).unwrap().unwrap().active_commitments, 0);

        let history = hs.svc.get_status_history(pid).unwrap();
        let last = history.last().unwrap();
        assert_eq!(last.updater, v);
        assert_eq!(last.old_status, Some(ProofStatus::Pending));
        assert_eq!(last.new_status, ProofStatus::Rejected);
        assert_eq!(last.reason, "evidence unreadable");

        assert_eq!(
            hs.svc.reject(pid, &v, "again", h(13)),
            Err(EngineError::InvalidStatus {
                id: pid,
                status: "Rejected".into()
            })
        );
    }

    #[test]
    fn reject_is_not_gated_by_expiry() {
        let mut hs = harness();
        let pid = submit_organic(&mut hs, 10);
        hs.svc
            .reject(pid, &id("authority"), "stale", h(1_000_000))
            .unwrap();
        assert_eq!(
            hs.svc.get_proof(pid).unwrap().unwrap().status,
            ProofStatus::Rejected
        );
    }

    #[test]
    fn reject_requires_authority_or_staked_verifier() {
        let mut hs = harness();
        let pid = submit_organic(&mut hs, 10);
        assert_eq!(
            hs.svc.reject(pid, &id("nobody"), "spam", h(11)),
            Err(EngineError::Unauthorized(id("nobody")))
        );
        let v = id("unstaked");
        hs.svc.register(&v, h(1)).unwrap();
        assert!(matches!(
            hs.svc.reject(pid, &v, "spam", h(11)),
            Err(EngineError::InsufficientStake { .. })
        ));
    }

    #[test]
    fn close_withdraws_expired_pending_proof() {
        let mut hs = harness();
        let v = staked_verifier(&mut hs, "v1");
        let pid = submit_organic(&mut hs, 10);
        hs.svc.attest(pid, &v, true, 60, h(11)).unwrap();

        let late = h(10 + 52_560 + 1);
        assert!(hs.svc.is_expired(pid, late).unwrap());
        assert_eq!(
            hs.svc.get_proof(pid).unwrap().unwrap().status,
            ProofStatus::Pending
        );

        assert_eq!(
            hs.svc.close(pid, &id("mallory"), late),
            Err(EngineError::Unauthorized(id("mallory")))
        );
        hs.svc.close(pid, &id("farmer"), late).unwrap();
        let proof = hs.svc.get_proof(pid).unwrap().unwrap();
        assert_eq!(proof.status, ProofStatus::Withdrawn);
        assert!(proof.closed);
        assert_eq!(hs.svc.get_verifier(&v).unwrap().unwrap().active_commitments, 0);
        assert_eq!(hs.svc.reputation(&id("farmer")).unwrap(), 50);

        assert_eq!(
            hs.svc.close(pid, &id("authority"), late),
            Err(EngineError::Closed(pid))
        );
    }

    // ── Submission guards ───────────────────────────────────────────────

    #[test]
    fn submission_guards() {
        let mut hs = harness();
        let farmer = id("farmer");
        assert!(matches!(
            hs.svc.submit(&farmer, Category::Organic, "", evidence(), h(1)),
            Err(EngineError::InvalidInput(_))
        ));
        assert!(matches!(
            hs.svc
                .submit(&farmer, Category::Organic, "Lima", EvidenceHash::ZERO, h(1)),
            Err(EngineError::InvalidInput(_))
        ));

        hs.svc.set_blocked(&id("authority"), &farmer, true).unwrap();
        assert!(hs.svc.is_blocked(&farmer).unwrap());
        assert_eq!(
            hs.svc.submit(&farmer, Category::Organic, "Lima", evidence(), h(1)),
            Err(EngineError::Blocked(farmer.clone()))
        );
        hs.svc.set_blocked(&id("authority"), &farmer, false).unwrap();

        hs.svc
            .set_max_submissions_per_user(&id("authority"), 2)
            .unwrap();
        for _ in 0..2 {
            hs.svc
                .submit(&farmer, Category::Biodiversity, "Lima", evidence(), h(1))
                .unwrap();
        }
        assert!(matches!(
            hs.svc.submit(&farmer, Category::Biodiversity, "Lima", evidence(), h(1)),
            Err(EngineError::LimitReached(_))
        ));
        assert_eq!(hs.svc.get_user_submission_count(&farmer).unwrap(), 2);
        assert_eq!(hs.svc.next_proof_id().unwrap(), 3);
    }

    // ── Atomicity ───────────────────────────────────────────────────────

    #[test]
    fn refused_handoff_aborts_the_whole_attestation() {
        let mut hs = harness();
        let vs: Vec<Identity> = ["v1", "v2", "v3"]
            .iter()
            .map(|n| staked_verifier(&mut hs, n))
            .collect();
        let pid = submit_organic(&mut hs, 10);
        hs.svc.attest(pid, &vs[0], true, 90, h(11)).unwrap();
        hs.svc.attest(pid, &vs[1], true, 90, h(11)).unwrap();

        *hs.sink.refuse.lock().unwrap() = Some(EngineError::InvalidCategory(Category::Organic));
        let before = hs.store.snapshot();
        assert_eq!(
            hs.svc.attest(pid, &vs[2], true, 90, h(12)),
            Err(EngineError::InvalidCategory(Category::Organic))
        );
        assert_eq!(hs.store.snapshot(), before);
        assert!(hs.svc.get_attestation(pid, &vs[2]).unwrap().is_none());
    }

    #[test]
    fn refused_token_transfer_aborts_stake() {
        let mut hs = harness();
        let v = id("v1");
        hs.svc.register(&v, h(1)).unwrap();
        assert!(matches!(
            hs.svc.stake(&v, 1_000, h(2)),
            Err(EngineError::TokenLedger(_))
        ));
        assert_eq!(hs.svc.get_verifier(&v).unwrap().unwrap().stake, 0);
    }

    #[test]
    fn stake_is_locked_until_settlement() {
        let mut hs = harness();
        hs.svc.set_quorum_threshold(&id("authority"), 1).unwrap();
        let v = staked_verifier(&mut hs, "v1");
        let w = staked_verifier(&mut hs, "v2");
        let pid = submit_organic(&mut hs, 10);

        hs.svc.attest(pid, &w, false, 40, h(11)).unwrap();
        assert_eq!(
            hs.svc.unstake(&w, 1_000, h(12)),
            Err(EngineError::StakeLocked(w.clone()))
        );

        assert_eq!(
            hs.svc.attest(pid, &v, true, 77, h(13)).unwrap(),
            AttestOutcome::Finalized { score: 77 }
        );
        let returned = hs.svc.unstake(&w, 1_000, h(14)).unwrap();
        assert_eq!(returned.stake, 0);
        assert_eq!(hs.token.balance_of(&w), 10_000);
    }

    // ── Administration ──────────────────────────────────────────────────

    #[test]
    fn setters_are_authority_gated_and_bounded() {
        let mut hs = harness();
        let admin = id("authority");
        assert_eq!(
            hs.svc.set_quorum_threshold(&id("v1"), 5),
            Err(EngineError::Unauthorized(id("v1")))
        );
        assert!(hs.svc.set_quorum_threshold(&admin, 0).is_err());
        assert!(hs.svc.set_quorum_threshold(&admin, 11).is_err());
        assert!(hs.svc.set_expiry_window(&admin, 1_000).is_err());
        assert!(hs.svc.set_min_stake(&admin, 0).is_err());

        hs.svc.set_quorum_threshold(&admin, 5).unwrap();
        hs.svc.set_expiry_window(&admin, 2_000).unwrap();
        assert_eq!(hs.svc.params().quorum_threshold, 5);

        hs.svc.set_authority(&admin, &id("council")).unwrap();
        assert!(hs.svc.set_min_stake(&admin, 10).is_err());
        hs.svc.set_min_stake(&id("council"), 10).unwrap();
    }

    #[test]
    fn registers_survive_reopen() {
        let mut hs = harness();
        hs.svc.set_quorum_threshold(&id("authority"), 7).unwrap();

        let reopened = VerificationService::open(
            hs.store.clone(),
            hs.token.clone(),
            hs.sink.clone(),
            id("someone-else"),
            VerificationParams::default(),
        )
        .unwrap();
        assert_eq!(reopened.params().quorum_threshold, 7);
        assert_eq!(reopened.authority(), &id("authority"));
    }
}
