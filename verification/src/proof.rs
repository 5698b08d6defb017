//! Proof Store — proof records and their lifecycle status.

use greenproof_store::{keys, KvStore, WriteBatch};
use greenproof_types::params::MAX_LOCATION_LEN;
use greenproof_types::{BlockHeight, Category, EngineError, EvidenceHash, Identity};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status. `Pending` is the only non-terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProofStatus {
    Pending,
    Approved,
    Rejected,
    Withdrawn,
}

impl ProofStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for ProofStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Stored at `proof/<id>`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    pub id: u64,
    pub submitter: Identity,
    pub category: Category,
    pub location: String,
    pub evidence: EvidenceHash,
    pub created_at: BlockHeight,
    pub status: ProofStatus,
    /// Truncated mean confidence of the approving attestations, set on approval.
    pub score: u8,
    /// Last height at which attestations are accepted.
    pub expiry: BlockHeight,
    /// `closed == status.is_terminal()`; a closed proof never changes again.
    pub closed: bool,
}

impl Proof {
    pub fn is_expired(&self, now: BlockHeight) -> bool {
        now > self.expiry
    }

    /// Move to a terminal status. Panics in debug builds if already closed.
    pub(crate) fn close_as(&mut self, status: ProofStatus) {
        debug_assert!(!self.closed, "proof {} mutated after close", self.id);
        debug_assert!(status.is_terminal());
        self.status = status;
        self.closed = true;
    }
}

/// Validate submission fields that do not depend on stored state.
pub fn validate_submission(location: &str, evidence: &EvidenceHash) -> Result<(), EngineError> {
    let chars = location.chars().count();
    if chars == 0 || chars > MAX_LOCATION_LEN {
        return Err(EngineError::InvalidInput(format!(
            "location length {chars} outside (0, {MAX_LOCATION_LEN}]"
        )));
    }
    if evidence.is_zero() {
        return Err(EngineError::InvalidInput("evidence hash is the zero sentinel".into()));
    }
    Ok(())
}

/// Stateless accessor over the `proof/` map, the id register and the
/// per-submitter counters.
pub struct ProofStore;

impl ProofStore {
    pub fn get<S: KvStore + ?Sized>(
        &self,
        store: &S,
        batch: &WriteBatch,
        id: u64,
    ) -> Result<Option<Proof>, EngineError> {
        Ok(batch.read_through(store, &keys::proof(id))?)
    }

    /// Like [`ProofStore::get`] but `NotFound` when absent.
    pub fn require<S: KvStore + ?Sized>(
        &self,
        store: &S,
        batch: &WriteBatch,
        id: u64,
    ) -> Result<Proof, EngineError> {
        self.get(store, batch, id)?
            .ok_or_else(|| EngineError::NotFound(format!("proof {id}")))
    }

    pub fn put(&self, batch: &mut WriteBatch, proof: &Proof) -> Result<(), EngineError> {
        batch.put_record(&keys::proof(proof.id), proof)?;
        Ok(())
    }

    /// Id the next submission will receive. Ids start at 1.
    pub fn next_id<S: KvStore + ?Sized>(
        &self,
        store: &S,
        batch: &WriteBatch,
    ) -> Result<u64, EngineError> {
        Ok(batch
            .read_through(store, &keys::meta(keys::META_NEXT_PROOF_ID))?
            .unwrap_or(1))
    }

    pub fn submission_count<S: KvStore + ?Sized>(
        &self,
        store: &S,
        batch: &WriteBatch,
        submitter: &Identity,
    ) -> Result<u32, EngineError> {
        Ok(batch
            .read_through(store, &keys::submission_count(submitter))?
            .unwrap_or(0))
    }

    /// Stage a new Pending proof: assigns the id, bumps the id register and
    /// the submitter's lifetime counter.
    #[allow(clippy::too_many_arguments)]
    pub fn create<S: KvStore + ?Sized>(
        &self,
        store: &S,
        batch: &mut WriteBatch,
        submitter: &Identity,
        category: Category,
        location: String,
        evidence: EvidenceHash,
        expiry_window: u64,
        now: BlockHeight,
    ) -> Result<Proof, EngineError> {
        let id = self.next_id(store, batch)?;
        let count = self.submission_count(store, batch, submitter)?;
        let proof = Proof {
            id,
            submitter: submitter.clone(),
            category,
            location,
            evidence,
            created_at: now,
            status: ProofStatus::Pending,
            score: 0,
            expiry: now.offset(expiry_window),
            closed: false,
        };
        self.put(batch, &proof)?;
        batch.put_record(&keys::meta(keys::META_NEXT_PROOF_ID), &(id + 1))?;
        batch.put_record(&keys::submission_count(submitter), &(count + 1))?;
        Ok(proof)
    }
}
