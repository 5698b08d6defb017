//! Attestation Store — one immutable attestation per (proof, verifier), plus
//! an explicit per-proof index of attesting verifiers so quorum evaluation
//! touches only the attestations of that proof.

use greenproof_store::{keys, KvStore, WriteBatch};
use greenproof_types::{BlockHeight, EngineError, Identity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Highest confidence a verifier can express.
pub const MAX_CONFIDENCE: u8 = 100;

/// Stored at `attn/<proof id>/<verifier>`. Written exactly once.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    pub proof_id: u64,
    pub verifier: Identity,
    pub approved: bool,
    /// In `[0, 100]`.
    pub confidence: u8,
    pub timestamp: BlockHeight,
}

/// Stateless accessor over `attn/` and `attn_index/`.
pub struct AttestationStore;

impl AttestationStore {
    pub fn get<S: KvStore + ?Sized>(
        &self,
        store: &S,
        batch: &WriteBatch,
        proof_id: u64,
        verifier: &Identity,
    ) -> Result<Option<Attestation>, EngineError> {
        Ok(batch.read_through(store, &keys::attestation(proof_id, verifier))?)
    }

    /// Verifiers that have attested `proof_id`, in identity order.
    pub fn attesters<S: KvStore + ?Sized>(
        &self,
        store: &S,
        batch: &WriteBatch,
        proof_id: u64,
    ) -> Result<BTreeSet<Identity>, EngineError> {
        Ok(batch
            .read_through(store, &keys::attestation_index(proof_id))?
            .unwrap_or_default())
    }

    /// All attestations on `proof_id`, resolved through the index.
    pub fn for_proof<S: KvStore + ?Sized>(
        &self,
        store: &S,
        batch: &WriteBatch,
        proof_id: u64,
    ) -> Result<Vec<Attestation>, EngineError> {
        let attesters = self.attesters(store, batch, proof_id)?;
        let mut out = Vec::with_capacity(attesters.len());
        for verifier in &attesters {
            match self.get(store, batch, proof_id, verifier)? {
                Some(a) => out.push(a),
                None => {
                    return Err(EngineError::Storage(format!(
                        "attestation index of proof {proof_id} lists {verifier} without a record"
                    )))
                }
            }
        }
        Ok(out)
    }

    /// Stage a new attestation together with its index entry.
    ///
    /// Fails `DuplicateAttestation` if the key is already taken.
    pub fn record<S: KvStore + ?Sized>(
        &self,
        store: &S,
        batch: &mut WriteBatch,
        attestation: &Attestation,
    ) -> Result<(), EngineError> {
        let proof_id = attestation.proof_id;
        let mut attesters = self.attesters(store, batch, proof_id)?;
        if !attesters.insert(attestation.verifier.clone())
            || self
                .get(store, batch, proof_id, &attestation.verifier)?
                .is_some()
        {
            return Err(EngineError::DuplicateAttestation {
                proof_id,
                verifier: attestation.verifier.clone(),
            });
        }
        batch.put_record(&keys::attestation(proof_id, &attestation.verifier), attestation)?;
        batch.put_record(&keys::attestation_index(proof_id), &attesters)?;
        Ok(())
    }
}
