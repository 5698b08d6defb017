//! Status history — an append-only audit trail of every status change.

use crate::proof::ProofStatus;
use greenproof_store::{codec, keys, KvStore, WriteBatch};
use greenproof_types::{BlockHeight, EngineError, Identity};
use serde::{Deserialize, Serialize};

/// Stored at `history/<proof id>/<seq>`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub updater: Identity,
    /// `None` for the submission entry.
    pub old_status: Option<ProofStatus>,
    pub new_status: ProofStatus,
    pub reason: String,
    pub height: BlockHeight,
}

pub struct StatusHistory;

impl StatusHistory {
    /// Committed entries of `proof_id`, oldest first.
    pub fn entries<S: KvStore + ?Sized>(
        &self,
        store: &S,
        proof_id: u64,
    ) -> Result<Vec<StatusChange>, EngineError> {
        store
            .scan_prefix(&keys::history_prefix(proof_id))?
            .into_iter()
            .map(|(_, bytes)| -> Result<StatusChange, EngineError> { Ok(codec::decode(&bytes)?) })
            .collect()
    }

    /// Stage `change` after the committed entries and any already staged in `batch`.
    pub fn append<S: KvStore + ?Sized>(
        &self,
        store: &S,
        batch: &mut WriteBatch,
        proof_id: u64,
        change: &StatusChange,
    ) -> Result<(), EngineError> {
        let mut seq = store.scan_prefix(&keys::history_prefix(proof_id))?.len() as u32;
        while batch.staged(&keys::history(proof_id, seq)).is_some() {
            seq += 1;
        }
        batch.put_record(&keys::history(proof_id, seq), change)?;
        Ok(())
    }
}
