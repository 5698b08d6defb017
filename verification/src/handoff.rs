//! Finalization hand-off to the reward side.
//!
//! The verification service holds an [`EligibilitySink`] handle and calls it
//! from inside finalize. The dependency is one-directional: the reward crate
//! implements this trait, the verification crate never names the reward crate.

use greenproof_store::WriteBatch;
use greenproof_types::{BlockHeight, Category, EngineError, Identity};
use serde::{Deserialize, Serialize};

/// A reward-eligibility entry produced when a proof finalizes.
///
/// The eligibility id is the proof id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityRecord {
    pub id: u64,
    pub submitter: Identity,
    pub category: Category,
    pub approved: bool,
    /// Height of approval; the claim cooldown counts from here.
    pub approved_at: BlockHeight,
}

/// Receiver of eligibility records.
///
/// The sink stages its writes into the caller's batch, so the record is
/// committed together with the finalization or not at all. An error aborts
/// the whole enclosing attestation.
pub trait EligibilitySink: Send + Sync {
    fn register_eligibility(
        &self,
        batch: &mut WriteBatch,
        record: EligibilityRecord,
    ) -> Result<(), EngineError>;
}
