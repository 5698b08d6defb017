//! Events emitted by the verification service after each committed operation.

use greenproof_types::{Category, Identity};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerificationEvent {
    VerifierRegistered { verifier: Identity },
    Staked { verifier: Identity, amount: u128, total: u128 },
    Unstaked { verifier: Identity, amount: u128, total: u128 },
    ProofSubmitted { id: u64, submitter: Identity, category: Category },
    AttestationRecorded { proof_id: u64, verifier: Identity, approved: bool, confidence: u8 },
    /// Quorum reached; the proof is Approved and reward-eligible.
    ProofFinalized { id: u64, submitter: Identity, category: Category, score: u8 },
    ProofRejected { id: u64, by: Identity, reason: String },
    ProofWithdrawn { id: u64, by: Identity },
    ParameterChanged { name: &'static str, value: String },
}
