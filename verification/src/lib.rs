//! Proof Verification Engine.
//!
//! Submitters post proofs of sustainable practice; registered, staked
//! verifiers attest approve/reject with a confidence score. Once enough
//! approvals accumulate the proof finalizes, the submitter's reputation rises,
//! and a reward-eligibility record is handed to the reward side.
//!
//! Components, leaf first:
//! - [`stake`]: verifier registration, stake, reputation, open commitments
//! - [`proof`]: proof records and lifecycle status
//! - [`attestation`]: one attestation per (proof, verifier) plus a per-proof index
//! - [`quorum`]: pure approval-quorum and confidence-score evaluation
//! - [`service`]: the orchestrating [`VerificationService`]
//!
//! Every mutating operation validates first, stages its writes in one
//! [`greenproof_store::WriteBatch`], and commits once.

pub mod attestation;
pub mod events;
pub mod handoff;
pub mod history;
pub mod proof;
pub mod quorum;
pub mod service;
pub mod stake;

pub use attestation::{Attestation, AttestationStore};
pub use events::VerificationEvent;
pub use handoff::{EligibilityRecord, EligibilitySink};
pub use history::{StatusChange, StatusHistory};
pub use proof::{Proof, ProofStatus, ProofStore};
pub use quorum::{QuorumEngine, Tally};
pub use service::{AttestOutcome, VerificationService};
pub use stake::{StakeLedger, Verifier};
