//! Reward distribution — the treasury and cycle registers, eligibility
//! records handed over by the verification side, and idempotent claims.
//!
//! The [`RewardLedger`] is the capability handle the verification service
//! holds: it stages eligibility into the finalizing batch, so approval and
//! eligibility commit together or not at all. The [`RewardService`] runs
//! claims, deposits and administrative changes over the same store.

pub mod claim;
pub mod cycle;
pub mod events;
pub mod ledger;
pub mod service;

pub use claim::{ClaimRecord, EligibilityEntry};
pub use cycle::RewardCycleState;
pub use events::RewardEvent;
pub use ledger::RewardLedger;
pub use service::{ClaimReceipt, RewardService};
