//! Error taxonomy shared by every engine operation.
//!
//! Every business condition is a variant here; callers match on it. Only
//! `Storage` and `TokenLedger` report failures of host collaborators.

use crate::{Category, Identity};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("{0} is not authorized for this operation")]
    Unauthorized(Identity),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("verifier {0} is already registered")]
    AlreadyRegistered(Identity),

    #[error("proof {id} is {status}, expected Pending")]
    InvalidStatus { id: u64, status: String },

    #[error("proof {id} expired at height {expiry}")]
    Expired { id: u64, expiry: u64 },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0} is blocked")]
    Blocked(Identity),

    #[error("limit reached: {0}")]
    LimitReached(String),

    #[error("insufficient stake: needed {needed}, have {have}")]
    InsufficientStake { needed: u128, have: u128 },

    #[error("stake of {0} is locked by open attestations")]
    StakeLocked(Identity),

    #[error("{verifier} already attested proof {proof_id}")]
    DuplicateAttestation { proof_id: u64, verifier: Identity },

    #[error("proof {0} is closed")]
    Closed(u64),

    #[error("eligibility {id} already claimed by {claimant}")]
    AlreadyClaimed { id: u64, claimant: Identity },

    #[error("eligibility {id} is not approved")]
    NotApproved { id: u64 },

    #[error("cooldown active: {remaining} blocks remaining")]
    CooldownActive { remaining: u64 },

    #[error("insufficient treasury: needed {needed}, available {available}")]
    InsufficientTreasury { needed: u128, available: u128 },

    #[error("no multiplier configured for category {0}")]
    InvalidCategory(Category),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("token ledger error: {0}")]
    TokenLedger(String),
}

impl EngineError {
    /// Stable machine-readable code for hosts that surface errors to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "Unauthorized",
            Self::NotFound(_) => "NotFound",
            Self::AlreadyExists(_) | Self::AlreadyRegistered(_) => "AlreadyExists",
            Self::InvalidStatus { .. } => "InvalidStatus",
            Self::Expired { .. } => "Expired",
            Self::InvalidInput(_) => "InvalidInput",
            Self::Blocked(_) => "Blocked",
            Self::LimitReached(_) => "LimitReached",
            Self::InsufficientStake { .. } => "InsufficientStake",
            Self::StakeLocked(_) => "StakeLocked",
            Self::DuplicateAttestation { .. } => "DuplicateAttestation",
            Self::Closed(_) => "Closed",
            Self::AlreadyClaimed { .. } => "AlreadyClaimed",
            Self::NotApproved { .. } => "NotApproved",
            Self::CooldownActive { .. } => "CooldownActive",
            Self::InsufficientTreasury { .. } => "InsufficientTreasury",
            Self::InvalidCategory(_) => "InvalidCategory",
            Self::Storage(_) => "Storage",
            Self::TokenLedger(_) => "TokenLedger",
        }
    }
}

impl From<crate::TokenError> for EngineError {
    fn from(e: crate::TokenError) -> Self {
        Self::TokenLedger(e.to_string())
    }
}

impl From<crate::category::UnknownCategory> for EngineError {
    fn from(e: crate::category::UnknownCategory) -> Self {
        Self::InvalidInput(e.to_string())
    }
}
