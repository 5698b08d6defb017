//! Token Ledger collaborator contract.
//!
//! Balance storage, supply policy, pausing and blacklists live outside the
//! engine. The engine only moves funds through these three calls, each of
//! which either fully succeeds or leaves the ledger untouched.

use crate::Identity;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("insufficient balance: need {needed}, available {available}")]
    InsufficientBalance { needed: u128, available: u128 },

    #[error("token ledger rejected the transfer: {0}")]
    Rejected(String),
}

/// The narrow surface of the fungible-token ledger the engine depends on.
pub trait TokenLedger: Send + Sync {
    /// Move `amount` from `from` into the engine's custody.
    fn transfer_in(&self, amount: u128, from: &Identity) -> Result<(), TokenError>;

    /// Move `amount` out of the engine's custody to `to`.
    fn transfer_out(&self, amount: u128, to: &Identity) -> Result<(), TokenError>;

    /// Mint `amount` fresh tokens to `to`.
    fn mint(&self, amount: u128, to: &Identity) -> Result<(), TokenError>;
}
