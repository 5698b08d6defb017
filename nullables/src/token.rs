//! Nullable token ledger — in-memory balances with fault injection.

use greenproof_types::{Identity, TokenError, TokenLedger};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Balances {
    accounts: HashMap<Identity, u128>,
    /// Funds held by the engine (stakes and treasury deposits).
    custody: u128,
    minted: u128,
}

/// An in-memory [`TokenLedger`].
///
/// Accounts must be funded with [`NullTokenLedger::credit`] before they can
/// transfer in. Every call is all-or-nothing.
pub struct NullTokenLedger {
    balances: Mutex<Balances>,
    reject_all: AtomicBool,
}

impl NullTokenLedger {
    pub fn new() -> Self {
        Self {
            balances: Mutex::new(Balances::default()),
            reject_all: AtomicBool::new(false),
        }
    }

    /// Give `who` spendable tokens.
    pub fn credit(&self, who: &Identity, amount: u128) {
        if let Ok(mut b) = self.balances.lock() {
            *b.accounts.entry(who.clone()).or_default() += amount;
        }
    }

    pub fn balance_of(&self, who: &Identity) -> u128 {
        self.balances
            .lock()
            .map(|b| b.accounts.get(who).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Tokens currently held on behalf of the engine.
    pub fn custody(&self) -> u128 {
        self.balances.lock().map(|b| b.custody).unwrap_or(0)
    }

    pub fn total_minted(&self) -> u128 {
        self.balances.lock().map(|b| b.minted).unwrap_or(0)
    }

    /// Refuse every subsequent call (simulates a paused token).
    pub fn set_reject_all(&self, reject: bool) {
        self.reject_all.store(reject, Ordering::SeqCst);
    }

    fn guard(&self) -> Result<MutexGuard<'_, Balances>, TokenError> {
        if self.reject_all.load(Ordering::SeqCst) {
            return Err(TokenError::Rejected("token ledger paused".into()));
        }
        self.balances
            .lock()
            .map_err(|_| TokenError::Rejected("ledger mutex poisoned".into()))
    }
}

impl Default for NullTokenLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenLedger for NullTokenLedger {
    fn transfer_in(&self, amount: u128, from: &Identity) -> Result<(), TokenError> {
        let mut b = self.guard()?;
        let available = b.accounts.get(from).copied().unwrap_or(0);
        if available < amount {
            return Err(TokenError::InsufficientBalance {
                needed: amount,
                available,
            });
        }
        b.accounts.insert(from.clone(), available - amount);
        b.custody += amount;
        Ok(())
    }

    fn transfer_out(&self, amount: u128, to: &Identity) -> Result<(), TokenError> {
        let mut b = self.guard()?;
        if b.custody < amount {
            return Err(TokenError::InsufficientBalance {
                needed: amount,
                available: b.custody,
            });
        }
        b.custody -= amount;
        *b.accounts.entry(to.clone()).or_default() += amount;
        Ok(())
    }

    fn mint(&self, amount: u128, to: &Identity) -> Result<(), TokenError> {
        let mut b = self.guard()?;
        b.minted += amount;
        *b.accounts.entry(to.clone()).or_default() += amount;
        Ok(())
    }
}
