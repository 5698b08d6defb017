//! Identity & Stake Ledger — verifier registration, stake, reputation and
//! open-commitment bookkeeping.
//!
//! Reputation is tracked for every identity that has submitted a proof, not
//! only for registered verifiers: a submitter's record is created on demand
//! with `registered == false` the first time an outcome adjusts it.

use greenproof_store::{keys, KvStore, WriteBatch};
use greenproof_types::{BlockHeight, EngineError, Identity};
use serde::{Deserialize, Serialize};

pub const INITIAL_REPUTATION: u8 = 50;
pub const MAX_REPUTATION: u8 = 100;
/// Reputation gained when one of the identity's proofs is approved.
pub const APPROVAL_REPUTATION_GAIN: u8 = 10;
/// Reputation lost when one of the identity's proofs is rejected.
pub const REJECTION_REPUTATION_LOSS: u8 = 5;

/// Stored at `verifier/<identity>`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verifier {
    pub identity: Identity,
    pub registered: bool,
    pub stake: u128,
    /// Always within `[0, 100]`.
    pub reputation: u8,
    /// Attestations on proofs that have not reached a terminal status yet.
    pub active_commitments: u32,
    pub last_activity: BlockHeight,
}

impl Verifier {
    fn unregistered(identity: Identity, now: BlockHeight) -> Self {
        Self {
            identity,
            registered: false,
            stake: 0,
            reputation: INITIAL_REPUTATION,
            active_commitments: 0,
            last_activity: now,
        }
    }

    /// Registered and holding at least `min_stake`.
    pub fn can_attest(&self, min_stake: u128) -> bool {
        self.registered && self.stake >= min_stake
    }

    pub fn raise_reputation(&mut self) {
        self.reputation = self
            .reputation
            .saturating_add(APPROVAL_REPUTATION_GAIN)
            .min(MAX_REPUTATION);
    }

    pub fn lower_reputation(&mut self) {
        self.reputation = self.reputation.saturating_sub(REJECTION_REPUTATION_LOSS);
    }
}

/// Stateless accessor over the `verifier/` map.
pub struct StakeLedger;

impl StakeLedger {
    /// Read a verifier record as the batch would leave it.
    pub fn get<S: KvStore + ?Sized>(
        &self,
        store: &S,
        batch: &WriteBatch,
        identity: &Identity,
    ) -> Result<Option<Verifier>, EngineError> {
        Ok(batch.read_through(store, &keys::verifier(identity))?)
    }

    /// Record for `identity`, or a fresh unregistered one.
    pub fn get_or_default<S: KvStore + ?Sized>(
        &self,
        store: &S,
        batch: &WriteBatch,
        identity: &Identity,
        now: BlockHeight,
    ) -> Result<Verifier, EngineError> {
        Ok(self
            .get(store, batch, identity)?
            .unwrap_or_else(|| Verifier::unregistered(identity.clone(), now)))
    }

    pub fn put(&self, batch: &mut WriteBatch, verifier: &Verifier) -> Result<(), EngineError> {
        batch.put_record(&keys::verifier(&verifier.identity), verifier)?;
        Ok(())
    }

    /// Stage a registration. Fails `AlreadyRegistered` if the identity is
    /// already a verifier; a submitter-only record keeps its reputation.
    pub fn register<S: KvStore + ?Sized>(
        &self,
        store: &S,
        batch: &mut WriteBatch,
        identity: &Identity,
        now: BlockHeight,
    ) -> Result<Verifier, EngineError> {
        if !identity.is_valid() {
            return Err(EngineError::InvalidInput(format!(
                "invalid identity {:?}",
                identity.as_str()
            )));
        }
        let mut verifier = self.get_or_default(store, batch, identity, now)?;
        if verifier.registered {
            return Err(EngineError::AlreadyRegistered(identity.clone()));
        }
        verifier.registered = true;
        verifier.last_activity = now;
        self.put(batch, &verifier)?;
        Ok(verifier)
    }

    /// Stage a stake increase. The caller moves the funds.
    pub fn stake<S: KvStore + ?Sized>(
        &self,
        store: &S,
        batch: &mut WriteBatch,
        identity: &Identity,
        amount: u128,
        now: BlockHeight,
    ) -> Result<Verifier, EngineError> {
        let mut verifier = self.require_registered(store, batch, identity)?;
        if amount == 0 {
            return Err(EngineError::InvalidInput("stake amount must be > 0".into()));
        }
        verifier.stake = verifier
            .stake
            .checked_add(amount)
            .ok_or_else(|| EngineError::InvalidInput("stake overflow".into()))?;
        verifier.last_activity = now;
        self.put(batch, &verifier)?;
        Ok(verifier)
    }

    /// Stage a stake decrease. Fails `StakeLocked` while any attestation of
    /// this verifier is still open.
    pub fn unstake<S: KvStore + ?Sized>(
        &self,
        store: &S,
        batch: &mut WriteBatch,
        identity: &Identity,
        amount: u128,
        now: BlockHeight,
    ) -> Result<Verifier, EngineError> {
        let mut verifier = self.require_registered(store, batch, identity)?;
        if amount == 0 {
            return Err(EngineError::InvalidInput("unstake amount must be > 0".into()));
        }
        if verifier.stake < amount {
            return Err(EngineError::InsufficientStake {
                needed: amount,
                have: verifier.stake,
            });
        }
        if verifier.active_commitments > 0 {
            return Err(EngineError::StakeLocked(identity.clone()));
        }
        verifier.stake -= amount;
        verifier.last_activity = now;
        self.put(batch, &verifier)?;
        Ok(verifier)
    }

    /// Release one open commitment after the proof reached a terminal status.
    pub fn settle_commitment<S: KvStore + ?Sized>(
        &self,
        store: &S,
        batch: &mut WriteBatch,
        identity: &Identity,
    ) -> Result<(), EngineError> {
        let Some(mut verifier) = self.get(store, batch, identity)? else {
            return Err(EngineError::NotFound(format!("verifier {identity}")));
        };
        debug_assert!(verifier.active_commitments > 0, "commitment underflow for {identity}");
        verifier.active_commitments = verifier.active_commitments.saturating_sub(1);
        self.put(batch, &verifier)
    }

    /// Apply a +10 / -5 outcome adjustment to `identity`'s reputation.
    pub fn adjust_reputation<S: KvStore + ?Sized>(
        &self,
        store: &S,
        batch: &mut WriteBatch,
        identity: &Identity,
        approved: bool,
        now: BlockHeight,
    ) -> Result<u8, EngineError> {
        let mut record = self.get_or_default(store, batch, identity, now)?;
        if approved {
            record.raise_reputation();
        } else {
            record.lower_reputation();
        }
        self.put(batch, &record)?;
        Ok(record.reputation)
    }

    fn require_registered<S: KvStore + ?Sized>(
        &self,
        store: &S,
        batch: &WriteBatch,
        identity: &Identity,
    ) -> Result<Verifier, EngineError> {
        match self.get(store, batch, identity)? {
            Some(v) if v.registered => Ok(v),
            _ => Err(EngineError::NotFound(format!("verifier {identity}"))),
        }
    }
}
