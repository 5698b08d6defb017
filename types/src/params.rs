//! Configuration registers — every tunable value the engine reads.
//!
//! One [`EngineConfig`] is built by the host (defaults or TOML) and handed to
//! the services at construction. After that the registers only change through
//! the authority-gated setters, which apply the same bounds as
//! [`EngineConfig::validate`].

use crate::{Category, EngineError, Identity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default number of approvals that finalizes a proof.
pub const DEFAULT_QUORUM_THRESHOLD: u32 = 3;
/// Upper bound for the quorum threshold.
pub const MAX_QUORUM_THRESHOLD: u32 = 10;
/// Default blocks a proof stays open for attestation (~1 year of 10-minute blocks).
pub const DEFAULT_EXPIRY_WINDOW: u64 = 52_560;
/// The expiry window must be strictly greater than this.
pub const MIN_EXPIRY_WINDOW: u64 = 1_000;
/// Default lifetime submission cap per submitter.
pub const DEFAULT_MAX_SUBMISSIONS_PER_USER: u32 = 50;
/// Default stake a verifier must hold to attest.
pub const DEFAULT_MIN_STAKE: u128 = 1_000;
/// Maximum location length in characters.
pub const MAX_LOCATION_LEN: usize = 100;

pub const DEFAULT_BASE_REWARD: u128 = 1_000;
pub const DEFAULT_PER_CYCLE_CAP: u128 = 1_000_000;
/// One week of 10-minute blocks.
pub const DEFAULT_CYCLE_DURATION: u64 = 1_008;
/// One day of 10-minute blocks.
pub const DEFAULT_COOLDOWN_BLOCKS: u64 = 144;
pub const MIN_MULTIPLIER: u32 = 50;
pub const MAX_MULTIPLIER: u32 = 300;

/// Top-level engine configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Identity allowed to call administrative setters and to reject or
    /// withdraw any proof.
    pub authority: Identity,

    #[serde(default)]
    pub verification: VerificationParams,

    #[serde(default)]
    pub reward: RewardParams,
}

impl EngineConfig {
    pub fn new(authority: Identity) -> Self {
        Self {
            authority,
            verification: VerificationParams::default(),
            reward: RewardParams::default(),
        }
    }

    /// Check every register against the bounds the setters enforce.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.authority.is_valid() {
            return Err(EngineError::InvalidInput(format!(
                "invalid authority identity {:?}",
                self.authority.as_str()
            )));
        }
        self.verification.validate()?;
        self.reward.validate()
    }
}

/// Registers read by the verification side.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationParams {
    /// Approving attestations needed to finalize, in `(0, 10]`.
    pub quorum_threshold: u32,
    /// Blocks after submission during which attestations are accepted.
    pub expiry_window: u64,
    /// Lifetime number of proofs a single submitter may create.
    pub max_submissions_per_user: u32,
    /// Stake a verifier must hold to attest or reject.
    #[serde(with = "amount")]
    pub min_stake: u128,
}

impl Default for VerificationParams {
    fn default() -> Self {
        Self {
            quorum_threshold: DEFAULT_QUORUM_THRESHOLD,
            expiry_window: DEFAULT_EXPIRY_WINDOW,
            max_submissions_per_user: DEFAULT_MAX_SUBMISSIONS_PER_USER,
            min_stake: DEFAULT_MIN_STAKE,
        }
    }
}

impl VerificationParams {
    pub fn validate(&self) -> Result<(), EngineError> {
        check_quorum_threshold(self.quorum_threshold)?;
        check_expiry_window(self.expiry_window)?;
        check_positive("max_submissions_per_user", self.max_submissions_per_user as u128)?;
        check_positive("min_stake", self.min_stake)
    }
}

/// How a reward payout reaches the claimant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutMode {
    /// Pay out of deposited treasury funds (`transfer_out`).
    #[default]
    Transfer,
    /// Mint fresh tokens; the treasury register is still debited.
    Mint,
}

/// Initial values of the reward cycle registers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardParams {
    #[serde(with = "amount")]
    pub base_reward: u128,
    /// Aggregate payout allowed within one cycle.
    #[serde(with = "amount")]
    pub per_cycle_cap: u128,
    pub cycle_duration_blocks: u64,
    /// Blocks between approval and the earliest claim.
    pub cooldown_blocks: u64,
    pub payout_mode: PayoutMode,
    /// Percentage multiplier per category, each in `[50, 300]`.
    #[serde(with = "multiplier_list")]
    pub multipliers: BTreeMap<Category, u32>,
}

impl Default for RewardParams {
    fn default() -> Self {
        Self {
            base_reward: DEFAULT_BASE_REWARD,
            per_cycle_cap: DEFAULT_PER_CYCLE_CAP,
            cycle_duration_blocks: DEFAULT_CYCLE_DURATION,
            cooldown_blocks: DEFAULT_COOLDOWN_BLOCKS,
            payout_mode: PayoutMode::Transfer,
            multipliers: default_multipliers(),
        }
    }
}

impl RewardParams {
    pub fn validate(&self) -> Result<(), EngineError> {
        check_positive("base_reward", self.base_reward)?;
        check_positive("per_cycle_cap", self.per_cycle_cap)?;
        check_positive("cycle_duration_blocks", self.cycle_duration_blocks as u128)?;
        for multiplier in self.multipliers.values() {
            check_multiplier(*multiplier)?;
        }
        Ok(())
    }
}

fn default_multipliers() -> BTreeMap<Category, u32> {
    BTreeMap::from([
        (Category::Organic, 150),
        (Category::CarbonNeutral, 200),
        (Category::WaterEfficient, 120),
        (Category::Biodiversity, 180),
        (Category::FairTrade, 100),
    ])
}

// ── Bounds shared by validate() and the setters ────────────────────────

pub fn check_quorum_threshold(value: u32) -> Result<(), EngineError> {
    if value == 0 || value > MAX_QUORUM_THRESHOLD {
        return Err(EngineError::InvalidInput(format!(
            "quorum threshold {value} outside (0, {MAX_QUORUM_THRESHOLD}]"
        )));
    }
    Ok(())
}

pub fn check_expiry_window(value: u64) -> Result<(), EngineError> {
    if value <= MIN_EXPIRY_WINDOW {
        return Err(EngineError::InvalidInput(format!(
            "expiry window {value} must exceed {MIN_EXPIRY_WINDOW}"
        )));
    }
    Ok(())
}

pub fn check_multiplier(value: u32) -> Result<(), EngineError> {
    if !(MIN_MULTIPLIER..=MAX_MULTIPLIER).contains(&value) {
        return Err(EngineError::InvalidInput(format!(
            "multiplier {value} outside [{MIN_MULTIPLIER}, {MAX_MULTIPLIER}]"
        )));
    }
    Ok(())
}

pub fn check_positive(name: &str, value: u128) -> Result<(), EngineError> {
    if value == 0 {
        return Err(EngineError::InvalidInput(format!("{name} must be > 0")));
    }
    Ok(())
}

/// Serializes the multiplier map as a list of `{category, multiplier}` rows so
/// that formats with string-only map keys (TOML) can carry it.
mod multiplier_list {
    use crate::Category;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    #[derive(Serialize, Deserialize)]
    struct Row {
        category: Category,
        multiplier: u32,
    }

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<Category, u32>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let rows: Vec<Row> = map
            .iter()
            .map(|(category, multiplier)| Row {
                category: *category,
                multiplier: *multiplier,
            })
            .collect();
        rows.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<Category, u32>, D::Error> {
        let rows = Vec::<Row>::deserialize(deserializer)?;
        Ok(rows.into_iter().map(|r| (r.category, r.multiplier)).collect())
    }
}

/// Token amounts in human-readable formats. TOML integers are `i64`, so
/// larger values travel as decimal strings; binary formats keep `u128`.
mod amount {
    use serde::de::{self, Visitor};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        if !serializer.is_human_readable() {
            return serializer.serialize_u128(*value);
        }
        match i64::try_from(*value) {
            Ok(small) => serializer.serialize_i64(small),
            Err(_) => serializer.serialize_str(&value.to_string()),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        if !deserializer.is_human_readable() {
            return u128::deserialize(deserializer);
        }
        deserializer.deserialize_any(AmountVisitor)
    }

    struct AmountVisitor;

    impl<'de> Visitor<'de> for AmountVisitor {
        type Value = u128;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a non-negative integer or a decimal string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u128, E> {
            Ok(u128::from(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u128, E> {
            u128::try_from(v).map_err(|_| E::custom(format!("negative amount {v}")))
        }

        fn visit_u128<E: de::Error>(self, v: u128) -> Result<u128, E> {
            Ok(v)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<u128, E> {
            v.parse().map_err(|_| E::custom(format!("invalid amount {v:?}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::new(Identity::new("authority"));
        assert!(config.validate().is_ok());
        assert_eq!(config.verification.quorum_threshold, 3);
        assert_eq!(config.verification.expiry_window, 52_560);
        assert_eq!(config.reward.multipliers.len(), Category::ALL.len());
    }

    #[test]
    fn bounds_are_enforced() {
        assert!(check_quorum_threshold(0).is_err());
        assert!(check_quorum_threshold(10).is_ok());
        assert!(check_quorum_threshold(11).is_err());
        assert!(check_expiry_window(1_000).is_err());
        assert!(check_expiry_window(1_001).is_ok());
        assert!(check_multiplier(49).is_err());
        assert!(check_multiplier(50).is_ok());
        assert!(check_multiplier(300).is_ok());
        assert!(check_multiplier(301).is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_multiplier() {
        let mut config = EngineConfig::new(Identity::new("authority"));
        config.reward.multipliers.insert(Category::Organic, 400);
        assert!(matches!(config.validate(), Err(EngineError::InvalidInput(_))));
    }

    #[test]
    fn multiplier_map_survives_json() {
        let params = RewardParams::default();
        let json = serde_json::to_string(&params).unwrap();
        let back: RewardParams = serde_json::from_str(&json).unwrap();
        assert_eq!(back, params);
    }

    #[test]
    fn large_amounts_travel_as_strings() {
        let params = RewardParams {
            per_cycle_cap: u128::from(u64::MAX) * 4,
            ..RewardParams::default()
        };
        let json = serde_json::to_value(&params).unwrap();
        assert!(json["per_cycle_cap"].is_string());
        assert!(json["base_reward"].is_i64());
        let back: RewardParams = serde_json::from_value(json).unwrap();
        assert_eq!(back.per_cycle_cap, params.per_cycle_cap);

        let bytes = bincode::serialize(&params).unwrap();
        let back: RewardParams = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, params);
    }
}
