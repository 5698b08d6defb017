//! The fixed set of sustainable-practice categories a proof can claim.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Practice category of a proof. The set is closed; anything else is rejected
/// at submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Organic,
    CarbonNeutral,
    WaterEfficient,
    Biodiversity,
    FairTrade,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Organic,
        Category::CarbonNeutral,
        Category::WaterEfficient,
        Category::Biodiversity,
        Category::FairTrade,
    ];

    /// Canonical lowercase name, as used in configuration files and scripts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Organic => "organic",
            Self::CarbonNeutral => "carbon-neutral",
            Self::WaterEfficient => "water-efficient",
            Self::Biodiversity => "biodiversity",
            Self::FairTrade => "fair-trade",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a category name is outside the fixed set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_from_str() {
        for c in Category::ALL {
            assert_eq!(c.as_str().parse::<Category>().unwrap(), c);
        }
        assert!("Organic".parse::<Category>().is_err());
        assert!("recycled".parse::<Category>().is_err());
    }

    #[test]
    fn serde_uses_kebab_case_names() {
        let json = serde_json::to_string(&Category::CarbonNeutral).unwrap();
        assert_eq!(json, "\"carbon-neutral\"");
    }
}
