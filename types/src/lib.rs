//! Fundamental types for the greenproof attestation engine.
//!
//! This crate defines the types shared across every other crate in the workspace:
//! identities, evidence fingerprints, block heights, practice categories, the
//! configuration registers, the error taxonomy, and the narrow Token Ledger
//! contract the engine depends on.

pub mod category;
pub mod error;
pub mod hash;
pub mod height;
pub mod identity;
pub mod params;
pub mod token;

pub use category::Category;
pub use error::EngineError;
pub use hash::EvidenceHash;
pub use height::{BlockHeight, HeightSource};
pub use identity::Identity;
pub use params::{EngineConfig, PayoutMode, RewardParams, VerificationParams};
pub use token::{TokenError, TokenLedger};
