//! Nullable infrastructure for deterministic testing.
//!
//! Every host collaborator the engine talks to (height clock, key-value store,
//! token ledger) is abstracted behind a trait. This crate provides
//! implementations that:
//! - Return deterministic values
//! - Can be controlled programmatically, including fault injection
//! - Never touch the filesystem or network
//!
//! Usage: hand these to the services in tests and in the replay daemon.

pub mod clock;
pub mod store;
pub mod token;

pub use clock::NullClock;
pub use store::NullKvStore;
pub use token::NullTokenLedger;
