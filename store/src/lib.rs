//! Abstract storage for the greenproof engine.
//!
//! The host supplies an ordered byte-keyed map (an embedded database, a
//! contract storage trie, or the in-memory map from `greenproof-nullables`).
//! The engine depends only on the [`KvStore`] trait: point reads, ordered
//! prefix scans, and atomic commit of a [`WriteBatch`].

pub mod batch;
pub mod codec;
pub mod error;
pub mod keys;

pub use batch::WriteBatch;
pub use error::StoreError;

/// An ordered key-value map provided by the host.
///
/// `commit` must apply every operation in the batch or none of them; this is
/// the only way the engine mutates state.
pub trait KvStore: Send + Sync {
    /// Point lookup.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// All entries whose key starts with `prefix`, in ascending key order.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;

    /// Atomically apply every staged put and delete.
    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;
}

/// Decode the record stored at `key`, if any.
pub fn read<T, S>(store: &S, key: &[u8]) -> Result<Option<T>, StoreError>
where
    T: serde::de::DeserializeOwned,
    S: KvStore + ?Sized,
{
    store.get(key)?.map(|bytes| codec::decode(&bytes)).transpose()
}
