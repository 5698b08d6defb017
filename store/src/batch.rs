//! Write batching — stages every mutation of one engine operation so it can
//! be validated in full and then applied in a single atomic commit.
//!
//! # Usage
//!
//! ```ignore
//! let mut batch = WriteBatch::new();
//! batch.put_record(&keys::proof(id), &proof)?;
//! batch.put_record(&keys::submission_count(&submitter), &(count + 1))?;
//! store.commit(batch)?;
//! ```
//!
//! Dropping a batch without committing it discards every staged operation.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{codec, KvStore, StoreError};

/// Staged puts (`Some`) and deletes (`None`), last write per key wins.
#[derive(Clone, Debug, Default)]
pub struct WriteBatch {
    ops: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.insert(key, Some(value));
    }

    /// Encode `value` and stage it under `key`.
    pub fn put_record<T: Serialize>(&mut self, key: &[u8], value: &T) -> Result<(), StoreError> {
        self.put(key.to_vec(), codec::encode(value)?);
        Ok(())
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.ops.insert(key, None);
    }

    /// What this batch would leave at `key`: `None` if untouched,
    /// `Some(None)` if deleted, `Some(Some(bytes))` if written.
    pub fn staged(&self, key: &[u8]) -> Option<Option<&[u8]>> {
        self.ops.get(key).map(|v| v.as_deref())
    }

    /// Read `key` as it would be after commit: staged value first, then the store.
    pub fn get_through<S: KvStore + ?Sized>(
        &self,
        store: &S,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, StoreError> {
        match self.staged(key) {
            Some(staged) => Ok(staged.map(<[u8]>::to_vec)),
            None => store.get(key),
        }
    }

    /// Typed variant of [`WriteBatch::get_through`].
    pub fn read_through<T, S>(&self, store: &S, key: &[u8]) -> Result<Option<T>, StoreError>
    where
        T: DeserializeOwned,
        S: KvStore + ?Sized,
    {
        self.get_through(store, key)?
            .map(|bytes| codec::decode(&bytes))
            .transpose()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Consume the batch, yielding operations in ascending key order.
    pub fn into_ops(self) -> impl Iterator<Item = (Vec<u8>, Option<Vec<u8>>)> {
        self.ops.into_iter()
    }
}
