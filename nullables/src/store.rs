//! Nullable store — thread-safe in-memory ordered map for testing.

use greenproof_store::{KvStore, StoreError, WriteBatch};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// An in-memory [`KvStore`] backed by a `BTreeMap`.
pub struct NullKvStore {
    entries: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
    /// Commits left until the injected failure; 0 when disarmed.
    fail_countdown: AtomicUsize,
}

impl NullKvStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            fail_countdown: AtomicUsize::new(0),
        }
    }

    /// Make the next `commit` fail without applying anything.
    pub fn fail_next_commit(&self) {
        self.fail_commit_after(0);
    }

    /// Let `skip` commits through, then fail the one after.
    pub fn fail_commit_after(&self, skip: usize) {
        self.fail_countdown.store(skip + 1, Ordering::SeqCst);
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the full contents, for before/after comparisons in tests.
    pub fn snapshot(&self) -> BTreeMap<Vec<u8>, Vec<u8>> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    fn entries(&self) -> Result<MutexGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Backend("store mutex poisoned".into()))
    }
}

impl Default for NullKvStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for NullKvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let entries = self.entries()?;
        Ok(entries
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let armed = self
            .fail_countdown
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if armed == Ok(1) {
            return Err(StoreError::Backend("injected commit failure".into()));
        }
        let mut entries = self.entries()?;
        for (key, value) in batch.into_ops() {
            match value {
                Some(v) => {
                    entries.insert(key, v);
                }
                None => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_applies_puts_and_deletes() {
        let store = NullKvStore::new();
        let mut batch = WriteBatch::new();
        batch.put(b"k1".to_vec(), b"v1".to_vec());
        batch.put(b"k2".to_vec(), b"v2".to_vec());
        store.commit(batch).unwrap();
        assert_eq!(store.get(b"k1").unwrap(), Some(b"v1".to_vec()));

        let mut batch = WriteBatch::new();
        batch.delete(b"k1".to_vec());
        store.commit(batch).unwrap();
        assert_eq!(store.get(b"k1").unwrap(), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn scan_prefix_is_ordered_and_bounded() {
        let store = NullKvStore::new();
        let mut batch = WriteBatch::new();
        batch.put(b"a/2".to_vec(), vec![2]);
        batch.put(b"a/1".to_vec(), vec![1]);
        batch.put(b"b/1".to_vec(), vec![3]);
        store.commit(batch).unwrap();

        let found = store.scan_prefix(b"a/").unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].0, b"a/1".to_vec());
        assert_eq!(found[1].0, b"a/2".to_vec());
    }

    #[test]
    fn injected_failure_applies_nothing() {
        let store = NullKvStore::new();
        store.fail_next_commit();
        let mut batch = WriteBatch::new();
        batch.put(b"k".to_vec(), vec![1]);
        assert!(store.commit(batch).is_err());
        assert!(store.is_empty());

        let mut batch = WriteBatch::new();
        batch.put(b"k".to_vec(), vec![1]);
        assert!(store.commit(batch).is_ok());

        store.fail_commit_after(1);
        assert!(store.commit(WriteBatch::new()).is_ok());
        assert!(store.commit(WriteBatch::new()).is_err());
        assert!(store.commit(WriteBatch::new()).is_ok());
    }
}
