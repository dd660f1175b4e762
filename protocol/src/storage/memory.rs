//! In-memory record store.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use super::store::{RecordStore, StoreResult, WriteBatch};
use crate::keys::{RecordKey, RecordKind};

/// `BTreeMap` behind a `parking_lot::RwLock`. A batch is applied under one
/// write lock, so readers never see half of it.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<RecordKey, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl RecordStore for MemoryStore {
    fn get(&self, key: &RecordKey) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.records.read().get(key).cloned())
    }

    fn apply(&self, batch: WriteBatch) -> StoreResult<()> {
        let mut records = self.records.write();
        for (key, value) in batch.into_ops() {
            match value {
                Some(bytes) => {
                    records.insert(key, bytes);
                }
                None => {
                    records.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn keys(&self, kind: RecordKind) -> StoreResult<Vec<RecordKey>> {
        Ok(self
            .records
            .read()
            .keys()
            .filter(|k| k.kind() == kind)
            .copied()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;

    #[test]
    fn apply_and_get() {
        let store = MemoryStore::new();
        let key = RecordKey::profile(&Identity::new("alice"));

        let mut batch = WriteBatch::new();
        batch.put_record(key, &7u32).unwrap();
        store.apply(batch).unwrap();

        assert_eq!(store.get_record::<u32>(&key).unwrap(), Some(7));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn delete_removes_record() {
        let store = MemoryStore::new();
        let key = RecordKey::platform();
        let mut batch = WriteBatch::new();
        batch.put(key, vec![1, 2, 3]);
        store.apply(batch).unwrap();

        let mut batch = WriteBatch::new();
        batch.delete(key);
        store.apply(batch).unwrap();

        assert!(store.get(&key).unwrap().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn keys_filter_by_kind() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.put(RecordKey::platform(), vec![0]);
        batch.put(RecordKey::profile(&Identity::new("a")), vec![1]);
        batch.put(RecordKey::profile(&Identity::new("b")), vec![2]);
        store.apply(batch).unwrap();

        assert_eq!(store.keys(RecordKind::Profile).unwrap().len(), 2);
        assert_eq!(store.keys(RecordKind::Platform).unwrap(), vec![RecordKey::platform()]);
        assert!(store.keys(RecordKind::Loan).unwrap().is_empty());
    }
}
