//! # SledStore — Persistent Record Storage
//!
//! The persistence layer for ledger records, built on sled's embedded
//! key-value store.
//!
//! ## Tree Layout
//!
//! | Tree       | Key                          | Value            |
//! |------------|------------------------------|------------------|
//! | `records`  | `kind (1B) || blake3 (32B)`  | `bincode(record)`|
//! | `metadata` | key (UTF-8)                  | value (bytes)    |
//!
//! The record kind is the first key byte, so `scan_prefix([kind])` lists
//! every record of one kind without an index.
//!
//! ## Atomicity
//!
//! All writes of one ledger operation go through a single sled `Batch` on
//! the `records` tree. sled applies a batch atomically: either every record
//! lands on disk or none does.

use sled::{Batch, Db, Tree};
use std::path::Path;
use tracing::{debug, info};

use super::store::{RecordStore, StoreError, StoreResult, WriteBatch};
use crate::keys::{RecordKey, RecordKind};

/// Metadata key recording the on-disk schema version.
const META_SCHEMA_VERSION: &[u8] = b"schema_version";

/// Current on-disk schema version.
const SCHEMA_VERSION: u32 = 1;

/// sled-backed [`RecordStore`].
///
/// sled trees support concurrent reads and serialized writes, so a
/// `SledStore` can be shared across threads via `Arc` without extra
/// locking.
#[derive(Debug, Clone)]
pub struct SledStore {
    db: Db,
    records: Tree,
    metadata: Tree,
    flush_on_commit: bool,
}

impl SledStore {
    /// Open or create a store at the given filesystem path. Every committed
    /// batch is flushed before `apply` returns.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path.as_ref())?;
        info!(path = %path.as_ref().display(), "record store opened");
        Self::from_db(db, true)
    }

    /// A throwaway store cleaned up on drop. Skips flushing.
    pub fn open_temporary() -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db, false)
    }

    fn from_db(db: Db, flush_on_commit: bool) -> StoreResult<Self> {
        let records = db.open_tree("records")?;
        let metadata = db.open_tree("metadata")?;

        if metadata.get(META_SCHEMA_VERSION)?.is_none() {
            metadata.insert(META_SCHEMA_VERSION, SCHEMA_VERSION.to_be_bytes().to_vec())?;
        }

        Ok(Self {
            db,
            records,
            metadata,
            flush_on_commit,
        })
    }

    /// On-disk schema version.
    pub fn schema_version(&self) -> StoreResult<u32> {
        let bytes = self
            .metadata
            .get(META_SCHEMA_VERSION)?
            .ok_or_else(|| StoreError::Serialization("missing schema version".to_string()))?;
        let raw: [u8; 4] = bytes
            .as_ref()
            .try_into()
            .map_err(|_| StoreError::Serialization("invalid schema version bytes".to_string()))?;
        Ok(u32::from_be_bytes(raw))
    }

    /// Number of stored records of every kind.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

impl RecordStore for SledStore {
    fn get(&self, key: &RecordKey) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.records.get(key.to_bytes())?.map(|v| v.to_vec()))
    }

    fn apply(&self, batch: WriteBatch) -> StoreResult<()> {
        let mut sled_batch = Batch::default();
        let ops = batch.len();
        for (key, value) in batch.into_ops() {
            match value {
                Some(bytes) => sled_batch.insert(key.to_bytes().to_vec(), bytes),
                None => sled_batch.remove(key.to_bytes().to_vec()),
            }
        }
        self.records.apply_batch(sled_batch)?;

        if self.flush_on_commit {
            self.records.flush()?;
        }
        debug!(ops, "batch applied");
        Ok(())
    }

    fn keys(&self, kind: RecordKind) -> StoreResult<Vec<RecordKey>> {
        let mut keys = Vec::new();
        for entry in self.records.scan_prefix([kind as u8]) {
            let (raw, _) = entry?;
            let key = RecordKey::from_bytes(&raw)
                .ok_or_else(|| StoreError::CorruptKey(hex::encode(&raw)))?;
            keys.push(key);
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;

    #[test]
    fn open_temporary_store() {
        let store = SledStore::open_temporary().expect("should create temp store");
        assert_eq!(store.record_count(), 0);
        assert_eq!(store.schema_version().unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn records_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let key = RecordKey::profile(&Identity::new("alice"));

        {
            let store = SledStore::open(dir.path()).expect("should open store");
            let mut batch = WriteBatch::new();
            batch.put_record(key, &"hello".to_string()).unwrap();
            store.apply(batch).unwrap();
        }

        let store = SledStore::open(dir.path()).expect("should reopen store");
        assert_eq!(store.get_record::<String>(&key).unwrap().as_deref(), Some("hello"));
    }

    #[test]
    fn batch_applies_puts_and_deletes() {
        let store = SledStore::open_temporary().unwrap();
        let a = RecordKey::profile(&Identity::new("a"));
        let b = RecordKey::profile(&Identity::new("b"));

        let mut batch = WriteBatch::new();
        batch.put(a, vec![1]);
        batch.put(b, vec![2]);
        store.apply(batch).unwrap();
        assert_eq!(store.record_count(), 2);

        let mut batch = WriteBatch::new();
        batch.delete(a);
        batch.put(b, vec![3]);
        store.apply(batch).unwrap();

        assert!(store.get(&a).unwrap().is_none());
        assert_eq!(store.get(&b).unwrap(), Some(vec![3]));
    }

    #[test]
    fn keys_scan_by_kind_prefix() {
        let store = SledStore::open_temporary().unwrap();
        let mut batch = WriteBatch::new();
        batch.put(RecordKey::platform(), vec![0]);
        batch.put(RecordKey::profile(&Identity::new("a")), vec![1]);
        batch.put(RecordKey::history(&Identity::new("a"), 0), vec![2]);
        store.apply(batch).unwrap();

        let profiles = store.keys(RecordKind::Profile).unwrap();
        assert_eq!(profiles, vec![RecordKey::profile(&Identity::new("a"))]);
        assert_eq!(store.keys(RecordKind::History).unwrap().len(), 1);
    }

    #[test]
    fn concurrent_reads_do_not_block() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(SledStore::open_temporary().unwrap());
        let mut batch = WriteBatch::new();
        for i in 0..10u64 {
            batch
                .put_record(RecordKey::profile(&Identity::new(format!("user_{i}"))), &i)
                .unwrap();
        }
        store.apply(batch).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..10u64 {
                        let key = RecordKey::profile(&Identity::new(format!("user_{i}")));
                        assert_eq!(store.get_record::<u64>(&key).unwrap(), Some(i));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("reader thread should not panic");
        }
    }
}
