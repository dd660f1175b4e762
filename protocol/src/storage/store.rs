//! Storage trait and write batches.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::keys::{RecordKey, RecordKind};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupt record key: {0}")]
    CorruptKey(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Encode a record for storage.
pub fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Decode a stored record.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Staged record changes of one operation. `None` deletes the record.
#[derive(Debug, Default, Clone)]
pub struct WriteBatch {
    ops: Vec<(RecordKey, Option<Vec<u8>>)>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: RecordKey, value: Vec<u8>) {
        self.ops.push((key, Some(value)));
    }

    /// Encode and stage a typed record.
    pub fn put_record<T: Serialize>(&mut self, key: RecordKey, value: &T) -> StoreResult<()> {
        self.put(key, encode(value)?);
        Ok(())
    }

    pub fn delete(&mut self, key: RecordKey) {
        self.ops.push((key, None));
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<(RecordKey, Option<Vec<u8>>)> {
        self.ops
    }
}

/// Byte-level record store.
pub trait RecordStore: Send + Sync {
    fn get(&self, key: &RecordKey) -> StoreResult<Option<Vec<u8>>>;

    /// Apply every change in `batch` atomically.
    fn apply(&self, batch: WriteBatch) -> StoreResult<()>;

    /// All keys of one record kind, in key order.
    fn keys(&self, kind: RecordKind) -> StoreResult<Vec<RecordKey>>;

    /// Fetch and decode a typed record.
    fn get_record<T: DeserializeOwned>(&self, key: &RecordKey) -> StoreResult<Option<T>>
    where
        Self: Sized,
    {
        self.get(key)?.map(|bytes| decode(&bytes)).transpose()
    }
}
