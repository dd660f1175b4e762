//! # Record Lock Table
//!
//! Every engine operation declares the records it touches up front. The
//! lock table hands out one reader/writer lock per record key and acquires
//! a declared set in key order, so two operations can never wait on each
//! other in a cycle.
//!
//! Operations on disjoint records never contend. Operations sharing a
//! record serialize on it; readers of a record run alongside each other.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLock};

use microlend_protocol::keys::RecordKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Access {
    Read,
    Write,
}

/// The records one operation touches. A key declared both ways is locked
/// for writing.
#[derive(Debug, Default, Clone)]
pub struct RecordSet {
    keys: BTreeMap<RecordKey, Access>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(mut self, key: RecordKey) -> Self {
        self.keys.entry(key).or_insert(Access::Read);
        self
    }

    pub fn write(mut self, key: RecordKey) -> Self {
        self.keys.insert(key, Access::Write);
        self
    }

    pub fn access(&self, key: &RecordKey) -> Option<Access> {
        self.keys.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

enum Guard {
    Read(ArcRwLockReadGuard<RawRwLock, ()>),
    Write(ArcRwLockWriteGuard<RawRwLock, ()>),
}

/// Held locks of one operation. Released on drop.
pub struct RecordGuards {
    guards: Vec<Guard>,
}

impl RecordGuards {
    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    pub fn writes(&self) -> usize {
        self.guards.iter().filter(|g| matches!(g, Guard::Write(_))).count()
    }
}

/// Lazily populated map of per-record locks. Entries are never removed;
/// the table grows with the number of distinct records ever touched.
#[derive(Debug, Default)]
pub struct LockTable {
    locks: DashMap<RecordKey, Arc<RwLock<()>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until every record in `set` is held with its declared access.
    pub fn acquire(&self, set: &RecordSet) -> RecordGuards {
        let mut guards = Vec::with_capacity(set.len());
        // BTreeMap iteration is key order: the global acquisition order.
        for (key, access) in &set.keys {
            // Clone the Arc out so no DashMap shard lock is held while blocking.
            let lock = self.locks.entry(*key).or_default().clone();
            guards.push(match access {
                Access::Read => Guard::Read(lock.read_arc()),
                Access::Write => Guard::Write(lock.write_arc()),
            });
        }
        RecordGuards { guards }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
