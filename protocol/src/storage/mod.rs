//! # Storage Module
//!
//! Key-value persistence for ledger records. Every record lives under its
//! deterministic [`RecordKey`](crate::keys::RecordKey); there are no
//! secondary indexes.
//!
//! ## Architecture
//!
//! ```text
//! store.rs   — RecordStore trait, WriteBatch, bincode codec helpers
//! memory.rs  — In-memory BTreeMap store (tests, simulations)
//! db.rs      — sled-backed persistent store
//! ```
//!
//! ## Atomicity
//!
//! Writers stage all record changes of one operation into a [`WriteBatch`]
//! and hand it to [`RecordStore::apply`]. Both backends apply a batch as a
//! single atomic unit: either every record lands or none does.
//!
//! Records are encoded with bincode. JSON is for humans; bincode is for
//! storage.

pub mod db;
pub mod memory;
pub mod store;

pub use db::SledStore;
pub use memory::MemoryStore;
pub use store::{decode, encode, RecordStore, StoreError, StoreResult, WriteBatch};
