// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Micro-Lending Protocol — Core Primitives
//!
//! The foundation the lending contracts stand on. Nothing in here knows what
//! a loan is; it knows how to name records, where to keep them, how to move
//! value and what time it is.
//!
//! ## Architecture
//!
//! - **config** — Protocol constants and tunable economic parameters.
//! - **identity** — Typed addresses for participants, assets and accounts.
//! - **keys** — Deterministic BLAKE3 record keys. The key *is* the index.
//! - **clock** — Trusted time source. No timers, only comparisons.
//! - **ledger** — The atomic value-transfer primitive the core consumes.
//! - **storage** — Key-value persistence with atomic write batches.
//!
//! ## Design Philosophy
//!
//! 1. Integers only. Every amount is `u64` minor units, every rate is basis
//!    points, and the arithmetic is checked.
//! 2. Deterministic addressing. The same inputs always reach the same
//!    record; duplicates are impossible by construction.
//! 3. Time is an input, never a side effect.

pub mod clock;
pub mod config;
pub mod identity;
pub mod keys;
pub mod ledger;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ProtocolParams;
pub use identity::{AccountId, AssetId, Identity};
pub use keys::{PoolId, RecordKey, RecordKind};
pub use ledger::{InMemoryLedger, LedgerError, ValueLedger};
pub use storage::{MemoryStore, RecordStore, SledStore, StoreError, WriteBatch};
