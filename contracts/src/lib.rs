// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Micro-Lending Ledger
//!
//! The lending core: pools that lenders fund, loans that borrowers draw,
//! and the credit profiles that decide who may borrow how much.
//!
//! - **Platform** — singleton configuration, governance and statistics.
//! - **Pool** — share-based vault accounting with an interest accumulator.
//! - **Loan** — the request → approval → disbursement → closure lifecycle.
//! - **Reputation** — profiles, social attestations, transaction history
//!   and the credit score derived from them.
//! - **Collateral** — pluggable recovery on liquidation.
//! - **Engine** — runs each operation as one atomic, locked transaction.
//!
//! ## Design Principles
//!
//! 1. All monetary operations check for overflow. Shares, interest and fees
//!    are computed in `u128` and narrowed with a checked conversion.
//! 2. State transitions are explicit enum variants, not boolean flags.
//! 3. Every check runs before any effect. Value moves only once the whole
//!    operation has validated.
//! 4. Every record is serde-serializable and lives at a deterministic key.

pub mod collateral;
pub mod engine;
pub mod error;
pub mod loan;
pub mod locks;
pub mod platform;
pub mod pool;
pub mod reputation;

pub use engine::{HistoryEntry, LendingEngine, Liquidation};
pub use error::{ErrorKind, LendingError, LendingResult};
pub use loan::{CollateralType, Loan, LoanStatus, LoanTerms, RepaymentQuote};
pub use platform::Platform;
pub use pool::{LenderDeposit, LendingPool, Withdrawal};
pub use reputation::{AttestationCategory, TransactionCategory, UserProfile};
