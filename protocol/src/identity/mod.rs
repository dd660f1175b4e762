//! # Identity Module
//!
//! Names for the parties and value holders the ledger talks about.
//! Identities arrive already authenticated: signature verification and key
//! management live with the caller, so an [`Identity`] here is simply the
//! trusted address of whoever initiated an operation.
//!
//! - **Identity** — a participant (lender, borrower, attester, authority).
//! - **AssetId** — the asset a pool is denominated in.
//! - **AccountId** — a value-holding account in the external ledger. Every
//!   identity owns one account; every pool owns a vault account.

pub mod address;

pub use address::{AccountId, AssetId, Identity};
