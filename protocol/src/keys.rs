//! # Record Keys
//!
//! Every record in the ledger lives at a deterministic address derived from
//! its semantic identity. The loan of borrower `B` in pool `P` is always at
//! `RecordKey::loan(B, P)`; there is no index to keep in sync and no way to
//! create a second loan record for the same pair.
//!
//! Keys are BLAKE3 `derive_key` hashes. The context string is the record
//! kind, so a profile key and a loan key can never collide even when their
//! inputs are byte-identical. Components are length-prefixed before hashing
//! so that `("ab", "c")` and `("a", "bc")` land on different keys.
//!
//! ```text
//! platform      = derive_key("microlend/platform",    [])
//! pool          = derive_key("microlend/pool",        [authority, asset])
//! deposit       = derive_key("microlend/deposit",     [lender, pool])
//! loan          = derive_key("microlend/loan",        [borrower, pool])
//! profile       = derive_key("microlend/profile",     [owner])
//! attestation   = derive_key("microlend/attestation", [attester, subject])
//! history       = derive_key("microlend/history",     [subject, seq_be])
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::identity::{AccountId, AssetId, Identity};

/// Record kinds. The discriminant doubles as the first byte of the stored
/// key so that a raw store dump can be grouped by kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecordKind {
    Platform = 1,
    Pool = 2,
    Deposit = 3,
    Loan = 4,
    Profile = 5,
    Attestation = 6,
    History = 7,
}

impl RecordKind {
    fn context(self) -> &'static str {
        match self {
            RecordKind::Platform => "microlend/platform",
            RecordKind::Pool => "microlend/pool",
            RecordKind::Deposit => "microlend/deposit",
            RecordKind::Loan => "microlend/loan",
            RecordKind::Profile => "microlend/profile",
            RecordKind::Attestation => "microlend/attestation",
            RecordKind::History => "microlend/history",
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(RecordKind::Platform),
            2 => Some(RecordKind::Pool),
            3 => Some(RecordKind::Deposit),
            4 => Some(RecordKind::Loan),
            5 => Some(RecordKind::Profile),
            6 => Some(RecordKind::Attestation),
            7 => Some(RecordKind::History),
            _ => None,
        }
    }
}

/// Deterministic storage address of a record.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    kind: RecordKind,
    hash: [u8; 32],
}

/// Pools are referenced by their record key.
pub type PoolId = RecordKey;

impl RecordKey {
    fn derive(kind: RecordKind, parts: &[&[u8]]) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key(kind.context());
        for part in parts {
            hasher.update(&(part.len() as u64).to_be_bytes());
            hasher.update(part);
        }
        Self {
            kind,
            hash: *hasher.finalize().as_bytes(),
        }
    }

    /// The platform singleton.
    pub fn platform() -> Self {
        Self::derive(RecordKind::Platform, &[])
    }

    /// The pool owned by `authority` for `asset`.
    pub fn pool(authority: &Identity, asset: &AssetId) -> Self {
        Self::derive(
            RecordKind::Pool,
            &[authority.as_str().as_bytes(), asset.as_str().as_bytes()],
        )
    }

    /// A lender's position in a pool.
    pub fn deposit(lender: &Identity, pool: &PoolId) -> Self {
        Self::derive(RecordKind::Deposit, &[lender.as_str().as_bytes(), &pool.to_bytes()])
    }

    /// A borrower's loan slot in a pool.
    pub fn loan(borrower: &Identity, pool: &PoolId) -> Self {
        Self::derive(RecordKind::Loan, &[borrower.as_str().as_bytes(), &pool.to_bytes()])
    }

    /// A user's reputation profile.
    pub fn profile(owner: &Identity) -> Self {
        Self::derive(RecordKind::Profile, &[owner.as_str().as_bytes()])
    }

    /// The attestation `attester` issued about `subject`.
    pub fn attestation(attester: &Identity, subject: &Identity) -> Self {
        Self::derive(
            RecordKind::Attestation,
            &[attester.as_str().as_bytes(), subject.as_str().as_bytes()],
        )
    }

    /// The `seq`-th transaction-history record of `subject`.
    pub fn history(subject: &Identity, seq: u32) -> Self {
        Self::derive(
            RecordKind::History,
            &[subject.as_str().as_bytes(), &seq.to_be_bytes()],
        )
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    /// 33-byte storage encoding: kind tag followed by the hash.
    pub fn to_bytes(&self) -> [u8; 33] {
        let mut out = [0u8; 33];
        out[0] = self.kind as u8;
        out[1..].copy_from_slice(&self.hash);
        out
    }

    /// Inverse of [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 33 {
            return None;
        }
        let kind = RecordKind::from_tag(bytes[0])?;
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes[1..]);
        Some(Self { kind, hash })
    }

    /// Parse the hex form produced by `Display`.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        Self::from_bytes(&bytes)
    }

    /// The vault account that holds a pool's value. Only meaningful for
    /// pool keys.
    pub fn vault_account(&self) -> AccountId {
        AccountId::new(format!("vault:{}", hex::encode(self.hash)))
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.to_bytes()))
    }
}

impl fmt::Debug for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({}..)", self.kind, &hex::encode(&self.hash[..6]))
    }
}
