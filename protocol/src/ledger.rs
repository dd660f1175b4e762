//! # Value Ledger
//!
//! The ledger is the external primitive that actually moves value. The
//! lending core only ever asks it one thing: move `amount` of `asset` from
//! one account to another, all or nothing.
//!
//! [`InMemoryLedger`] is a reference implementation for tests and the
//! scenario runner. Production deployments plug in their own settlement
//! layer behind [`ValueLedger`].

use std::collections::HashMap;

use parking_lot::Mutex;
use thiserror::Error;

use crate::identity::{AccountId, AssetId};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors reported by the value ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The source account does not hold enough of the asset.
    #[error("insufficient funds in {account}: available {available}, requested {requested} ({asset})")]
    InsufficientFunds {
        account: AccountId,
        asset: AssetId,
        available: u64,
        requested: u64,
    },

    /// Crediting the destination would overflow its balance.
    #[error("balance overflow in {account} ({asset})")]
    Overflow { account: AccountId, asset: AssetId },

    /// The settlement layer refused the transfer for its own reasons.
    #[error("transfer rejected: {0}")]
    Rejected(String),
}

// ---------------------------------------------------------------------------
// ValueLedger
// ---------------------------------------------------------------------------

/// Atomic value transfer between accounts.
///
/// Implementations must either apply the whole transfer or leave both
/// balances untouched.
pub trait ValueLedger: Send + Sync {
    fn transfer(
        &self,
        asset: &AssetId,
        from: &AccountId,
        to: &AccountId,
        amount: u64,
    ) -> Result<(), LedgerError>;

    fn balance_of(&self, asset: &AssetId, account: &AccountId) -> u64;
}

// ---------------------------------------------------------------------------
// InMemoryLedger
// ---------------------------------------------------------------------------

/// Single-writer in-memory ledger.
///
/// One mutex guards every balance, which makes each transfer trivially
/// atomic. Reads take the same lock; this ledger is for simulation, not
/// throughput.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    balances: Mutex<HashMap<(AssetId, AccountId), u64>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create value out of thin air. Test and simulation funding only.
    pub fn mint(&self, asset: &AssetId, account: &AccountId, amount: u64) -> Result<(), LedgerError> {
        let mut balances = self.balances.lock();
        let entry = balances.entry((asset.clone(), account.clone())).or_insert(0);
        *entry = entry.checked_add(amount).ok_or_else(|| LedgerError::Overflow {
            account: account.clone(),
            asset: asset.clone(),
        })?;
        Ok(())
    }

    /// Sum of all balances of `asset`. Transfers never change it.
    pub fn total_supply(&self, asset: &AssetId) -> u128 {
        self.balances
            .lock()
            .iter()
            .filter(|((a, _), _)| a == asset)
            .map(|(_, v)| u128::from(*v))
            .sum()
    }
}

impl ValueLedger for InMemoryLedger {
    fn transfer(
        &self,
        asset: &AssetId,
        from: &AccountId,
        to: &AccountId,
        amount: u64,
    ) -> Result<(), LedgerError> {
        if amount == 0 || from == to {
            return Ok(());
        }

        let mut balances = self.balances.lock();

        let from_key = (asset.clone(), from.clone());
        let to_key = (asset.clone(), to.clone());

        let available = balances.get(&from_key).copied().unwrap_or(0);
        if available < amount {
            return Err(LedgerError::InsufficientFunds {
                account: from.clone(),
                asset: asset.clone(),
                available,
                requested: amount,
            });
        }

        let current_to = balances.get(&to_key).copied().unwrap_or(0);
        let new_to = current_to.checked_add(amount).ok_or_else(|| LedgerError::Overflow {
            account: to.clone(),
            asset: asset.clone(),
        })?;

        balances.insert(from_key, available - amount);
        balances.insert(to_key, new_to);
        Ok(())
    }

    fn balance_of(&self, asset: &AssetId, account: &AccountId) -> u64 {
        self.balances
            .lock()
            .get(&(asset.clone(), account.clone()))
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usdc() -> AssetId {
        AssetId::new("USDC")
    }

    fn acct(s: &str) -> AccountId {
        AccountId::new(s)
    }

    #[test]
    fn transfer_moves_value() {
        let ledger = InMemoryLedger::new();
        ledger.mint(&usdc(), &acct("alice"), 1_000).unwrap();

        ledger.transfer(&usdc(), &acct("alice"), &acct("bob"), 400).unwrap();

        assert_eq!(ledger.balance_of(&usdc(), &acct("alice")), 600);
        assert_eq!(ledger.balance_of(&usdc(), &acct("bob")), 400);
        assert_eq!(ledger.total_supply(&usdc()), 1_000);
    }

    #[test]
    fn insufficient_funds_leaves_balances_untouched() {
        let ledger = InMemoryLedger::new();
        ledger.mint(&usdc(), &acct("alice"), 100).unwrap();

        let err = ledger
            .transfer(&usdc(), &acct("alice"), &acct("bob"), 101)
            .unwrap_err();

        assert!(matches!(err, LedgerError::InsufficientFunds { available: 100, requested: 101, .. }));
        assert_eq!(ledger.balance_of(&usdc(), &acct("alice")), 100);
        assert_eq!(ledger.balance_of(&usdc(), &acct("bob")), 0);
    }

    #[test]
    fn assets_are_separate() {
        let ledger = InMemoryLedger::new();
        ledger.mint(&usdc(), &acct("alice"), 100).unwrap();
        let eurc = AssetId::new("EURC");

        assert!(ledger.transfer(&eurc, &acct("alice"), &acct("bob"), 1).is_err());
    }

    #[test]
    fn overflow_is_rejected() {
        let ledger = InMemoryLedger::new();
        ledger.mint(&usdc(), &acct("alice"), 10).unwrap();
        ledger.mint(&usdc(), &acct("bob"), u64::MAX).unwrap();

        let err = ledger.transfer(&usdc(), &acct("alice"), &acct("bob"), 10).unwrap_err();
        assert!(matches!(err, LedgerError::Overflow { .. }));
        assert_eq!(ledger.balance_of(&usdc(), &acct("alice")), 10);
    }

    #[test]
    fn zero_and_self_transfers_are_noops() {
        let ledger = InMemoryLedger::new();
        ledger.transfer(&usdc(), &acct("a"), &acct("b"), 0).unwrap();
        ledger.mint(&usdc(), &acct("a"), 5).unwrap();
        ledger.transfer(&usdc(), &acct("a"), &acct("a"), 5).unwrap();
        assert_eq!(ledger.balance_of(&usdc(), &acct("a")), 5);
    }
}
