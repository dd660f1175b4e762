//! # Collateral Recovery
//!
//! A loan's [`CollateralType`] is a label. What, if anything, can be
//! recovered when a loan is liquidated is decided by a
//! [`CollateralRecovery`] strategy registered for that label. The default
//! registry has no strategies: liquidation writes the principal off in full.
//!
//! A strategy only says where recovered value sits and how much of it to
//! take. The engine moves it into the pool vault inside the liquidation
//! transaction.

use std::collections::HashMap;
use std::sync::Arc;

use microlend_protocol::config::BPS_DENOMINATOR;
use microlend_protocol::identity::{AccountId, AssetId};
use microlend_protocol::ledger::ValueLedger;

use crate::loan::{CollateralType, Loan};

/// Value to pull into the pool vault on liquidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recovery {
    pub source: AccountId,
    pub amount: u64,
}

/// Recovery policy for one collateral type.
pub trait CollateralRecovery: Send + Sync {
    /// Decide what to recover for a defaulted `loan`. The amount must be
    /// available in `source` at call time.
    ///
    /// Every liquidation holds the platform record for writing until it
    /// commits, so a balance read here is still current when the transfer
    /// runs, as long as `source` is only debited by liquidations.
    fn recover(&self, loan: &Loan, asset: &AssetId, ledger: &dyn ValueLedger) -> Option<Recovery>;
}

/// Covers up to `coverage_bps` of the principal from a guarantee account,
/// capped by what the account holds.
#[derive(Debug, Clone)]
pub struct GuaranteeFund {
    pub account: AccountId,
    pub coverage_bps: u16,
}

impl CollateralRecovery for GuaranteeFund {
    fn recover(&self, loan: &Loan, asset: &AssetId, ledger: &dyn ValueLedger) -> Option<Recovery> {
        let coverage = u128::from(loan.principal) * u128::from(self.coverage_bps) / u128::from(BPS_DENOMINATOR);
        let wanted = u64::try_from(coverage).unwrap_or(u64::MAX).min(loan.principal);
        let amount = wanted.min(ledger.balance_of(asset, &self.account));
        (amount > 0).then(|| Recovery {
            source: self.account.clone(),
            amount,
        })
    }
}

/// Strategies keyed by collateral type.
#[derive(Clone, Default)]
pub struct CollateralRegistry {
    strategies: HashMap<CollateralType, Arc<dyn CollateralRecovery>>,
}

impl CollateralRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, collateral: CollateralType, strategy: Arc<dyn CollateralRecovery>) {
        self.strategies.insert(collateral, strategy);
    }

    pub fn with(mut self, collateral: CollateralType, strategy: Arc<dyn CollateralRecovery>) -> Self {
        self.register(collateral, strategy);
        self
    }

    pub fn recover(&self, loan: &Loan, asset: &AssetId, ledger: &dyn ValueLedger) -> Option<Recovery> {
        self.strategies
            .get(&loan.collateral)
            .and_then(|strategy| strategy.recover(loan, asset, ledger))
    }
}

impl std::fmt::Debug for CollateralRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.strategies.keys().collect();
        kinds.sort();
        f.debug_struct("CollateralRegistry").field("strategies", &kinds).finish()
    }
}
