//! # Platform Registry
//!
//! The singleton configuration record: who governs the deployment, where
//! fees go, how large a loan may be and whether the platform is accepting
//! new business at all. It also keeps lifetime lending statistics.
//!
//! The record is loaded by the engine inside every transaction that needs
//! it. There is no ambient global.

use microlend_protocol::config::{BPS_DENOMINATOR, MAX_PLATFORM_FEE_BPS};
use microlend_protocol::identity::Identity;
use serde::{Deserialize, Serialize};

use crate::error::{LendingError, LendingResult};

/// Lifetime counters. Only ever incremented.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformStats {
    /// Loans that reached `Disbursed`.
    pub total_loans_issued: u64,
    /// Sum of disbursed principal.
    pub total_volume: u64,
    /// Loans that were liquidated.
    pub total_defaults: u64,
}

/// The platform singleton.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    /// Governs the platform and approves, rejects and disburses loans.
    pub authority: Identity,
    /// Receives platform fees on repayment.
    pub treasury: Identity,
    /// Fee charged on top of each repayment, in basis points.
    pub platform_fee_bps: u16,
    pub min_loan_amount: u64,
    pub max_loan_amount: u64,
    pub is_active: bool,
    pub created_at: i64,
    pub stats: PlatformStats,
}

impl Platform {
    /// Build a validated platform record. It starts active.
    ///
    /// # Errors
    ///
    /// Returns [`LendingError::InvalidAmount`] if the fee exceeds 10 000 bps,
    /// `max_loan_amount` is zero, or `min_loan_amount > max_loan_amount`.
    pub fn new(
        authority: Identity,
        treasury: Identity,
        platform_fee_bps: u16,
        max_loan_amount: u64,
        min_loan_amount: u64,
        now: i64,
    ) -> LendingResult<Self> {
        validate_fee(platform_fee_bps)?;
        validate_bounds(min_loan_amount, max_loan_amount)?;

        Ok(Self {
            authority,
            treasury,
            platform_fee_bps,
            min_loan_amount,
            max_loan_amount,
            is_active: true,
            created_at: now,
            stats: PlatformStats::default(),
        })
    }

    pub fn ensure_authority(&self, caller: &Identity, action: &'static str) -> LendingResult<()> {
        if caller != &self.authority {
            return Err(LendingError::Unauthorized {
                caller: caller.clone(),
                action,
            });
        }
        Ok(())
    }

    pub fn ensure_active(&self) -> LendingResult<()> {
        if !self.is_active {
            return Err(LendingError::PlatformInactive);
        }
        Ok(())
    }

    /// Check `amount` against the platform loan bounds (inclusive).
    pub fn ensure_loan_amount(&self, amount: u64) -> LendingResult<()> {
        if amount < self.min_loan_amount || amount > self.max_loan_amount {
            return Err(LendingError::invalid(
                "amount",
                format!(
                    "{amount} outside loan bounds [{}, {}]",
                    self.min_loan_amount, self.max_loan_amount
                ),
            ));
        }
        Ok(())
    }

    pub fn set_active(&mut self, caller: &Identity, active: bool) -> LendingResult<()> {
        self.ensure_authority(caller, "pause or resume the platform")?;
        self.is_active = active;
        Ok(())
    }

    pub fn update_loan_bounds(&mut self, caller: &Identity, min: u64, max: u64) -> LendingResult<()> {
        self.ensure_authority(caller, "change loan bounds")?;
        validate_bounds(min, max)?;
        self.min_loan_amount = min;
        self.max_loan_amount = max;
        Ok(())
    }

    pub fn update_fee(&mut self, caller: &Identity, fee_bps: u16) -> LendingResult<()> {
        self.ensure_authority(caller, "change the platform fee")?;
        validate_fee(fee_bps)?;
        self.platform_fee_bps = fee_bps;
        Ok(())
    }

    /// Platform fee owed on a repayment of `amount`. Rounds down.
    pub fn fee_for(&self, amount: u64) -> LendingResult<u64> {
        let fee = u128::from(amount) * u128::from(self.platform_fee_bps) / u128::from(BPS_DENOMINATOR);
        u64::try_from(fee).map_err(|_| LendingError::Overflow("platform fee"))
    }

    pub fn record_disbursement(&mut self, principal: u64) -> LendingResult<()> {
        self.stats.total_loans_issued = self
            .stats
            .total_loans_issued
            .checked_add(1)
            .ok_or(LendingError::Overflow("total_loans_issued"))?;
        self.stats.total_volume = self
            .stats
            .total_volume
            .checked_add(principal)
            .ok_or(LendingError::Overflow("total_volume"))?;
        Ok(())
    }

    pub fn record_default(&mut self) -> LendingResult<()> {
        self.stats.total_defaults = self
            .stats
            .total_defaults
            .checked_add(1)
            .ok_or(LendingError::Overflow("total_defaults"))?;
        Ok(())
    }
}

fn validate_fee(fee_bps: u16) -> LendingResult<()> {
    if fee_bps > MAX_PLATFORM_FEE_BPS {
        return Err(LendingError::invalid(
            "platform_fee_bps",
            format!("{fee_bps} exceeds {MAX_PLATFORM_FEE_BPS}"),
        ));
    }
    Ok(())
}

fn validate_bounds(min: u64, max: u64) -> LendingResult<()> {
    if max == 0 {
        return Err(LendingError::invalid("max_loan_amount", "must be positive"));
    }
    if min > max {
        return Err(LendingError::invalid(
            "min_loan_amount",
            format!("{min} exceeds max {max}"),
        ));
    }
    Ok(())
}
