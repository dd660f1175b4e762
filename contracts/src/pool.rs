//! # Pool Accounting
//!
//! A lending pool is a share-based vault. Lenders deposit value and receive
//! shares; borrowers draw loans from the idle part of the vault.
//!
//! ## Balance Sheet
//!
//! ```text
//! available_liquidity   value sitting in the vault
//! total_deployed        principal currently lent out
//! interest_reserve      repaid interest not yet claimed (part of available)
//!
//! net_asset_value = available_liquidity + total_deployed - interest_reserve
//! share price     = net_asset_value / total_shares
//! ```
//!
//! Interest never touches the share price. Each repayment's interest is
//! spread over the shares outstanding at that moment through a scaled
//! interest-per-share accumulator; a deposit's claimable interest is
//! `shares * interest_per_share / SCALE - interest_debt`. Claims draw from
//! the reserve and burn no shares.
//!
//! The share price only ever moves on write-offs (down) and collateral
//! recoveries (up). Rounding in deposits and withdrawals always favours the
//! pool.

use microlend_protocol::config::{INTEREST_PER_SHARE_SCALE, MAX_BASE_RATE_BPS, MAX_POOL_NAME_LEN};
use microlend_protocol::identity::{AccountId, AssetId, Identity};
use microlend_protocol::keys::PoolId;
use serde::{Deserialize, Serialize};

use crate::error::{LendingError, LendingResult};

/// A lending pool for one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LendingPool {
    pub authority: Identity,
    pub asset: AssetId,
    pub name: String,
    pub base_rate_bps: u16,
    pub max_duration_days: u32,
    /// Ledger account holding the pool's value.
    pub vault: AccountId,
    pub total_shares: u64,
    pub available_liquidity: u64,
    pub total_deployed: u64,
    pub interest_reserve: u64,
    /// Interest per share, scaled by [`INTEREST_PER_SHARE_SCALE`].
    pub interest_per_share: u128,
    /// Interest and late fees received over the pool's life.
    pub total_interest_earned: u64,
    pub total_written_off: u64,
    pub total_recovered: u64,
    pub active_loans: u32,
    pub is_active: bool,
    pub created_at: i64,
}

/// A lender's position in a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LenderDeposit {
    pub lender: Identity,
    pub pool: PoolId,
    /// Cumulative value ever deposited.
    pub amount_deposited: u64,
    pub shares: u64,
    /// Accumulator checkpoint: interest already accounted for.
    pub interest_debt: u64,
    pub interest_claimed: u64,
    pub deposited_at: i64,
    pub last_interest_calculation: i64,
}

impl LenderDeposit {
    pub fn new(lender: Identity, pool: PoolId, now: i64) -> Self {
        Self {
            lender,
            pool,
            amount_deposited: 0,
            shares: 0,
            interest_debt: 0,
            interest_claimed: 0,
            deposited_at: now,
            last_interest_calculation: now,
        }
    }
}

/// Value a withdrawal pays out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Withdrawal {
    /// Share redemption at the current price.
    pub redemption: u64,
    /// Interest settled alongside the redemption.
    pub interest: u64,
}

impl Withdrawal {
    pub fn total(&self) -> u64 {
        self.redemption.saturating_add(self.interest)
    }
}

impl LendingPool {
    /// Build a validated, empty pool.
    pub fn new(
        authority: Identity,
        asset: AssetId,
        name: String,
        base_rate_bps: u16,
        max_duration_days: u32,
        vault: AccountId,
        now: i64,
    ) -> LendingResult<Self> {
        if name.is_empty() || name.len() > MAX_POOL_NAME_LEN {
            return Err(LendingError::invalid(
                "name",
                format!("length {} outside 1..={MAX_POOL_NAME_LEN}", name.len()),
            ));
        }
        if base_rate_bps > MAX_BASE_RATE_BPS {
            return Err(LendingError::invalid(
                "base_rate_bps",
                format!("{base_rate_bps} exceeds {MAX_BASE_RATE_BPS}"),
            ));
        }
        if max_duration_days == 0 {
            return Err(LendingError::invalid("max_duration_days", "must be positive"));
        }

        Ok(Self {
            authority,
            asset,
            name,
            base_rate_bps,
            max_duration_days,
            vault,
            total_shares: 0,
            available_liquidity: 0,
            total_deployed: 0,
            interest_reserve: 0,
            interest_per_share: 0,
            total_interest_earned: 0,
            total_written_off: 0,
            total_recovered: 0,
            active_loans: 0,
            is_active: true,
            created_at: now,
        })
    }

    pub fn ensure_active(&self) -> LendingResult<()> {
        if !self.is_active {
            return Err(LendingError::PoolInactive);
        }
        Ok(())
    }

    pub fn set_active(&mut self, caller: &Identity, active: bool) -> LendingResult<()> {
        if caller != &self.authority {
            return Err(LendingError::Unauthorized {
                caller: caller.clone(),
                action: "pause or resume the pool",
            });
        }
        self.is_active = active;
        Ok(())
    }

    pub fn net_asset_value(&self) -> LendingResult<u64> {
        self.available_liquidity
            .checked_add(self.total_deployed)
            .and_then(|v| v.checked_sub(self.interest_reserve))
            .ok_or(LendingError::Overflow("net asset value"))
    }

    /// Idle principal: what loans and redemptions may draw on.
    pub fn lendable_liquidity(&self) -> u64 {
        self.available_liquidity.saturating_sub(self.interest_reserve)
    }

    /// Value of `shares` at the current price. Rounds down.
    pub fn share_value(&self, shares: u64) -> LendingResult<u64> {
        if self.total_shares == 0 {
            return Ok(0);
        }
        mul_div(shares, self.net_asset_value()?, self.total_shares, "share value")
    }

    /// Shares minted for a deposit of `amount`. 1:1 into an empty pool.
    pub fn shares_for_deposit(&self, amount: u64) -> LendingResult<u64> {
        if self.total_shares == 0 {
            return Ok(amount);
        }
        let nav = self.net_asset_value()?;
        if nav == 0 {
            return Err(LendingError::state("pool", "insolvent", "positive net asset value"));
        }
        mul_div(amount, self.total_shares, nav, "share mint")
    }

    /// Interest claimable by `deposit` right now.
    pub fn pending_interest(&self, deposit: &LenderDeposit) -> LendingResult<u64> {
        let accrued = self.accrued_for(deposit.shares)?;
        Ok(accrued.saturating_sub(deposit.interest_debt).min(self.interest_reserve))
    }

    fn accrued_for(&self, shares: u64) -> LendingResult<u64> {
        let scaled = u128::from(shares)
            .checked_mul(self.interest_per_share)
            .ok_or(LendingError::Overflow("interest accrual"))?;
        u64::try_from(scaled / INTEREST_PER_SHARE_SCALE).map_err(|_| LendingError::Overflow("interest accrual"))
    }

    /// Credit a deposit. Returns the shares minted.
    ///
    /// # Errors
    ///
    /// [`LendingError::InvalidAmount`] for a zero amount or a deposit too
    /// small to mint a single share.
    pub fn deposit(&mut self, deposit: &mut LenderDeposit, amount: u64, now: i64) -> LendingResult<u64> {
        if amount == 0 {
            return Err(LendingError::invalid("amount", "must be positive"));
        }
        let minted = self.shares_for_deposit(amount)?;
        if minted == 0 {
            return Err(LendingError::invalid("amount", "too small to mint a share"));
        }
        let debt = self.accrued_for(minted)?;

        self.available_liquidity = self
            .available_liquidity
            .checked_add(amount)
            .ok_or(LendingError::Overflow("available_liquidity"))?;
        self.total_shares = self
            .total_shares
            .checked_add(minted)
            .ok_or(LendingError::Overflow("total_shares"))?;

        deposit.amount_deposited = deposit
            .amount_deposited
            .checked_add(amount)
            .ok_or(LendingError::Overflow("amount_deposited"))?;
        deposit.shares = deposit
            .shares
            .checked_add(minted)
            .ok_or(LendingError::Overflow("shares"))?;
        deposit.interest_debt = deposit
            .interest_debt
            .checked_add(debt)
            .ok_or(LendingError::Overflow("interest_debt"))?;
        if deposit.shares == minted {
            deposit.last_interest_calculation = now;
        }
        Ok(minted)
    }

    /// Burn `shares` and settle the deposit's pending interest.
    ///
    /// # Errors
    ///
    /// [`LendingError::InvalidAmount`] unless `0 < shares <= deposit.shares`;
    /// [`LendingError::InsufficientLiquidity`] if idle principal cannot
    /// cover the redemption.
    pub fn withdraw(&mut self, deposit: &mut LenderDeposit, shares: u64, now: i64) -> LendingResult<Withdrawal> {
        if shares == 0 || shares > deposit.shares {
            return Err(LendingError::invalid(
                "shares",
                format!("{shares} outside 1..={}", deposit.shares),
            ));
        }

        let interest = self.pending_interest(deposit)?;
        let redemption = self.share_value(shares)?;
        let lendable = self.lendable_liquidity();
        if redemption > lendable {
            return Err(LendingError::InsufficientLiquidity {
                requested: redemption,
                available: lendable,
            });
        }

        let payout = redemption
            .checked_add(interest)
            .ok_or(LendingError::Overflow("withdrawal"))?;
        self.available_liquidity -= payout;
        self.interest_reserve -= interest;
        self.total_shares -= shares;

        deposit.shares -= shares;
        deposit.interest_debt = self.accrued_for(deposit.shares)?;
        deposit.interest_claimed = deposit
            .interest_claimed
            .checked_add(interest)
            .ok_or(LendingError::Overflow("interest_claimed"))?;
        deposit.last_interest_calculation = now;

        Ok(Withdrawal { redemption, interest })
    }

    /// Pay out the deposit's pending interest without burning shares.
    pub fn claim(&mut self, deposit: &mut LenderDeposit, now: i64) -> LendingResult<u64> {
        let interest = self.pending_interest(deposit)?;
        if interest == 0 {
            return Err(LendingError::NothingToClaim);
        }

        self.available_liquidity -= interest;
        self.interest_reserve -= interest;

        deposit.interest_debt = self.accrued_for(deposit.shares)?;
        deposit.interest_claimed = deposit
            .interest_claimed
            .checked_add(interest)
            .ok_or(LendingError::Overflow("interest_claimed"))?;
        deposit.last_interest_calculation = now;
        Ok(interest)
    }

    /// Move `principal` from idle liquidity to deployed capital.
    pub fn disburse(&mut self, principal: u64) -> LendingResult<()> {
        let lendable = self.lendable_liquidity();
        if principal > lendable {
            return Err(LendingError::InsufficientLiquidity {
                requested: principal,
                available: lendable,
            });
        }
        self.total_deployed = self
            .total_deployed
            .checked_add(principal)
            .ok_or(LendingError::Overflow("total_deployed"))?;
        self.available_liquidity -= principal;
        self.active_loans = self
            .active_loans
            .checked_add(1)
            .ok_or(LendingError::Overflow("active_loans"))?;
        Ok(())
    }

    /// Book a repayment: principal returns to idle liquidity, `earnings`
    /// (interest plus late fee) go to the reserve and the accumulator.
    pub fn repay(&mut self, principal: u64, earnings: u64) -> LendingResult<()> {
        let inflow = principal
            .checked_add(earnings)
            .ok_or(LendingError::Overflow("repayment"))?;
        let deployed = self
            .total_deployed
            .checked_sub(principal)
            .ok_or(LendingError::Overflow("total_deployed"))?;
        let available = self
            .available_liquidity
            .checked_add(inflow)
            .ok_or(LendingError::Overflow("available_liquidity"))?;
        let reserve = self
            .interest_reserve
            .checked_add(earnings)
            .ok_or(LendingError::Overflow("interest_reserve"))?;
        let earned = self
            .total_interest_earned
            .checked_add(earnings)
            .ok_or(LendingError::Overflow("total_interest_earned"))?;

        if self.total_shares > 0 {
            let delta = u128::from(earnings) * INTEREST_PER_SHARE_SCALE / u128::from(self.total_shares);
            self.interest_per_share = self
                .interest_per_share
                .checked_add(delta)
                .ok_or(LendingError::Overflow("interest_per_share"))?;
        }

        self.total_deployed = deployed;
        self.available_liquidity = available;
        self.interest_reserve = reserve;
        self.total_interest_earned = earned;
        self.active_loans = self.active_loans.saturating_sub(1);
        Ok(())
    }

    /// Write off a liquidated loan's principal, crediting whatever the
    /// collateral recovered.
    pub fn write_off(&mut self, principal: u64, recovered: u64) -> LendingResult<()> {
        let deployed = self
            .total_deployed
            .checked_sub(principal)
            .ok_or(LendingError::Overflow("total_deployed"))?;
        let available = self
            .available_liquidity
            .checked_add(recovered)
            .ok_or(LendingError::Overflow("available_liquidity"))?;
        let written_off = self
            .total_written_off
            .checked_add(principal)
            .ok_or(LendingError::Overflow("total_written_off"))?;
        let total_recovered = self
            .total_recovered
            .checked_add(recovered)
            .ok_or(LendingError::Overflow("total_recovered"))?;

        self.total_deployed = deployed;
        self.available_liquidity = available;
        self.total_written_off = written_off;
        self.total_recovered = total_recovered;
        self.active_loans = self.active_loans.saturating_sub(1);
        Ok(())
    }
}

fn mul_div(a: u64, b: u64, c: u64, what: &'static str) -> LendingResult<u64> {
    if c == 0 {
        return Err(LendingError::Overflow(what));
    }
    let v = u128::from(a) * u128::from(b) / u128::from(c);
    u64::try_from(v).map_err(|_| LendingError::Overflow(what))
}
