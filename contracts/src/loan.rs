//! # Loan State Machine
//!
//! ```text
//!                 ┌──────────► Rejected / Cancelled
//!                 │
//! Requested ──► Approved ──► Disbursed ──┬──► Repaid        (now <= due)
//!                                        ├──► RepaidLate    (due < now < due + grace)
//!                                        └──► Liquidated    (now >= disbursed + duration + grace)
//! ```
//!
//! Interest is simple and lazy: a pure function of principal, rate and
//! whole days elapsed, evaluated against the clock at quote time. Nothing
//! accrues in the background.
//!
//! A loan lives at the `(borrower, pool)` key. A new request may overwrite
//! it once it is terminal, or once a pending request has gone stale.

use microlend_protocol::clock::days_between;
use microlend_protocol::config::{BPS_DENOMINATOR, DAYS_PER_YEAR, MAX_PURPOSE_LEN, SECONDS_PER_DAY};
use microlend_protocol::identity::Identity;
use microlend_protocol::keys::PoolId;
use serde::{Deserialize, Serialize};

use crate::error::{LendingError, LendingResult};
use crate::platform::Platform;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Lifecycle status of a loan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoanStatus {
    /// Submitted by the borrower, awaiting review.
    Requested,
    /// Approved by the platform authority, awaiting funds.
    Approved,
    /// Principal sent to the borrower. Repayment is expected.
    Disbursed,
    /// Repaid in full on or before the due date.
    Repaid,
    /// Repaid in full inside the grace window.
    RepaidLate,
    /// Written off after the grace window expired.
    Liquidated,
    /// Declined by the platform authority.
    Rejected,
    /// Withdrawn by the borrower before disbursement.
    Cancelled,
}

impl LoanStatus {
    /// No further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoanStatus::Repaid
                | LoanStatus::RepaidLate
                | LoanStatus::Liquidated
                | LoanStatus::Rejected
                | LoanStatus::Cancelled
        )
    }

    /// Not yet funded; may still be rejected or cancelled.
    pub fn is_pending(&self) -> bool {
        matches!(self, LoanStatus::Requested | LoanStatus::Approved)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Requested => "Requested",
            LoanStatus::Approved => "Approved",
            LoanStatus::Disbursed => "Disbursed",
            LoanStatus::Repaid => "Repaid",
            LoanStatus::RepaidLate => "RepaidLate",
            LoanStatus::Liquidated => "Liquidated",
            LoanStatus::Rejected => "Rejected",
            LoanStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What backs a loan. A classification only; recovery is delegated to
/// [`crate::collateral::CollateralRecovery`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CollateralType {
    None,
    Social,
    Asset,
    Income,
    Group,
}

impl TryFrom<u8> for CollateralType {
    type Error = LendingError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(CollateralType::None),
            1 => Ok(CollateralType::Social),
            2 => Ok(CollateralType::Asset),
            3 => Ok(CollateralType::Income),
            4 => Ok(CollateralType::Group),
            other => Err(LendingError::invalid("collateral", format!("unknown collateral type {other}"))),
        }
    }
}

/// Everything owed to close a loan at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepaymentQuote {
    pub principal: u64,
    pub interest: u64,
    pub late_fee: u64,
    /// Charged on top and routed to the treasury.
    pub platform_fee: u64,
    pub days_elapsed: u64,
    pub days_overdue: u64,
    /// The quote falls inside the grace window.
    pub late: bool,
}

impl RepaymentQuote {
    /// The pool's share: principal, interest and late fee.
    pub fn to_pool(&self) -> u64 {
        self.principal + self.interest + self.late_fee
    }

    /// Interest and late fee, distributed to lenders.
    pub fn earnings(&self) -> u64 {
        self.interest + self.late_fee
    }

    /// The exact amount the borrower must tender.
    pub fn total(&self) -> u64 {
        self.to_pool() + self.platform_fee
    }
}

/// A loan record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub borrower: Identity,
    pub pool: PoolId,
    pub principal: u64,
    pub duration_days: u32,
    pub grace_period_days: u8,
    pub late_fee_bps: u16,
    pub purpose: String,
    pub collateral: CollateralType,
    pub status: LoanStatus,
    /// Fixed at disbursement. Zero before.
    pub interest_rate_bps: u16,
    pub requested_at: i64,
    pub approved_at: Option<i64>,
    pub disbursed_at: Option<i64>,
    pub due_at: Option<i64>,
    pub closed_at: Option<i64>,
    pub interest_accrued: u64,
    pub amount_repaid: u64,
    pub payments_count: u32,
}

/// Loan terms as submitted by the borrower.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanTerms {
    pub principal: u64,
    pub duration_days: u32,
    pub purpose: String,
    pub collateral: CollateralType,
}

// ---------------------------------------------------------------------------
// Interest math
// ---------------------------------------------------------------------------

/// `principal * rate_bps * days / (365 * 10_000)`, rounded down.
pub fn simple_interest(principal: u64, rate_bps: u16, days: u64) -> LendingResult<u64> {
    prorate(principal, rate_bps, days, "interest")
}

/// Annualized late fee on `outstanding` for `days_overdue` days.
pub fn late_fee(outstanding: u64, late_fee_bps: u16, days_overdue: u64) -> LendingResult<u64> {
    prorate(outstanding, late_fee_bps, days_overdue, "late fee")
}

fn prorate(amount: u64, rate_bps: u16, days: u64, what: &'static str) -> LendingResult<u64> {
    let numerator = u128::from(amount)
        .checked_mul(u128::from(rate_bps))
        .and_then(|v| v.checked_mul(u128::from(days)))
        .ok_or(LendingError::Overflow(what))?;
    let value = numerator / (u128::from(DAYS_PER_YEAR) * u128::from(BPS_DENOMINATOR));
    u64::try_from(value).map_err(|_| LendingError::Overflow(what))
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

impl Loan {
    /// Open a new request.
    ///
    /// # Errors
    ///
    /// [`LendingError::InvalidAmount`] for a duration outside
    /// `1..=max_duration_days` or an oversized purpose.
    pub fn request(
        borrower: Identity,
        pool: PoolId,
        terms: LoanTerms,
        max_duration_days: u32,
        grace_period_days: u8,
        late_fee_bps: u16,
        now: i64,
    ) -> LendingResult<Self> {
        if terms.duration_days == 0 || terms.duration_days > max_duration_days {
            return Err(LendingError::invalid(
                "duration_days",
                format!("{} outside 1..={max_duration_days}", terms.duration_days),
            ));
        }
        if terms.purpose.len() > MAX_PURPOSE_LEN {
            return Err(LendingError::invalid(
                "purpose",
                format!("{} bytes exceeds {MAX_PURPOSE_LEN}", terms.purpose.len()),
            ));
        }

        Ok(Self {
            borrower,
            pool,
            principal: terms.principal,
            duration_days: terms.duration_days,
            grace_period_days,
            late_fee_bps,
            purpose: terms.purpose,
            collateral: terms.collateral,
            status: LoanStatus::Requested,
            interest_rate_bps: 0,
            requested_at: now,
            approved_at: None,
            disbursed_at: None,
            due_at: None,
            closed_at: None,
            interest_accrued: 0,
            amount_repaid: 0,
            payments_count: 0,
        })
    }

    /// Whether a fresh request may overwrite this record.
    pub fn can_be_superseded(&self, now: i64, request_expiry_secs: i64) -> bool {
        self.status.is_terminal()
            || (self.status.is_pending() && now.saturating_sub(self.requested_at) >= request_expiry_secs)
    }

    fn expect(&self, expected: LoanStatus) -> LendingResult<()> {
        if self.status != expected {
            return Err(LendingError::state("loan", self.status, expected.as_str()));
        }
        Ok(())
    }

    pub fn approve(&mut self, now: i64) -> LendingResult<()> {
        self.expect(LoanStatus::Requested)?;
        self.status = LoanStatus::Approved;
        self.approved_at = Some(now);
        Ok(())
    }

    pub fn reject(&mut self, now: i64) -> LendingResult<()> {
        self.close_pending(LoanStatus::Rejected, now)
    }

    pub fn cancel(&mut self, now: i64) -> LendingResult<()> {
        self.close_pending(LoanStatus::Cancelled, now)
    }

    fn close_pending(&mut self, to: LoanStatus, now: i64) -> LendingResult<()> {
        if !self.status.is_pending() {
            return Err(LendingError::state("loan", self.status, "Requested or Approved"));
        }
        self.status = to;
        self.closed_at = Some(now);
        Ok(())
    }

    /// Fix the rate and start the clock.
    pub fn disburse(&mut self, interest_rate_bps: u16, now: i64) -> LendingResult<()> {
        self.expect(LoanStatus::Approved)?;
        let term = i64::from(self.duration_days)
            .checked_mul(SECONDS_PER_DAY)
            .and_then(|secs| now.checked_add(secs))
            .ok_or(LendingError::Overflow("due date"))?;
        self.status = LoanStatus::Disbursed;
        self.interest_rate_bps = interest_rate_bps;
        self.disbursed_at = Some(now);
        self.due_at = Some(term);
        Ok(())
    }

    fn disbursed_at(&self) -> LendingResult<i64> {
        self.expect(LoanStatus::Disbursed)?;
        self.disbursed_at
            .ok_or_else(|| LendingError::state("loan", "Disbursed without timestamp", "Disbursed"))
    }

    fn grace_secs(&self) -> i64 {
        i64::from(self.grace_period_days) * SECONDS_PER_DAY
    }

    /// First instant a repayment is refused: `due + grace`.
    pub fn repayment_closes_at(&self) -> LendingResult<i64> {
        let disbursed = self.disbursed_at()?;
        i64::from(self.duration_days)
            .checked_mul(SECONDS_PER_DAY)
            .and_then(|term| term.checked_add(self.grace_secs()))
            .and_then(|window| disbursed.checked_add(window))
            .ok_or(LendingError::Overflow("repayment window"))
    }

    /// Earliest instant liquidation is permitted:
    /// `disbursed_at + (duration + grace) * 86400`.
    pub fn liquidation_deadline(&self) -> LendingResult<i64> {
        self.repayment_closes_at()
    }

    /// Price a full repayment at `now`.
    ///
    /// # Errors
    ///
    /// [`LendingError::InvalidState`] unless the loan is `Disbursed` and
    /// the grace window is still open.
    pub fn quote(&self, now: i64, platform: &Platform) -> LendingResult<RepaymentQuote> {
        let disbursed = self.disbursed_at()?;
        let closes = self.repayment_closes_at()?;
        if now >= closes {
            return Err(LendingError::RepaymentWindowClosed { closed_at: closes });
        }
        let due = self.due_at.unwrap_or(closes - self.grace_secs());

        let days_elapsed = days_between(disbursed, now);
        let interest = simple_interest(self.principal, self.interest_rate_bps, days_elapsed)?;

        let late = now > due;
        let days_overdue = if late { days_between(due, now) } else { 0 };
        let outstanding = self
            .principal
            .checked_add(interest)
            .ok_or(LendingError::Overflow("outstanding"))?;
        let late_fee = late_fee(outstanding, self.late_fee_bps, days_overdue)?;

        let to_pool = outstanding
            .checked_add(late_fee)
            .ok_or(LendingError::Overflow("repayment"))?;
        let platform_fee = platform.fee_for(to_pool)?;
        if to_pool.checked_add(platform_fee).is_none() {
            return Err(LendingError::Overflow("repayment"));
        }

        Ok(RepaymentQuote {
            principal: self.principal,
            interest,
            late_fee,
            platform_fee,
            days_elapsed,
            days_overdue,
            late,
        })
    }

    /// Close the loan against a settled quote.
    pub fn settle(&mut self, quote: &RepaymentQuote, now: i64) -> LendingResult<()> {
        self.expect(LoanStatus::Disbursed)?;
        self.status = if quote.late {
            LoanStatus::RepaidLate
        } else {
            LoanStatus::Repaid
        };
        self.interest_accrued = quote.earnings();
        self.amount_repaid = self
            .amount_repaid
            .checked_add(quote.total())
            .ok_or(LendingError::Overflow("amount_repaid"))?;
        self.payments_count = self.payments_count.saturating_add(1);
        self.closed_at = Some(now);
        Ok(())
    }

    /// Mark the loan defaulted.
    ///
    /// # Errors
    ///
    /// [`LendingError::NotYetLiquidatable`] before the deadline.
    pub fn liquidate(&mut self, now: i64) -> LendingResult<()> {
        let deadline = self.liquidation_deadline()?;
        if now < deadline {
            return Err(LendingError::NotYetLiquidatable { deadline, now });
        }
        self.status = LoanStatus::Liquidated;
        self.closed_at = Some(now);
        Ok(())
    }
}
