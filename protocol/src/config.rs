//! # Protocol Configuration & Constants
//!
//! Every magic number of the lending ledger lives here. Hard limits that
//! protect storage and arithmetic are `const`s; economic knobs that an
//! operator may tune per deployment live in [`ProtocolParams`].
//!
//! All monetary values are `u64` minor units of a pool's asset. All rates
//! are basis points (1 bp = 0.01%). Durations are whole days, timestamps are
//! `i64` seconds since the UNIX epoch.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Units
// ---------------------------------------------------------------------------

/// Seconds in one day. Loan durations and grace periods are stored in days
/// and converted with this factor when compared against the clock.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Days per year used by simple-interest and late-fee proration.
pub const DAYS_PER_YEAR: u64 = 365;

/// Basis-point denominator. 10_000 bps = 100%.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Fixed-point scale of the pool's interest-per-share accumulator.
pub const INTEREST_PER_SHARE_SCALE: u128 = 1_000_000_000;

// ---------------------------------------------------------------------------
// Platform & pool limits
// ---------------------------------------------------------------------------

/// Upper bound for the platform fee.
pub const MAX_PLATFORM_FEE_BPS: u16 = 10_000;

/// Upper bound for a pool's base interest rate (50% APR).
pub const MAX_BASE_RATE_BPS: u16 = 5_000;

/// Maximum pool name length in bytes.
pub const MAX_POOL_NAME_LEN: usize = 50;

/// Maximum loan purpose length in bytes.
pub const MAX_PURPOSE_LEN: usize = 100;

// ---------------------------------------------------------------------------
// Reputation
// ---------------------------------------------------------------------------

/// Lowest credit score. New profiles start here.
pub const MIN_CREDIT_SCORE: u16 = 300;

/// Highest credit score.
pub const MAX_CREDIT_SCORE: u16 = 850;

/// Upper bound for attestation scores and transaction-history weights.
pub const MAX_ATTESTATION_SCORE: u16 = 1_000;

/// Maximum attestation note length in bytes.
pub const MAX_ATTESTATION_NOTE_LEN: usize = 500;

// ---------------------------------------------------------------------------
// Tunable parameters
// ---------------------------------------------------------------------------

/// Rate premium applied when a borrower's credit score is below `below_score`.
///
/// Tiers are evaluated in order; the first match wins.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreTier {
    pub below_score: u16,
    pub premium_bps: u16,
}

/// Rate premium applied when a loan's duration exceeds `above_days`.
///
/// Tiers are evaluated in order; the first match wins.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationTier {
    pub above_days: u32,
    pub premium_bps: u16,
}

/// Minimum credit score required to borrow up to `max_ratio_bps` of the
/// platform's maximum loan amount.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredScoreTier {
    pub max_ratio_bps: u64,
    pub required_score: u16,
}

/// Economic parameters of a deployment.
///
/// `Default` reproduces the launch configuration. Operators override it by
/// deserializing a JSON document; missing fields fall back to the defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolParams {
    /// Days after the due date during which a late repayment is still
    /// accepted and liquidation is not yet permitted.
    pub grace_period_days: u8,

    /// Annualized late fee charged on the outstanding amount for every day
    /// past the due date.
    pub late_fee_bps: u16,

    /// Requested or approved loans older than this can be superseded by a
    /// fresh request on the same (borrower, pool) key.
    pub request_expiry_days: u32,

    /// Credit-score premium curve.
    pub score_tiers: Vec<ScoreTier>,

    /// Duration premium curve.
    pub duration_tiers: Vec<DurationTier>,

    /// Ceiling for the effective loan rate.
    pub max_effective_rate_bps: u16,

    /// Score gate by loan size. The last tier applies to every larger ratio.
    pub required_score_tiers: Vec<RequiredScoreTier>,

    /// Score required when the amount exceeds every `required_score_tiers`
    /// ratio.
    pub top_required_score: u16,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            grace_period_days: 7,
            late_fee_bps: 500,
            request_expiry_days: 30,
            score_tiers: vec![
                ScoreTier { below_score: 500, premium_bps: 500 },
                ScoreTier { below_score: 650, premium_bps: 300 },
                ScoreTier { below_score: 750, premium_bps: 100 },
            ],
            duration_tiers: vec![
                DurationTier { above_days: 365, premium_bps: 200 },
                DurationTier { above_days: 180, premium_bps: 100 },
            ],
            max_effective_rate_bps: 5_000,
            required_score_tiers: vec![
                RequiredScoreTier { max_ratio_bps: 1_000, required_score: 300 },
                RequiredScoreTier { max_ratio_bps: 3_000, required_score: 450 },
                RequiredScoreTier { max_ratio_bps: 6_000, required_score: 600 },
                RequiredScoreTier { max_ratio_bps: 8_000, required_score: 700 },
            ],
            top_required_score: 800,
        }
    }
}

impl ProtocolParams {
    /// Parse parameters from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Grace period in seconds.
    pub fn grace_period_secs(&self) -> i64 {
        i64::from(self.grace_period_days) * SECONDS_PER_DAY
    }

    /// Request expiry in seconds.
    pub fn request_expiry_secs(&self) -> i64 {
        i64::from(self.request_expiry_days) * SECONDS_PER_DAY
    }

    /// Effective annual rate for a borrower with `credit_score` taking a loan
    /// of `duration_days` from a pool with `base_rate_bps`.
    ///
    /// Lower scores and longer durations cost more. The result never exceeds
    /// `max_effective_rate_bps`.
    pub fn effective_rate_bps(&self, base_rate_bps: u16, credit_score: u16, duration_days: u32) -> u16 {
        let mut rate = base_rate_bps;

        if let Some(tier) = self.score_tiers.iter().find(|t| credit_score < t.below_score) {
            rate = rate.saturating_add(tier.premium_bps);
        }

        if let Some(tier) = self.duration_tiers.iter().find(|t| duration_days > t.above_days) {
            rate = rate.saturating_add(tier.premium_bps);
        }

        rate.min(self.max_effective_rate_bps)
    }

    /// Minimum credit score needed to borrow `amount` when the platform
    /// allows at most `max_loan_amount`.
    pub fn required_credit_score(&self, amount: u64, max_loan_amount: u64) -> u16 {
        if max_loan_amount == 0 {
            return self.top_required_score;
        }
        let ratio_bps = (u128::from(amount) * u128::from(BPS_DENOMINATOR)) / u128::from(max_loan_amount);

        self.required_score_tiers
            .iter()
            .find(|t| ratio_bps <= u128::from(t.max_ratio_bps))
            .map(|t| t.required_score)
            .unwrap_or(self.top_required_score)
    }
}
