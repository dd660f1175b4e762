//! # Reputation Engine
//!
//! Per-user credit profile plus the two kinds of off-loan evidence that
//! feed it: social attestations and a transaction history.
//!
//! ## Score Model
//!
//! | Component              | Points                                  |
//! |------------------------|-----------------------------------------|
//! | Base                   | 300                                     |
//! | Payment ratio          | up to 400 (late repayments count half)  |
//! | Repayment ratio        | up to 300 (repaid / borrowed, capped)   |
//! | Defaults               | −50 each                                |
//! | Experience             | +50 above 10 loans, +50 more above 50   |
//! | Attestation average    | up to 50                                |
//! | History-weight average | up to 50                                |
//!
//! The result is always clamped to `[MIN_CREDIT_SCORE, MAX_CREDIT_SCORE]`.
//!
//! Attestations and history records live under their own keys. The profile
//! keeps running sums of both so that a recomputation reads exactly one
//! record. It also keeps the score and expiry of every attestation still in
//! force, so an expired vouch drops out of the sums at the next
//! recomputation.

use microlend_protocol::config::{
    MAX_ATTESTATION_NOTE_LEN, MAX_ATTESTATION_SCORE, MAX_CREDIT_SCORE, MIN_CREDIT_SCORE,
};
use microlend_protocol::identity::Identity;
use serde::{Deserialize, Serialize};

use crate::error::{LendingError, LendingResult};

// ---------------------------------------------------------------------------
// Score weights
// ---------------------------------------------------------------------------

const PAYMENT_RATIO_POINTS: u64 = 400;
const REPAYMENT_RATIO_POINTS: u64 = 300;
const DEFAULT_PENALTY: u64 = 50;
const EXPERIENCE_BONUS: u64 = 50;
const EXPERIENCE_TIERS: [u64; 2] = [10, 50];
const ATTESTATION_POINTS: u64 = 50;
const HISTORY_POINTS: u64 = 50;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Relationship between an attester and the attested user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttestationCategory {
    Community,
    Employer,
    Family,
    Business,
    Education,
    Reference,
}

impl TryFrom<u8> for AttestationCategory {
    type Error = LendingError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(AttestationCategory::Community),
            1 => Ok(AttestationCategory::Employer),
            2 => Ok(AttestationCategory::Family),
            3 => Ok(AttestationCategory::Business),
            4 => Ok(AttestationCategory::Education),
            5 => Ok(AttestationCategory::Reference),
            other => Err(LendingError::invalid("category", format!("unknown attestation category {other}"))),
        }
    }
}

/// Kind of off-platform financial activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionCategory {
    MobileMoney,
    Remittance,
    Merchant,
    Utility,
    Savings,
    Investment,
    Loan,
    Repayment,
}

/// A vouch from one user for another. One per (attester, subject); a second
/// attestation from the same attester replaces the first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialAttestation {
    pub attester: Identity,
    pub subject: Identity,
    pub category: AttestationCategory,
    /// 0..=1000.
    pub score: u16,
    pub note: String,
    pub created_at: i64,
    pub expires_at: Option<i64>,
}

impl SocialAttestation {
    /// Build a validated attestation.
    ///
    /// # Errors
    ///
    /// [`LendingError::InvalidAmount`] for an out-of-range score, an
    /// oversized note or an expiry that is not in the future.
    /// [`LendingError::InvalidState`] for a self-attestation.
    pub fn new(
        attester: Identity,
        subject: Identity,
        category: AttestationCategory,
        score: u16,
        note: String,
        expires_at: Option<i64>,
        now: i64,
    ) -> LendingResult<Self> {
        if attester == subject {
            return Err(LendingError::state("attestation", "self-issued", "issued by another user"));
        }
        if score > MAX_ATTESTATION_SCORE {
            return Err(LendingError::invalid(
                "score",
                format!("{score} exceeds {MAX_ATTESTATION_SCORE}"),
            ));
        }
        if note.len() > MAX_ATTESTATION_NOTE_LEN {
            return Err(LendingError::invalid(
                "note",
                format!("{} bytes exceeds {MAX_ATTESTATION_NOTE_LEN}", note.len()),
            ));
        }
        if let Some(expiry) = expires_at {
            if expiry <= now {
                return Err(LendingError::invalid("expires_at", "must be in the future"));
            }
        }

        Ok(Self {
            attester,
            subject,
            category,
            score,
            note,
            created_at: now,
            expires_at,
        })
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.map_or(false, |expiry| now >= expiry)
    }
}

/// The part of a [`SocialAttestation`] the profile needs to score it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationWeight {
    pub attester: Identity,
    pub score: u16,
    pub expires_at: Option<i64>,
}

impl AttestationWeight {
    pub fn is_live(&self, now: i64) -> bool {
        self.expires_at.map_or(true, |expiry| now < expiry)
    }
}

/// One append-only entry of a user's off-platform transaction history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionHistoryRecord {
    pub subject: Identity,
    /// Position in the subject's history, starting at 0.
    pub sequence: u32,
    pub category: TransactionCategory,
    pub amount: u64,
    pub counterparty: Option<Identity>,
    /// When the activity happened, as reported by the authority.
    pub timestamp: i64,
    pub frequency_score: u16,
    pub consistency_score: u16,
    pub recorded_at: i64,
}

impl TransactionHistoryRecord {
    /// Score contribution of this record: the mean of its two weights.
    pub fn weight(&self) -> u16 {
        ((u32::from(self.frequency_score) + u32::from(self.consistency_score)) / 2) as u16
    }
}

/// Check a history weight against [`MAX_ATTESTATION_SCORE`].
pub fn validate_weight(field: &'static str, value: u16) -> LendingResult<()> {
    if value > MAX_ATTESTATION_SCORE {
        return Err(LendingError::invalid(
            field,
            format!("{value} exceeds {MAX_ATTESTATION_SCORE}"),
        ));
    }
    Ok(())
}

/// A user's credit profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub owner: Identity,
    pub credit_score: u16,
    pub successful_loans: u32,
    pub late_loans: u32,
    pub defaulted_loans: u32,
    pub active_loans: u32,
    pub total_borrowed: u64,
    /// Everything repaid, principal plus interest and late fees.
    pub total_repaid: u64,
    /// Next history sequence number. Never decreases.
    pub transaction_history_count: u32,
    /// Live attestations only. Derived from `attestations`.
    pub attestation_count: u32,
    pub attestation_score_sum: u64,
    /// One entry per attester, pruned of expired vouches on recomputation.
    pub attestations: Vec<AttestationWeight>,
    pub history_weight_sum: u64,
    pub created_at: i64,
    pub last_updated: i64,
}

impl UserProfile {
    pub fn new(owner: Identity, now: i64) -> Self {
        Self {
            owner,
            credit_score: MIN_CREDIT_SCORE,
            successful_loans: 0,
            late_loans: 0,
            defaulted_loans: 0,
            active_loans: 0,
            total_borrowed: 0,
            total_repaid: 0,
            transaction_history_count: 0,
            attestation_count: 0,
            attestation_score_sum: 0,
            attestations: Vec::new(),
            history_weight_sum: 0,
            created_at: now,
            last_updated: now,
        }
    }

    /// Loans that reached a terminal disbursed outcome.
    pub fn closed_loans(&self) -> u64 {
        u64::from(self.successful_loans) + u64::from(self.late_loans) + u64::from(self.defaulted_loans)
    }

    pub fn record_disbursement(&mut self, principal: u64, now: i64) -> LendingResult<()> {
        self.total_borrowed = self
            .total_borrowed
            .checked_add(principal)
            .ok_or(LendingError::Overflow("total_borrowed"))?;
        self.active_loans = self
            .active_loans
            .checked_add(1)
            .ok_or(LendingError::Overflow("active_loans"))?;
        self.last_updated = now;
        Ok(())
    }

    /// Close an active loan as repaid. `late` marks a repayment inside the
    /// grace window.
    pub fn record_repayment(&mut self, paid: u64, late: bool, now: i64) -> LendingResult<()> {
        self.total_repaid = self
            .total_repaid
            .checked_add(paid)
            .ok_or(LendingError::Overflow("total_repaid"))?;
        let counter = if late {
            &mut self.late_loans
        } else {
            &mut self.successful_loans
        };
        *counter = counter.checked_add(1).ok_or(LendingError::Overflow("loan counter"))?;
        self.active_loans = self.active_loans.saturating_sub(1);
        self.recompute_score(now);
        Ok(())
    }

    pub fn record_default(&mut self, now: i64) -> LendingResult<()> {
        self.defaulted_loans = self
            .defaulted_loans
            .checked_add(1)
            .ok_or(LendingError::Overflow("defaulted_loans"))?;
        self.active_loans = self.active_loans.saturating_sub(1);
        self.recompute_score(now);
        Ok(())
    }

    /// Fold a new or replacing attestation into the running sums. Returns
    /// whether a live attestation from the same attester was replaced.
    pub fn apply_attestation(
        &mut self,
        attester: &Identity,
        score: u16,
        expires_at: Option<i64>,
        now: i64,
    ) -> bool {
        self.expire_attestations(now);
        let entry = AttestationWeight {
            attester: attester.clone(),
            score,
            expires_at,
        };
        let replaced = match self.attestations.iter_mut().find(|w| &w.attester == attester) {
            Some(slot) => {
                *slot = entry;
                true
            }
            None => {
                self.attestations.push(entry);
                false
            }
        };
        self.refresh_attestation_totals();
        self.last_updated = now;
        replaced
    }

    /// Drop attestations whose expiry is at or before `now`. Returns how
    /// many were dropped.
    pub fn expire_attestations(&mut self, now: i64) -> usize {
        let before = self.attestations.len();
        self.attestations.retain(|w| w.is_live(now));
        let dropped = before - self.attestations.len();
        if dropped > 0 {
            self.refresh_attestation_totals();
        }
        dropped
    }

    fn refresh_attestation_totals(&mut self) {
        self.attestation_count = u32::try_from(self.attestations.len()).unwrap_or(u32::MAX);
        self.attestation_score_sum = self.attestations.iter().map(|w| u64::from(w.score)).sum();
    }

    /// Reserve the next history sequence number and fold in its weight.
    pub fn append_history(&mut self, weight: u16, now: i64) -> LendingResult<u32> {
        let sequence = self.transaction_history_count;
        self.transaction_history_count = sequence
            .checked_add(1)
            .ok_or(LendingError::Overflow("transaction_history_count"))?;
        self.history_weight_sum = self
            .history_weight_sum
            .checked_add(u64::from(weight))
            .ok_or(LendingError::Overflow("history_weight_sum"))?;
        self.last_updated = now;
        Ok(sequence)
    }

    /// Recompute and store the credit score, dropping expired attestations
    /// first. Never fails.
    pub fn recompute_score(&mut self, now: i64) -> u16 {
        self.expire_attestations(now);
        self.credit_score = compute_credit_score(self);
        self.last_updated = now;
        self.credit_score
    }
}

/// The score model applied to a profile snapshot.
pub fn compute_credit_score(profile: &UserProfile) -> u16 {
    let mut score = u64::from(MIN_CREDIT_SCORE);

    let closed = profile.closed_loans();
    if closed > 0 {
        // Half credit for late repayments: count in half-loans.
        let weighted_on_time =
            2 * u64::from(profile.successful_loans) + u64::from(profile.late_loans);
        score += weighted_on_time * PAYMENT_RATIO_POINTS / (2 * closed);

        if profile.total_borrowed > 0 {
            let repaid = profile.total_repaid.min(profile.total_borrowed);
            score += (u128::from(repaid) * u128::from(REPAYMENT_RATIO_POINTS)
                / u128::from(profile.total_borrowed)) as u64;
        }

        score = score.saturating_sub(u64::from(profile.defaulted_loans) * DEFAULT_PENALTY);

        for tier in EXPERIENCE_TIERS {
            if closed > tier {
                score += EXPERIENCE_BONUS;
            }
        }
    }

    if profile.attestation_count > 0 {
        let avg = profile.attestation_score_sum / u64::from(profile.attestation_count);
        score += avg.min(u64::from(MAX_ATTESTATION_SCORE)) * ATTESTATION_POINTS
            / u64::from(MAX_ATTESTATION_SCORE);
    }

    if profile.transaction_history_count > 0 {
        let avg = profile.history_weight_sum / u64::from(profile.transaction_history_count);
        score += avg.min(u64::from(MAX_ATTESTATION_SCORE)) * HISTORY_POINTS
            / u64::from(MAX_ATTESTATION_SCORE);
    }

    score.clamp(u64::from(MIN_CREDIT_SCORE), u64::from(MAX_CREDIT_SCORE)) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> UserProfile {
        UserProfile::new(Identity::new("alice"), 0)
    }

    #[test]
    fn new_profile_starts_at_floor() {
        let p = profile();
        assert_eq!(p.credit_score, MIN_CREDIT_SCORE);
        assert_eq!(compute_credit_score(&p), MIN_CREDIT_SCORE);
    }

    #[test]
    fn perfect_record_scores_high() {
        let mut p = profile();
        p.record_disbursement(1_000, 0).unwrap();
        p.record_repayment(1_050, false, 1).unwrap();
        // 300 + 400 + 300
        assert_eq!(p.credit_score, MAX_CREDIT_SCORE);
        assert_eq!(p.active_loans, 0);
    }

    #[test]
    fn late_repayment_counts_half() {
        let mut p = profile();
        p.record_disbursement(1_000, 0).unwrap();
        p.record_repayment(1_000, true, 1).unwrap();
        // 300 + 200 + 300
        assert_eq!(p.credit_score, 800);
        assert_eq!(p.late_loans, 1);
        assert_eq!(p.successful_loans, 0);
    }

    #[test]
    fn default_drops_score_to_floor() {
        let mut p = profile();
        p.record_disbursement(1_000, 0).unwrap();
        p.record_default(1).unwrap();
        assert_eq!(p.credit_score, MIN_CREDIT_SCORE);
        assert_eq!(p.defaulted_loans, 1);
    }

    #[test]
    fn mixed_history_is_penalized() {
        let mut p = profile();
        p.record_disbursement(1_000, 0).unwrap();
        p.record_repayment(1_000, false, 1).unwrap();
        p.record_disbursement(1_000, 2).unwrap();
        p.record_default(3).unwrap();
        // 300 + 200 + 150 - 50
        assert_eq!(p.credit_score, 600);
    }

    #[test]
    fn attestations_and_history_add_up_to_fifty_each() {
        let mut p = profile();
        p.apply_attestation(&Identity::new("bob"), 1_000, None, 0);
        p.append_history(500, 0).unwrap();
        assert_eq!(p.recompute_score(1), 300 + 50 + 25);
    }

    #[test]
    fn replacing_attestation_adjusts_sum() {
        let mut p = profile();
        let bob = Identity::new("bob");
        assert!(!p.apply_attestation(&bob, 800, None, 0));
        assert!(p.apply_attestation(&bob, 200, None, 1));
        assert_eq!(p.attestation_count, 1);
        assert_eq!(p.attestation_score_sum, 200);
    }

    #[test]
    fn expired_attestation_leaves_the_score() {
        let mut p = profile();
        p.apply_attestation(&Identity::new("bob"), 1_000, Some(100), 0);
        p.apply_attestation(&Identity::new("carol"), 600, None, 0);
        assert_eq!(p.recompute_score(99), 300 + 40);

        assert_eq!(p.recompute_score(100), 300 + 30);
        assert_eq!(p.attestation_count, 1);
        assert_eq!(p.attestation_score_sum, 600);
        assert_eq!(p.attestations.len(), 1);
    }

    #[test]
    fn reattesting_after_expiry_counts_as_new() {
        let mut p = profile();
        let bob = Identity::new("bob");
        p.apply_attestation(&bob, 900, Some(10), 0);
        assert!(!p.apply_attestation(&bob, 500, None, 10));
        assert_eq!(p.attestation_count, 1);
        assert_eq!(p.attestation_score_sum, 500);
    }

    #[test]
    fn history_sequence_is_monotonic() {
        let mut p = profile();
        assert_eq!(p.append_history(10, 0).unwrap(), 0);
        assert_eq!(p.append_history(10, 0).unwrap(), 1);
        assert_eq!(p.transaction_history_count, 2);
    }

    #[test]
    fn score_stays_within_bounds_for_extremes() {
        let mut p = profile();
        p.successful_loans = u32::MAX;
        p.total_borrowed = 1;
        p.total_repaid = u64::MAX;
        p.attestation_count = 1;
        p.attestation_score_sum = u64::MAX;
        p.transaction_history_count = 1;
        p.history_weight_sum = u64::MAX;
        assert_eq!(compute_credit_score(&p), MAX_CREDIT_SCORE);

        let mut q = profile();
        q.defaulted_loans = u32::MAX;
        assert_eq!(compute_credit_score(&q), MIN_CREDIT_SCORE);
    }

    #[test]
    fn attestation_validation() {
        let a = Identity::new("a");
        let b = Identity::new("b");
        let cat = AttestationCategory::Community;

        assert!(SocialAttestation::new(a.clone(), a.clone(), cat, 10, String::new(), None, 0).is_err());
        assert!(SocialAttestation::new(a.clone(), b.clone(), cat, 1_001, String::new(), None, 0).is_err());
        assert!(SocialAttestation::new(a.clone(), b.clone(), cat, 10, "x".repeat(501), None, 0).is_err());
        assert!(SocialAttestation::new(a.clone(), b.clone(), cat, 10, String::new(), Some(100), 100).is_err());

        let ok = SocialAttestation::new(a, b, cat, 1_000, "x".repeat(500), Some(200), 100).unwrap();
        assert!(!ok.is_expired(199));
        assert!(ok.is_expired(200));
    }

    #[test]
    fn attestation_category_tags() {
        assert_eq!(AttestationCategory::try_from(1).unwrap(), AttestationCategory::Employer);
        assert!(AttestationCategory::try_from(6).is_err());
    }

    #[test]
    fn history_weight_is_mean() {
        let rec = TransactionHistoryRecord {
            subject: Identity::new("a"),
            sequence: 0,
            category: TransactionCategory::MobileMoney,
            amount: 1,
            counterparty: None,
            timestamp: 0,
            frequency_score: 1_000,
            consistency_score: 501,
            recorded_at: 0,
        };
        assert_eq!(rec.weight(), 750);
        assert!(validate_weight("frequency_score", 1_001).is_err());
    }
}
