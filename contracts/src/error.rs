//! # Lending Errors
//!
//! Every operation fails with a [`LendingError`]. The variants carry the
//! detail an operator needs to read a log line; [`ErrorKind`] collapses them
//! into the coarse classes a caller branches on.

use microlend_protocol::identity::Identity;
use microlend_protocol::ledger::LedgerError;
use microlend_protocol::storage::StoreError;
use thiserror::Error;

/// Coarse error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Unauthorized,
    InvalidState,
    InvalidAmount,
    InsufficientLiquidity,
    InsufficientFunds,
    NotYetLiquidatable,
    AlreadyExists,
    NotFound,
    NothingToClaim,
    Overflow,
    Storage,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Errors that can occur during lending operations.
#[derive(Debug, Error)]
pub enum LendingError {
    /// The caller lacks the role this action requires.
    #[error("unauthorized: {caller} may not {action}")]
    Unauthorized {
        /// Identity that attempted the action.
        caller: Identity,
        /// What was attempted.
        action: &'static str,
    },

    /// The record is not in a state that allows this operation.
    #[error("invalid state transition: {entity} is {current}, expected {expected}")]
    InvalidState {
        /// Record type, e.g. `"loan"`.
        entity: &'static str,
        /// Its current status.
        current: String,
        /// The status required for this operation.
        expected: &'static str,
    },

    #[error("platform is paused")]
    PlatformInactive,

    #[error("pool is paused")]
    PoolInactive,

    /// The loan is past its grace window and can only be liquidated.
    #[error("repayment window closed at {closed_at}")]
    RepaymentWindowClosed { closed_at: i64 },

    /// An amount or parameter falls outside its permitted range.
    #[error("invalid {field}: {reason}")]
    InvalidAmount {
        /// Name of the offending input.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// A repayment did not match the amount owed.
    #[error("repayment mismatch: owed {owed}, offered {offered}")]
    RepaymentMismatch { owed: u64, offered: u64 },

    /// The borrower's credit score is below what the loan size requires.
    #[error("credit score {score} below required {required}")]
    CreditScoreTooLow { score: u16, required: u16 },

    /// The pool cannot cover the requested movement from idle liquidity.
    #[error("insufficient liquidity: requested {requested}, available {available}")]
    InsufficientLiquidity { requested: u64, available: u64 },

    /// The value ledger refused a transfer.
    #[error("transfer failed: {0}")]
    Transfer(#[from] LedgerError),

    /// The loan's liquidation deadline has not been reached.
    #[error("loan not liquidatable until {deadline} (now {now})")]
    NotYetLiquidatable { deadline: i64, now: i64 },

    #[error("{0} already exists")]
    AlreadyExists(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("no interest to claim")]
    NothingToClaim,

    /// A share or interest computation would overflow.
    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl LendingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LendingError::Unauthorized { .. } => ErrorKind::Unauthorized,
            LendingError::InvalidState { .. }
            | LendingError::PlatformInactive
            | LendingError::PoolInactive
            | LendingError::RepaymentWindowClosed { .. } => ErrorKind::InvalidState,
            LendingError::InvalidAmount { .. }
            | LendingError::RepaymentMismatch { .. }
            | LendingError::CreditScoreTooLow { .. } => ErrorKind::InvalidAmount,
            LendingError::InsufficientLiquidity { .. } => ErrorKind::InsufficientLiquidity,
            LendingError::Transfer(LedgerError::Overflow { .. }) => ErrorKind::Overflow,
            LendingError::Transfer(_) => ErrorKind::InsufficientFunds,
            LendingError::NotYetLiquidatable { .. } => ErrorKind::NotYetLiquidatable,
            LendingError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            LendingError::NotFound(_) => ErrorKind::NotFound,
            LendingError::NothingToClaim => ErrorKind::NothingToClaim,
            LendingError::Overflow(_) => ErrorKind::Overflow,
            LendingError::Storage(_) => ErrorKind::Storage,
        }
    }

    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        LendingError::InvalidAmount {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn state(entity: &'static str, current: impl ToString, expected: &'static str) -> Self {
        LendingError::InvalidState {
            entity,
            current: current.to_string(),
            expected,
        }
    }
}

pub type LendingResult<T> = Result<T, LendingError>;
