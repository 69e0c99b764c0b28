//! Typed engine errors.
//!
//! Every operation returns `Result<T, EngineError>`. Datastore failures
//! arrive as `anyhow::Error` from `esc-db` and are classified by the SQLSTATE
//! of the `sqlx::Error` in their chain: lock-wait timeouts, serialization
//! failures and deadlocks are [`EngineError::Retryable`], anything else is
//! [`EngineError::Fatal`]. The engine never retries on its own.

use esc_ledger::{LedgerError, PricingError};
use thiserror::Error;

use crate::state_machine::TransitionError;

/// SQLSTATEs that mean "the whole transaction was rolled back, try again".
const RETRYABLE_SQLSTATES: &[&str] = &[
    "40001", // serialization_failure
    "40P01", // deadlock_detected
    "55P03", // lock_not_available (lock_timeout)
];

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("insufficient funds: needed {needed}, available {available}")]
    InsufficientFunds { needed: i64, available: i64 },
    #[error("escrow empty: {0}")]
    EscrowEmpty(String),
    #[error("order missing: {0}")]
    OrderMissing(String),
    /// Lost a claim race. An expected outcome, not a fault.
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("validation failed: {0}")]
    ValidationFailed(String),
    #[error("retryable datastore failure: {0}")]
    Retryable(String),
    #[error("fatal: {0:#}")]
    Fatal(anyhow::Error),
}

impl EngineError {
    /// Stable upper-case name, for CLI output and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "NOT_FOUND",
            EngineError::InvalidState(_) => "INVALID_STATE",
            EngineError::Forbidden(_) => "FORBIDDEN",
            EngineError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            EngineError::EscrowEmpty(_) => "ESCROW_EMPTY",
            EngineError::OrderMissing(_) => "ORDER_MISSING",
            EngineError::Conflict(_) => "CONFLICT",
            EngineError::ValidationFailed(_) => "VALIDATION_FAILED",
            EngineError::Retryable(_) => "RETRYABLE",
            EngineError::Fatal(_) => "FATAL",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Retryable(_))
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        EngineError::ValidationFailed(msg.into())
    }
}

fn is_retryable_sqlx(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => db
            .code()
            .map(|c| RETRYABLE_SQLSTATES.contains(&c.as_ref()))
            .unwrap_or(false),
        _ => false,
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        let retryable = err
            .chain()
            .filter_map(|e| e.downcast_ref::<sqlx::Error>())
            .any(is_retryable_sqlx);
        if retryable {
            EngineError::Retryable(format!("{err:#}"))
        } else {
            EngineError::Fatal(err)
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::from(anyhow::Error::new(err))
    }
}

impl From<TransitionError> for EngineError {
    fn from(err: TransitionError) -> Self {
        EngineError::InvalidState(err.to_string())
    }
}

impl From<PricingError> for EngineError {
    fn from(err: PricingError) -> Self {
        EngineError::ValidationFailed(err.to_string())
    }
}

impl From<LedgerError> for EngineError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientFunds { needed, available } => {
                EngineError::InsufficientFunds { needed, available }
            }
            LedgerError::EscrowEmpty { ref service_code } => {
                EngineError::EscrowEmpty(service_code.clone())
            }
            LedgerError::OrderMissing { ref service_code } => {
                EngineError::OrderMissing(service_code.clone())
            }
            LedgerError::OrderSettled { .. } => EngineError::InvalidState(err.to_string()),
            LedgerError::NonPositiveAmount { .. } => EngineError::ValidationFailed(err.to_string()),
            // Integrity violations: the rows disagree with each other.
            LedgerError::AccountMismatch { .. }
            | LedgerError::FeeExceedsEscrow { .. }
            | LedgerError::Overflow => EngineError::Fatal(anyhow::Error::new(err)),
        }
    }
}
