//! Economy Error Types
//!
//! One taxonomy for every operation in the engine. Each variant is detected
//! inside the transaction and causes a full rollback, so no error kind ever
//! leaves partial writes behind.

use thiserror::Error;

/// Economy error kinds
///
/// Only `LockContention`, `Timeout` and `Storage` are safe to retry
/// automatically. The rest are terminal for the given input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EconomyError {
    // === Retryable ===
    #[error("Another request for this account is in progress")]
    LockContention,

    #[error("Transaction deadline exceeded")]
    Timeout,

    #[error("Storage error: {0}")]
    Storage(String),

    // === Idempotency ===
    #[error("Event already processed")]
    DuplicateEvent,

    // === Business rules ===
    #[error("Insufficient balance")]
    InsufficientBalance,

    #[error("Not found: {0}")]
    ResourceNotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Validation failed: {0}")]
    ValidationError(String),

    // === System ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EconomyError {
    pub fn not_found(what: impl Into<String>) -> Self {
        EconomyError::ResourceNotFound(what.into())
    }

    pub fn invalid_state(why: impl Into<String>) -> Self {
        EconomyError::InvalidState(why.into())
    }

    pub fn validation(why: impl Into<String>) -> Self {
        EconomyError::ValidationError(why.into())
    }

    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            EconomyError::LockContention => "LOCK_CONTENTION",
            EconomyError::Timeout => "TIMEOUT",
            EconomyError::Storage(_) => "STORAGE_ERROR",
            EconomyError::DuplicateEvent => "DUPLICATE_EVENT",
            EconomyError::InsufficientBalance => "INSUFFICIENT_BALANCE",
            EconomyError::ResourceNotFound(_) => "NOT_FOUND",
            EconomyError::InvalidState(_) => "INVALID_STATE",
            EconomyError::ValidationError(_) => "VALIDATION_ERROR",
            EconomyError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            EconomyError::ValidationError(_) => 400,
            EconomyError::ResourceNotFound(_) => 404,
            EconomyError::LockContention | EconomyError::DuplicateEvent => 409,
            EconomyError::InsufficientBalance | EconomyError::InvalidState(_) => 422,
            EconomyError::Internal(_) => 500,
            EconomyError::Storage(_) => 503,
            EconomyError::Timeout => 504,
        }
    }

    /// Whether a caller may blindly retry the same input
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EconomyError::LockContention | EconomyError::Timeout | EconomyError::Storage(_)
        )
    }

    /// Message safe to show to an external, untrusted caller (reward callbacks).
    ///
    /// Never reveals whether the failure was a bad signature, a duplicate, an
    /// unknown user or an internal fault.
    pub fn public_message(&self) -> &'static str {
        "callback rejected"
    }
}

/// SQLSTATE codes the engine reacts to
mod sqlstate {
    pub const UNIQUE_VIOLATION: &str = "23505";
    pub const LOCK_NOT_AVAILABLE: &str = "55P03";
    pub const QUERY_CANCELED: &str = "57014";
    pub const DEADLOCK_DETECTED: &str = "40P01";
    pub const SERIALIZATION_FAILURE: &str = "40001";
}

impl From<sqlx::Error> for EconomyError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e
            && let Some(code) = db_err.code()
        {
            match code.as_ref() {
                sqlstate::UNIQUE_VIOLATION => return EconomyError::DuplicateEvent,
                sqlstate::LOCK_NOT_AVAILABLE | sqlstate::QUERY_CANCELED => {
                    return EconomyError::Timeout;
                }
                sqlstate::DEADLOCK_DETECTED | sqlstate::SERIALIZATION_FAILURE => {
                    return EconomyError::Storage(db_err.message().to_string());
                }
                _ => {}
            }
        }
        match e {
            sqlx::Error::RowNotFound => EconomyError::ResourceNotFound("row".to_string()),
            sqlx::Error::PoolTimedOut => EconomyError::Timeout,
            other => EconomyError::Storage(other.to_string()),
        }
    }
}

impl From<rust_decimal::Error> for EconomyError {
    fn from(e: rust_decimal::Error) -> Self {
        EconomyError::ValidationError(e.to_string())
    }
}
