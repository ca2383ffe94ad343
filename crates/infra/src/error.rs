//! Store-level error model.

use thiserror::Error;

use dynerp_core::DomainError;

/// Storage boundary error.
///
/// Deterministic domain failures (`NotFound`, `Conflict`) are distinguished
/// from infrastructure failures (`Storage`), which an outer layer may retry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    /// Uniqueness or optimistic-concurrency violation.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl StoreError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::RowNotFound => Self::NotFound("row not found".to_string()),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<StoreError> for DomainError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(msg) => DomainError::NotFound(msg),
            StoreError::Conflict(msg) => DomainError::Conflict(msg),
            StoreError::Storage(msg) => DomainError::Storage(msg),
        }
    }
}
