//! Ledger-level error taxonomy.
//!
//! Every facade and engine operation returns exactly one of these kinds. Callers
//! (an API layer) map `code()` to their own status codes.

use thiserror::Error;

use foodtrust_core::DomainError;

use crate::event_store::EventStoreError;
use crate::sensor_store::SensorStoreError;

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Malformed or missing input; never retried automatically.
    #[error("validation failed on '{field}': {message}")]
    Validation { field: String, message: String },

    /// Unknown batch id.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate batch id on creation, or optimistic retries exhausted.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("batch is in terminal status {status}; {operation} rejected")]
    TerminalState { status: String, operation: String },

    /// Role or ownership check failed.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Durable store unavailable or inconsistent. The only retryable kind; never
    /// means "batch does not exist".
    #[error("storage error: {0}")]
    Storage(String),

    /// The caller's deadline passed before the command was issued.
    #[error("deadline exceeded before {0} was issued")]
    DeadlineExceeded(String),
}

impl LedgerError {
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable code per kind.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Validation { .. } => "validation_error",
            LedgerError::NotFound(_) => "not_found",
            LedgerError::Conflict(_) => "conflict",
            LedgerError::InvalidTransition { .. } => "invalid_transition",
            LedgerError::TerminalState { .. } => "terminal_state",
            LedgerError::Unauthorized(_) => "unauthorized",
            LedgerError::Storage(_) => "storage_error",
            LedgerError::DeadlineExceeded(_) => "deadline_exceeded",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Storage(_))
    }
}

impl From<DomainError> for LedgerError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation { field, message } => LedgerError::Validation { field, message },
            DomainError::NotFound(what) => LedgerError::NotFound(what),
            DomainError::Conflict(msg) => LedgerError::Conflict(msg),
            DomainError::InvalidTransition { from, to } => LedgerError::InvalidTransition { from, to },
            DomainError::TerminalState { status, operation } => {
                LedgerError::TerminalState { status, operation }
            }
            DomainError::Unauthorized(msg) => LedgerError::Unauthorized(msg),
            DomainError::InvalidId(msg) => LedgerError::Validation {
                field: "id".to_string(),
                message: msg,
            },
        }
    }
}

impl From<EventStoreError> for LedgerError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => LedgerError::Conflict(msg),
            other => LedgerError::Storage(other.to_string()),
        }
    }
}

impl From<SensorStoreError> for LedgerError {
    fn from(value: SensorStoreError) -> Self {
        LedgerError::Storage(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_storage_is_retryable() {
        assert!(LedgerError::storage("down").is_retryable());
        for err in [
            LedgerError::validation("crop", "is required"),
            LedgerError::NotFound("B1".into()),
            LedgerError::Conflict("dup".into()),
            LedgerError::Unauthorized("no".into()),
            LedgerError::DeadlineExceeded("createBatch".into()),
        ] {
            assert!(!err.is_retryable(), "{err:?}");
        }
    }

    #[test]
    fn domain_errors_keep_their_kind() {
        let err: LedgerError = DomainError::terminal_state("SOLD", "transfer").into();
        assert_eq!(err.code(), "terminal_state");

        let err: LedgerError = DomainError::validation("quantity.amount", "must be > 0").into();
        match err {
            LedgerError::Validation { field, .. } => assert_eq!(field, "quantity.amount"),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn unavailable_store_is_storage_not_not_found() {
        let err: LedgerError = EventStoreError::Unavailable("connection refused".into()).into();
        assert_eq!(err.code(), "storage_error");
        let err: LedgerError = SensorStoreError::Unavailable("timeout".into()).into();
        assert!(err.is_retryable());
    }
}
