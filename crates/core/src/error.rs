//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// state machine violations, conflicts). Storage failures belong to infra.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed or missing input; `field` names the offending field.
    #[error("validation failed on '{field}': {message}")]
    Validation { field: String, message: String },

    /// The referenced batch (or other resource) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate identifier or stale version.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A status change that the transition graph does not allow.
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// The batch is in a terminal status and the operation is not permitted.
    #[error("batch is in terminal status {status}; {operation} rejected")]
    TerminalState { status: String, operation: String },

    /// The acting principal may not perform this operation.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// An identifier was malformed.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invalid_transition(from: impl core::fmt::Display, to: impl core::fmt::Display) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn terminal_state(status: impl core::fmt::Display, operation: impl Into<String>) -> Self {
        Self::TerminalState {
            status: status.to_string(),
            operation: operation.into(),
        }
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
