//! Unified domain error for the service layer.
//!
//! The per-surface enums in [`crate::domain::error`] classify *why* a given
//! collaborator failed; this module exists for call sites (the seven core
//! components and their public API surface) that need one error type to
//! propagate with `?`, mirroring the teacher's split between a
//! classification-rich `error` module and a single `errors::DomainError`
//! used by the service layer.

use thiserror::Error;
use uuid::Uuid;

use super::error::{BotStateError, ConfigError, SolverError, TaskError, VerificationError};

/// Domain-level errors that can occur in the task lifecycle core.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Task not found.
    #[error("task not found: {0}")]
    TaskNotFound(Uuid),

    /// Invalid state transition.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    /// A strict-mode invariant (I1-I7) was violated.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Wraps a [`TaskError`].
    #[error(transparent)]
    Task(#[from] TaskError),

    /// Wraps a [`BotStateError`].
    #[error(transparent)]
    BotState(#[from] BotStateError),

    /// Wraps a [`SolverError`].
    #[error(transparent)]
    Solver(#[from] SolverError),

    /// Wraps a [`VerificationError`].
    #[error(transparent)]
    Verification(#[from] VerificationError),

    /// Wraps a [`ConfigError`].
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Serialization error, e.g. while canonicalizing intent parameters.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience alias used throughout the service layer.
pub type DomainResult<T> = Result<T, DomainError>;

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}
