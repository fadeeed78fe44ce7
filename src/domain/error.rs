//! Domain error types for the task lifecycle core.
//!
//! This module defines per-surface error enums using `thiserror`. Each enum
//! classifies its own variants as transient, durable, or nonsensical per the
//! failure taxonomy in the data model: transient failures are safely
//! retryable after a short cooldown, durable failures need an external fix,
//! and nonsensical failures indicate the intent itself was never viable.

use thiserror::Error;
use uuid::Uuid;

/// Coarse failure classification shared by every error surface below.
///
/// Drives the tiered cooldown TTLs in [`crate::services::dedup_registry`]:
/// `Transient` gets the shortest cooldown, `Nonsensical` the longest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// Safe to retry soon; the failure was caused by an unavailable
    /// collaborator or unresolved context, not the intent itself.
    Transient,
    /// Retrying with the same inputs will fail again; needs an external fix
    /// (corrected IR, a recipe mapping update, etc.).
    Durable,
    /// The intent itself was never well-formed or is already exhausted;
    /// retrying is meaningless.
    Nonsensical,
}

/// Errors related to task ingestion, status transitions, and validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Task with the given ID was not found.
    #[error("task not found: {0}")]
    NotFound(Uuid),

    /// Attempted to create a task that already exists.
    #[error("task already exists: {0}")]
    AlreadyExists(Uuid),

    /// Invalid status transition attempted.
    #[error("invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    /// Mutation rejected because the task is in a terminal status.
    #[error("task {0} is terminal; mutation suppressed")]
    TerminalMutationSuppressed(Uuid),

    /// Progress value outside the valid `[0, 1]` range.
    #[error("invalid progress: {0}, must be within [0, 1]")]
    InvalidProgress(f64),

    /// Replan attempts for this task have been exhausted.
    #[error("replan attempts exhausted for task {0}")]
    ReplanExhausted(Uuid),

    /// An invariant from the data model (I1-I7) was violated.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl TaskError {
    /// Coarse failure classification for this error.
    pub const fn classification(&self) -> FailureClass {
        match self {
            Self::NotFound(_) | Self::InvalidStatusTransition { .. } => FailureClass::Transient,
            Self::AlreadyExists(_) | Self::InvalidProgress(_) => FailureClass::Durable,
            Self::TerminalMutationSuppressed(_)
            | Self::ReplanExhausted(_)
            | Self::InvariantViolation(_) => FailureClass::Nonsensical,
        }
    }

    /// Returns true if this error is transient and could succeed on retry.
    pub const fn is_transient(&self) -> bool {
        matches!(self.classification(), FailureClass::Transient)
    }

    /// Returns true if this error represents a permanent failure.
    pub const fn is_permanent(&self) -> bool {
        !self.is_transient()
    }
}

/// Errors from the bot-state HTTP read-only client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BotStateError {
    /// The request exceeded its configured timeout. Terminal for that call;
    /// callers decide independently whether to retry (see section 5).
    #[error("bot state request timed out after {0}ms")]
    Timeout(u64),

    /// The HTTP transport failed (connection refused, DNS, TLS, etc.).
    #[error("bot state request failed: {0}")]
    RequestFailed(String),

    /// The response body could not be decoded into the expected shape.
    #[error("bot state response malformed: {0}")]
    MalformedResponse(String),

    /// The bot-state server responded with a non-success status.
    #[error("bot state server returned status {0}")]
    ServerError(u16),
}

impl BotStateError {
    /// Coarse failure classification for this error.
    pub const fn classification(&self) -> FailureClass {
        match self {
            Self::Timeout(_) | Self::RequestFailed(_) => FailureClass::Transient,
            Self::MalformedResponse(_) => FailureClass::Durable,
            Self::ServerError(status) => {
                if *status >= 500 {
                    FailureClass::Transient
                } else {
                    FailureClass::Durable
                }
            }
        }
    }

    /// Returns true if this error is transient and could succeed on retry.
    pub const fn is_transient(&self) -> bool {
        matches!(self.classification(), FailureClass::Transient)
    }
}

/// Errors surfaced by solver/resolver/planner collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SolverError {
    /// The configured solver was unreachable or declined the call.
    #[error("solver unavailable: {0}")]
    Unavailable(String),

    /// The solver ran but could not find a plan.
    #[error("no plan found: {0}")]
    NoPlanFound(String),

    /// The solver rejected the task's context as unmappable to its ontology.
    #[error("ontology gap: {0}")]
    OntologyGap(String),

    /// The goal resolver could not find or create a goal-bound task.
    #[error("goal resolution failed: {0}")]
    GoalResolutionFailed(String),
}

impl SolverError {
    /// Coarse failure classification for this error.
    pub const fn classification(&self) -> FailureClass {
        match self {
            Self::Unavailable(_) => FailureClass::Transient,
            Self::NoPlanFound(_) | Self::OntologyGap(_) | Self::GoalResolutionFailed(_) => {
                FailureClass::Durable
            }
        }
    }

    /// Returns true if this error is transient and could succeed on retry.
    pub const fn is_transient(&self) -> bool {
        matches!(self.classification(), FailureClass::Transient)
    }
}

/// Errors from the step verification engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    /// No leaf could be derived for an executable step.
    #[error("no leaf derivable for executable step {0}")]
    NoLeafDerivable(String),

    /// The expected world-state delta was not observed within the timeout.
    #[error("verification timed out after {0}ms awaiting expected delta")]
    Timeout(u64),

    /// The Rig G feasibility gate rejected the task's plan.
    #[error("feasibility failed: {0}")]
    FeasibilityFailed(String),

    /// Whole-inventory gate found an under-count against the declared
    /// requirement; the task is left to be re-driven, not failed.
    #[error("inventory under-count: expected {expected}, found {found}")]
    InventoryUnderCount { expected: u64, found: u64 },

    /// The bot-state collaborator could not be reached while verifying a
    /// step; distinct from [`Self::Timeout`], which means the collaborator
    /// answered but the expected delta never appeared.
    #[error("bot state unavailable during verification: {0}")]
    CollaboratorUnavailable(#[from] BotStateError),
}

impl VerificationError {
    /// Coarse failure classification for this error.
    pub const fn classification(&self) -> FailureClass {
        match self {
            Self::Timeout(_) | Self::InventoryUnderCount { .. } => FailureClass::Transient,
            Self::NoLeafDerivable(_) => FailureClass::Durable,
            Self::FeasibilityFailed(_) => FailureClass::Durable,
            Self::CollaboratorUnavailable(e) => e.classification(),
        }
    }

    /// Returns true if this error is transient and could succeed on retry.
    pub const fn is_transient(&self) -> bool {
        matches!(self.classification(), FailureClass::Transient)
    }
}

/// Errors related to configuration loading and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file was not found at the specified path.
    #[error("config file not found: {0}")]
    FileNotFound(String),

    /// Invalid YAML syntax in configuration file.
    #[error("invalid YAML: {0}")]
    InvalidYaml(String),

    /// Configuration field has an invalid value.
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    /// Environment variable error.
    #[error("environment variable error: {0}")]
    EnvVarError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_error_not_found_display() {
        let task_id = Uuid::new_v4();
        let err = TaskError::NotFound(task_id);
        assert_eq!(err.to_string(), format!("task not found: {}", task_id));
    }

    #[test]
    fn test_task_error_classification() {
        assert_eq!(
            TaskError::NotFound(Uuid::new_v4()).classification(),
            FailureClass::Transient
        );
        assert_eq!(
            TaskError::AlreadyExists(Uuid::new_v4()).classification(),
            FailureClass::Durable
        );
        assert_eq!(
            TaskError::ReplanExhausted(Uuid::new_v4()).classification(),
            FailureClass::Nonsensical
        );
    }

    #[test]
    fn test_task_error_is_transient_is_permanent_are_complementary() {
        let err = TaskError::NotFound(Uuid::new_v4());
        assert!(err.is_transient());
        assert!(!err.is_permanent());

        let err = TaskError::InvariantViolation("I1".to_string());
        assert!(!err.is_transient());
        assert!(err.is_permanent());
    }

    #[test]
    fn test_bot_state_error_server_error_classification_depends_on_status() {
        assert_eq!(
            BotStateError::ServerError(503).classification(),
            FailureClass::Transient
        );
        assert_eq!(
            BotStateError::ServerError(404).classification(),
            FailureClass::Durable
        );
    }

    #[test]
    fn test_bot_state_error_timeout_is_transient() {
        assert!(BotStateError::Timeout(5000).is_transient());
        assert!(!BotStateError::MalformedResponse("bad json".to_string()).is_transient());
    }

    #[test]
    fn test_solver_error_classification() {
        assert!(SolverError::Unavailable("down".to_string()).is_transient());
        assert!(!SolverError::NoPlanFound("search exhausted".to_string()).is_transient());
        assert!(!SolverError::OntologyGap("unmappable".to_string()).is_transient());
    }

    #[test]
    fn test_verification_error_classification() {
        assert!(VerificationError::Timeout(10_000).is_transient());
        assert!(!VerificationError::NoLeafDerivable("unknown_leaf".to_string()).is_transient());
        assert_eq!(
            VerificationError::InventoryUnderCount {
                expected: 4,
                found: 2
            }
            .classification(),
            FailureClass::Transient
        );
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidValue {
            field: "replan.max_attempts".to_string(),
            value: "-1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid value for replan.max_attempts: -1"
        );
    }
}
