//! Goal resolver port.
//!
//! Implements the routing-gate find-or-create semantics of section 4.2
//! step 2: given a raw intent, either bind it to an existing goal-bound
//! task or mint a new one. This is the sole collaborator allowed to
//! produce a [`Task`] whose `origin.kind == GoalResolver`.

use async_trait::async_trait;

use crate::domain::error::SolverError;
use crate::domain::models::Task;

/// Minimal query surface the resolver needs against `TaskStore`, passed in
/// by the ingestion pipeline so the resolver never holds a direct
/// dependency on the store's concrete type.
#[async_trait]
pub trait GoalStoreAdapter: Send + Sync {
    async fn find_by_goal_key(&self, goal_key: &str) -> Option<Task>;
}

/// Outcome of a resolution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GoalResolutionOutcome {
    /// An existing goal-bound task already covers this intent; no new task
    /// was created.
    AlreadySatisfied,
    /// A new goal-bound task was created for this intent.
    Created,
    /// Resolution did not apply (goal type unmapped, resolver not
    /// configured for this task type); caller falls through to ordinary
    /// ingestion.
    FellThrough,
}

#[async_trait]
pub trait GoalResolver: Send + Sync {
    /// Find or create a goal-bound task for `intent`. `store` gives the
    /// resolver read access to existing bindings without coupling it to
    /// `TaskStore` directly.
    async fn resolve_or_create(
        &self,
        intent: &Task,
        store: &dyn GoalStoreAdapter,
    ) -> Result<(GoalResolutionOutcome, Option<Task>), SolverError>;
}
