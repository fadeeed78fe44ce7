//! Verifier registry port.
//!
//! Domain-specific completion verification, invoked by the goal-binding
//! hook reducer (section 4.4) to decide whether a goal-bound task's
//! `completion.verifier_name` is currently satisfied.

use async_trait::async_trait;

use crate::domain::error::VerificationError;
use crate::domain::models::Task;

#[async_trait]
pub trait VerifierRegistry: Send + Sync {
    /// Run the named verifier against `task`'s current world-state view.
    /// `true` means the completion condition holds right now.
    async fn run(&self, name: &str, task: &Task) -> Result<bool, VerificationError>;
}
