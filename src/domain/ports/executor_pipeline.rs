//! Executor pipeline port.
//!
//! The outbound dispatch boundary: given a validated `(tool_name, args)`
//! pair derived from a step's `meta.leaf`/`meta.args`, hand it to the
//! concrete executor (the embodied agent's action layer) and report
//! whether dispatch itself succeeded. Dispatch success is independent of
//! step *verification* — [`crate::services::step_verifier::StepVerifier`]
//! decides completion from world-state deltas, not from this return value.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::error::VerificationError;

#[async_trait]
pub trait ExecutorPipeline: Send + Sync {
    /// Dispatch `tool_name` with `args` for execution. Returns once the
    /// executor has accepted (not necessarily completed) the action.
    async fn dispatch(&self, tool_name: &str, args: &Value) -> Result<(), VerificationError>;
}
