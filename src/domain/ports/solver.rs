//! Solver port.
//!
//! Produces executable [`TaskStep`]s for a partially-specified task (the
//! Rig E / macro-planning boundary). A solver may legitimately return an
//! empty plan (section 4.2 step 3 falls back to a sentinel step when it
//! does).

use async_trait::async_trait;

use crate::domain::error::SolverError;
use crate::domain::models::{Task, TaskStep};

#[async_trait]
pub trait Solver: Send + Sync {
    /// Generate steps for `task`. An `Ok(vec![])` return means the solver
    /// ran successfully but found nothing to plan, distinct from an `Err`.
    async fn generate_steps(&self, task: &Task) -> Result<Vec<TaskStep>, SolverError>;
}
