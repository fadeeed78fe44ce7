//! Domain models
//!
//! Pure domain entities with business logic and validation rules.
//! These models are framework-agnostic and contain no infrastructure concerns.

pub mod metadata;
pub mod task;

pub use metadata::{
    filter_allowlisted, Anchors, Completion, DedupeKey, GoalBinding, Hold, HoldReason, Origin,
    OriginKind, RigGSignals, SolverNamespace, TaskMetadata, METADATA_ALLOWLIST,
};
pub use task::{StepMeta, StepStatus, Task, TaskSource, TaskStatus, TaskStep};
