//! Task domain model.
//!
//! A `Task` is the central unit of work in the planning subsystem: it carries
//! an ordered sequence of [`TaskStep`]s, a normalized priority/urgency pair,
//! monotone progress, and a [`TaskStatus`] driven exclusively through the
//! seven-state machine below. Tasks are built by
//! [`crate::services::ingestion::TaskIngestionPipeline`] and mutated only by
//! [`crate::services::status_machine::StatusMachine`] and
//! [`crate::services::goal_binding::GoalBindingCoordinator`] — nothing else
//! should hold a mutable reference to a stored `Task`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::metadata::TaskMetadata;

/// Status of a task in the lifecycle core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Ingested but not yet dispatched; default status on creation.
    Pending,
    /// Awaiting a feasibility or macro-planning result (Rig E/Rig G) before
    /// steps can be executed.
    PendingPlanning,
    /// Currently being executed by the executor.
    Active,
    /// Suspended, usually via a goal-binding hold.
    Paused,
    /// Finished successfully; terminal.
    Completed,
    /// Finished unsuccessfully; terminal.
    Failed,
    /// Feasibility-rejected or otherwise unable to proceed without a replan.
    Unplannable,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    /// Stable lowercase identifier, used in log fields and event payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::PendingPlanning => "pending_planning",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Unplannable => "unplannable",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "pending_planning" => Some(Self::PendingPlanning),
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "unplannable" => Some(Self::Unplannable),
            _ => None,
        }
    }

    /// Completed and failed are the only terminal states; no transition out
    /// of either is permitted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// The transition table from section 4.3: rows are `self`, the returned
    /// slice is every column with a `✓` or `✓!` mark.
    pub fn valid_transitions(&self) -> &'static [TaskStatus] {
        use TaskStatus::{Active, Completed, Failed, Paused, Pending, PendingPlanning, Unplannable};
        match self {
            Self::Pending => &[PendingPlanning, Active, Paused, Completed, Failed, Unplannable],
            Self::PendingPlanning => &[Pending, Active, Paused, Completed, Failed, Unplannable],
            Self::Active => &[Pending, PendingPlanning, Paused, Completed, Failed, Unplannable],
            Self::Paused => &[Pending, Active, Completed, Failed, Unplannable],
            Self::Completed => &[],
            Self::Failed => &[],
            Self::Unplannable => &[Pending, PendingPlanning, Failed],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }

    /// `pending_planning -> completed` is allowed but marked `✓!` in the
    /// transition table: it is a legal transition that nonetheless indicates
    /// a task skipped execution entirely (e.g. an advisory task resolved
    /// during planning), so callers emit a policy event rather than treating
    /// it as routine.
    pub fn emits_policy_event_on(&self, new_status: Self) -> bool {
        matches!((self, new_status), (Self::PendingPlanning, Self::Completed))
    }
}

/// Where a task's originating intent came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSource {
    /// Submitted directly through the user-facing API.
    Manual,
    /// Emitted by the agent's own cognition/thought stream.
    Autonomous,
    /// Produced by, or bound to, the external Goal registry.
    Goal,
    /// Injected by an out-of-band interrupt (e.g. a safety override).
    Intrusive,
    /// Spawned by a planner as a prerequisite of another task.
    Planner,
}

impl TaskSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Autonomous => "autonomous",
            Self::Goal => "goal",
            Self::Intrusive => "intrusive",
            Self::Planner => "planner",
        }
    }
}

/// Verification/dispatch status of an individual [`TaskStep`], independent
/// of the parent task's own [`TaskStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not yet started.
    Pending,
    /// Pre-step snapshot captured; awaiting completion.
    Started,
    /// Post-step verification passed (or was skipped).
    Completed,
    /// Post-step verification failed; step does not progress the task.
    Failed,
}

impl Default for StepStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// Recognized keys on a [`TaskStep`]'s opaque `meta` bag (section 3).
///
/// Modeled as a closed struct per the re-architecture guidance in section 9
/// rather than a dynamic map: every key the ingestion pipeline and step
/// verifier read or write is named here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepMeta {
    /// Executable action name understood by the executor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leaf: Option<String>,
    /// Executor-native parameters for `leaf`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    /// Whether this step is meant to be dispatched at all (`false` for
    /// intent-only sentinel steps).
    pub executable: bool,
    /// Item-delta hints: items this step is expected to produce.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub produces: Vec<String>,
    /// Item-delta hints: items this step is expected to consume.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub consumes: Vec<String>,
    /// Free-form source tag (solver name, sentinel origin, etc.).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Domain category (`collect`, `craft`, `build`, `navigate`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Opaque identifier of the solver module that produced this step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_id: Option<String>,
    /// Non-executable intent label from an upstream planner, used when
    /// `executable == false`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
}

/// A single ordered unit of work within a [`Task`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStep {
    /// Stable within the parent task (not globally unique).
    pub step_id: Uuid,
    /// Position within `task.steps`; renumbered whenever steps are spliced.
    pub order: u32,
    pub status: StepStatus,
    pub meta: StepMeta,
    /// Reason a step is blocked before dispatch (e.g.
    /// `rig_e_solver_unimplemented`), set on sentinel steps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<String>,
}

impl TaskStep {
    pub fn new(order: u32, meta: StepMeta) -> Self {
        Self {
            step_id: Uuid::new_v4(),
            order,
            status: StepStatus::Pending,
            meta,
            blocked_reason: None,
        }
    }

    /// A non-dispatchable placeholder step carrying only a blocked reason,
    /// used by the ingestion pipeline's sentinel paths (section 4.2 step 3).
    pub fn sentinel(order: u32, reason: impl Into<String>) -> Self {
        Self {
            step_id: Uuid::new_v4(),
            order,
            status: StepStatus::Pending,
            meta: StepMeta {
                executable: false,
                ..StepMeta::default()
            },
            blocked_reason: Some(reason.into()),
        }
    }
}

/// Persistent unit of work with status, steps, and metadata envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    /// Domain category (`building`, `crafting`, `advisory_action`, ...).
    pub task_type: String,
    pub source: TaskSource,
    /// Normalized to `[0, 1]` by the ingestion pipeline.
    pub priority: f64,
    /// Normalized to `[0, 1]` by the ingestion pipeline.
    pub urgency: f64,
    /// Monotone non-decreasing within a non-failed lifetime (I5).
    pub progress: f64,
    pub status: TaskStatus,
    pub steps: Vec<TaskStep>,
    /// Opaque caller-supplied input bag, not interpreted by the core beyond
    /// dedup/requirement resolution.
    pub parameters: Value,
    pub metadata: TaskMetadata,
    /// Optimistic-concurrency counter; incremented on every mutation.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall-clock duration in milliseconds, set once alongside `completed_at`.
    pub actual_duration_ms: Option<i64>,
}

impl Task {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            task_type: String::new(),
            source: TaskSource::Manual,
            priority: 0.5,
            urgency: 0.5,
            progress: 0.0,
            status: TaskStatus::Pending,
            steps: Vec::new(),
            parameters: Value::Null,
            metadata: TaskMetadata::default(),
            version: 0,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            actual_duration_ms: None,
        }
    }

    pub fn with_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = task_type.into();
        self
    }

    pub fn with_source(mut self, source: TaskSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = priority.clamp(0.0, 1.0);
        self
    }

    pub fn with_urgency(mut self, urgency: f64) -> Self {
        self.urgency = urgency.clamp(0.0, 1.0);
        self
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_steps(mut self, steps: Vec<TaskStep>) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_metadata(mut self, metadata: TaskMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Whether this task can legally move to `new_status` per the transition
    /// table; does not itself mutate anything.
    pub fn can_transition_to(&self, new_status: TaskStatus) -> bool {
        self.status.can_transition_to(new_status)
    }

    /// Apply a status transition, bumping `version` and the relevant
    /// timestamps. Returns an error describing the rejected transition
    /// rather than panicking — callers (the StatusMachine) decide whether
    /// that's a hard error or a logged no-op per section 4.3.
    pub fn transition_to(&mut self, new_status: TaskStatus) -> Result<(), String> {
        if !self.can_transition_to(new_status) {
            return Err(format!(
                "cannot transition from {} to {}",
                self.status.as_str(),
                new_status.as_str()
            ));
        }
        self.apply_status(new_status);
        Ok(())
    }

    /// Force a status transition, bypassing the state machine.
    ///
    /// Reserved for crash recovery, startup reconciliation, or test setup.
    /// Emits a tracing warning every time so bypass sites stay visible in
    /// logs; bookkeeping (`updated_at`/timestamps/`version`) stays
    /// consistent with [`Task::transition_to`].
    pub fn force_status(&mut self, new_status: TaskStatus, reason: &str) {
        tracing::warn!(
            task_id = %self.id,
            from = %self.status.as_str(),
            to = %new_status.as_str(),
            reason,
            "forcing task status transition (bypassing state machine)"
        );
        self.apply_status(new_status);
    }

    fn apply_status(&mut self, new_status: TaskStatus) {
        self.status = new_status;
        self.updated_at = Utc::now();
        self.version += 1;
        match new_status {
            TaskStatus::Active if self.started_at.is_none() => {
                self.started_at = Some(self.updated_at);
            }
            TaskStatus::Completed | TaskStatus::Failed => {
                self.completed_at = Some(self.updated_at);
                if let Some(started) = self.started_at {
                    self.actual_duration_ms =
                        Some((self.updated_at - started).num_milliseconds());
                }
            }
            _ => {}
        }
    }

    /// I5: a completed task must have `progress == 1`; `failed`/`unplannable`
    /// tasks may have any progress, and bare progress writes (no status
    /// change) against them are rejected by the caller, not here.
    pub fn set_progress(&mut self, progress: f64) {
        self.progress = progress.clamp(0.0, 1.0);
        self.updated_at = Utc::now();
        self.version += 1;
    }

    /// Current step index: the order of the first non-`Completed` step, or
    /// `steps.len()` if all steps are done.
    pub fn current_step_index(&self) -> usize {
        self.steps
            .iter()
            .position(|s| s.status != StepStatus::Completed)
            .unwrap_or(self.steps.len())
    }
}
