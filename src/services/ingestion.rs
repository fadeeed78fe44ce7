//! Task ingestion pipeline.
//!
//! Single entry point for turning a caller-supplied intent into a
//! persisted, fully-finalized [`Task`] (section 4.2). Runs, in order: a
//! dedup probe, the goal-resolver routing gate, solver dispatch, requirement
//! resolution, normalization, origin stamping, metadata allowlist
//! projection, invariant finalization, and persist+emit.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::domain::error::{SolverError, TaskError};
use crate::domain::models::{
    filter_allowlisted, DedupeKey, Origin, OriginKind, Task, TaskMetadata, TaskSource, TaskStep,
};
use crate::domain::ports::{GoalResolutionOutcome, GoalResolver, GoalStoreAdapter, Solver};
use crate::services::canonicalize;
use crate::services::dedup_registry::DedupFailureRegistry;
use crate::services::event_bus::{EventBus, EventPayload};
use crate::services::task_store::{PutOptions, TaskStore};

/// Schema version stamped into every [`DedupeKey`] minted by this pipeline.
const SCHEMA_VERSION: &str = "1";

/// Outcome of [`TaskIngestionPipeline::add_task`]. A recently-committed
/// Sterling digest already present in the store/history/LRU window is
/// rejected with no Task created (section 4.7, scenario 6) rather than
/// returning a stand-in Task.
#[derive(Debug, Clone)]
pub enum IngestDecision {
    /// A Task was created, or an equivalent one already existed (dedup
    /// tiers 1-3 return the pre-existing Task here too).
    Task(Task),
    /// Rejected: `partial.committed_ir_digest` matched a digest already
    /// seen recently. No Task was constructed.
    DroppedDedup,
}

impl IngestDecision {
    pub fn into_task(self) -> Option<Task> {
        match self {
            Self::Task(task) => Some(task),
            Self::DroppedDedup => None,
        }
    }
}

/// Caller-supplied intent, before any pipeline processing.
#[derive(Debug, Clone)]
pub struct PartialTask {
    pub title: String,
    pub description: String,
    pub task_type: String,
    pub source: TaskSource,
    pub tags: Vec<String>,
    pub parent_task_id: Option<Uuid>,
    pub parent_goal_key: Option<String>,
    pub priority: f64,
    pub urgency: f64,
    pub parameters: Value,
    pub requirement_candidate: Option<Value>,
    /// The committed IR digest from an upstream Sterling reduction, when
    /// this intent originates from a converted thought. Combined with
    /// [`SCHEMA_VERSION`] into a [`DedupeKey`] and checked against
    /// [`DedupFailureRegistry`]'s recent-digest window.
    pub committed_ir_digest: Option<String>,
    pub extra_metadata: BTreeMap<String, Value>,
}

impl PartialTask {
    pub fn new(title: impl Into<String>, task_type: impl Into<String>, source: TaskSource) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            task_type: task_type.into(),
            source,
            tags: Vec::new(),
            parent_task_id: None,
            parent_goal_key: None,
            priority: 0.5,
            urgency: 0.5,
            parameters: Value::Null,
            requirement_candidate: None,
            committed_ir_digest: None,
            extra_metadata: BTreeMap::new(),
        }
    }
}

/// Allows the adapter to be satisfied directly by [`TaskStore`] without the
/// goal resolver depending on its concrete type (section 4.2 step 2).
#[async_trait]
impl GoalStoreAdapter for TaskStore {
    async fn find_by_goal_key(&self, goal_key: &str) -> Option<Task> {
        self.list(&crate::services::task_store::TaskFilter {
            goal_key: Some(goal_key.to_string()),
            ..Default::default()
        })
        .into_iter()
        .next()
        .cloned()
    }
}

fn infer_goal_type(partial: &PartialTask) -> String {
    if let Some(goal_type) = partial.parameters.get("goalType").and_then(Value::as_str) {
        return goal_type.to_string();
    }
    let title = partial.title.to_lowercase();
    if title.contains("structure") {
        "build_structure".to_string()
    } else {
        "build_shelter".to_string()
    }
}

pub struct IngestionConfig {
    pub strict_finalize: bool,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self { strict_finalize: false }
    }
}

pub struct TaskIngestionPipeline {
    solver: Option<Arc<dyn Solver>>,
    macro_planner: Option<Arc<dyn Solver>>,
    goal_resolver: Option<Arc<dyn GoalResolver>>,
    config: IngestionConfig,
}

impl TaskIngestionPipeline {
    pub fn new(
        solver: Option<Arc<dyn Solver>>,
        macro_planner: Option<Arc<dyn Solver>>,
        goal_resolver: Option<Arc<dyn GoalResolver>>,
        config: IngestionConfig,
    ) -> Self {
        Self {
            solver,
            macro_planner,
            goal_resolver,
            config,
        }
    }

    pub async fn add_task(
        &self,
        store: &mut TaskStore,
        registry: &mut DedupFailureRegistry,
        events: &EventBus,
        partial: PartialTask,
    ) -> IngestDecision {
        // Step 1: pre-resolver dedup probe, in tier order (section 4.1).
        // Tier 1+2: exact title, then type+source+title-overlap.
        if let Some(hit) = store.find_similar(&partial.title, &partial.task_type, partial.source.as_str()) {
            return IngestDecision::Task(hit.clone());
        }
        // Tier 3: requirement equivalence, compared by canonicalized digest.
        if let Some(digest) = partial.requirement_candidate.as_ref().map(canonicalize::digest) {
            if let Some(hit) = store.find_by_requirement_digest(&digest) {
                return IngestDecision::Task(hit.clone());
            }
        }
        // Recent-digest window: reject resurrection of a just-completed or
        // just-failed intent carrying the same committed Sterling digest.
        let dedupe_key = partial
            .committed_ir_digest
            .as_ref()
            .map(|digest| DedupeKey::new(SCHEMA_VERSION, digest));
        if let Some(key) = &dedupe_key {
            if registry.has_recent_digest(store, key.as_str()) {
                tracing::info!(
                    dedupe_key = key.as_str(),
                    "dropped_dedup: Sterling digest already committed recently"
                );
                return IngestDecision::DroppedDedup;
            }
        }

        let mut task = Task::new(partial.title.clone(), partial.description.clone())
            .with_type(partial.task_type.clone())
            .with_source(partial.source)
            .with_priority(partial.priority)
            .with_urgency(partial.urgency)
            .with_parameters(partial.parameters.clone());

        // Step 2: routing gate.
        let mut goal_binding_attached = false;
        if let Some(resolver) = &self.goal_resolver {
            if partial.source == TaskSource::Goal && partial.task_type == "building" {
                let goal_type = infer_goal_type(&partial);
                task.metadata.goal_key = Some(goal_type.clone());
                match resolver.resolve_or_create(&task, &*store).await {
                    Ok((GoalResolutionOutcome::AlreadySatisfied, Some(existing))) => {
                        return IngestDecision::Task(existing)
                    }
                    Ok((GoalResolutionOutcome::Created, Some(created))) => {
                        task = created;
                        goal_binding_attached = true;
                    }
                    Ok((GoalResolutionOutcome::FellThrough, _)) => {}
                    Ok((_, None)) => {}
                    Err(_) => {
                        events.publish(EventPayload::TaskLifecycleEvent {
                            event_type: "solver_unavailable".to_string(),
                            task_id: task.id,
                            reason: Some("goal_resolver_error".to_string()),
                            advice: None,
                        });
                    }
                }
            }
        }

        // Step 3: solver dispatch.
        self.dispatch_solver(&mut task, &partial).await;

        // Step 4: requirement resolution.
        task.metadata.requirement = partial.requirement_candidate.clone();

        // Step 5: normalization.
        if let Some(parent_id) = partial.parent_task_id {
            task.metadata.subtask_key = Some(canonicalize::hash_goal_key(&[
                &parent_id.to_string(),
                &partial.title,
            ]));
        }
        task.metadata.sterling_dedupe_key = dedupe_key.clone();
        task.parameters = canonicalize::canonicalize(&task.parameters);

        // Step 6: origin stamping.
        self.stamp_origin(&mut task, &partial, goal_binding_attached, events);

        // Step 7: metadata allowlist projection.
        if !partial.extra_metadata.is_empty() {
            let raw: Map<String, Value> = partial.extra_metadata.into_iter().collect();
            let (kept, dropped) = filter_allowlisted(raw);
            if !dropped.is_empty() {
                tracing::debug!(task_id = %task.id, ?dropped, "dropped non-allowlisted metadata keys");
            }
            task.metadata.extra.extend(kept.into_iter());
        }

        // Step 8: invariant finalization.
        if let Err(e) = self.finalize_invariants(&mut task) {
            tracing::warn!(task_id = %task.id, error = %e, "task_finalize_invariant_violation");
            if self.config.strict_finalize {
                task.metadata
                    .set_blocked(format!("invariant_violation:{e}"), None);
            }
        }

        // Step 9: persist + emit.
        store.put(task.clone(), PutOptions::default());
        if let Some(key) = &dedupe_key {
            registry.remember_digest(key.as_str());
        }
        events.publish(EventPayload::TaskAdded {
            task_id: task.id,
            task_type: task.task_type.clone(),
            source: task.source.as_str().to_string(),
            has_goal_binding: task.metadata.goal_binding.is_some(),
            origin_kind: task.metadata.origin.as_ref().map(|o| format!("{:?}", o.kind)),
            title: task.title.clone(),
        });
        if task.priority >= 0.8 {
            events.publish(EventPayload::TaskLifecycleEvent {
                event_type: "high_priority_added".to_string(),
                task_id: task.id,
                reason: None,
                advice: None,
            });
        }

        IngestDecision::Task(task)
    }

    async fn dispatch_solver(&self, task: &mut Task, partial: &PartialTask) {
        if task.task_type == "advisory_action" {
            task.metadata.set_blocked("advisory_action", None);
            return;
        }

        match task.task_type.as_str() {
            "collect" | "mine" => {
                task.steps = self.compile_acquire_steps(task, partial);
                if task.steps.is_empty() {
                    task.metadata.set_blocked("no-executable-plan", None);
                }
            }
            "craft" => self.delegate(task, "craft_solver_unavailable").await,
            "build" => self.delegate(task, "build_solver_unavailable").await,
            "navigate" | "explore" | "find" => self.delegate_macro_planner(task).await,
            _ => {
                task.metadata.set_blocked("no-executable-plan", None);
            }
        }
    }

    fn compile_acquire_steps(&self, _task: &Task, partial: &PartialTask) -> Vec<TaskStep> {
        let Some(items) = partial.parameters.get("items").and_then(Value::as_array) else {
            return Vec::new();
        };
        items
            .iter()
            .filter_map(Value::as_str)
            .enumerate()
            .map(|(i, item)| {
                TaskStep::new(
                    i as u32,
                    crate::domain::models::StepMeta {
                        leaf: Some("acquire_material".to_string()),
                        executable: true,
                        produces: vec![item.to_string()],
                        domain: Some("collect".to_string()),
                        ..Default::default()
                    },
                )
            })
            .collect()
    }

    async fn delegate(&self, task: &mut Task, unavailable_reason: &str) {
        let Some(solver) = &self.solver else {
            task.metadata.set_blocked(unavailable_reason.to_string(), None);
            return;
        };
        match solver.generate_steps(task).await {
            Ok(steps) if !steps.is_empty() => task.steps = steps,
            Ok(_) => task.metadata.set_blocked("no-executable-plan", None),
            Err(_) => task.metadata.set_blocked(unavailable_reason.to_string(), None),
        }
    }

    async fn delegate_macro_planner(&self, task: &mut Task) {
        let Some(planner) = &self.macro_planner else {
            task.steps = vec![TaskStep::sentinel(0, "rig_e_solver_unimplemented")];
            return;
        };
        match planner.generate_steps(task).await {
            Ok(steps) if !steps.is_empty() => task.steps = steps,
            Ok(_) => task.steps = vec![TaskStep::sentinel(0, "rig_e_no_plan_found")],
            Err(SolverError::OntologyGap(_)) => {
                task.steps = vec![TaskStep::sentinel(0, "rig_e_ontology_gap")];
            }
            Err(_) => {
                task.steps = vec![TaskStep::sentinel(0, "rig_e_no_plan_found")];
            }
        }
    }

    fn stamp_origin(&self, task: &mut Task, partial: &PartialTask, goal_binding_attached: bool, events: &EventBus) {
        let origin = match partial.source {
            TaskSource::Manual => Origin::new(OriginKind::Api),
            TaskSource::Autonomous
                if partial.tags.contains(&"cognitive".to_string())
                    && partial.tags.contains(&"autonomous".to_string()) =>
            {
                Origin::new(OriginKind::Cognition)
            }
            _ if partial.parent_task_id.is_some() => {
                let mut o = Origin::new(OriginKind::Executor);
                if let Some(parent) = partial.parent_task_id {
                    o = o.with_parent_task_id(parent);
                }
                o
            }
            TaskSource::Goal if goal_binding_attached || task.metadata.goal_binding.is_some() => {
                Origin::new(OriginKind::GoalResolver)
            }
            TaskSource::Goal => {
                let reason = if self.goal_resolver.is_none() {
                    "goal_resolver_disabled".to_string()
                } else {
                    format!("type_not_gated:{}", task.task_type)
                };
                events.publish(EventPayload::GoalBindingDrift {
                    task_id: task.id,
                    reason: reason.clone(),
                });
                Origin::new(OriginKind::GoalSource)
            }
            _ => Origin::new(OriginKind::Api),
        };
        task.metadata.set_origin_once(origin);
    }

    fn finalize_invariants(&self, task: &mut Task) -> Result<(), TaskError> {
        if task.metadata.blocked_reason.is_some() && task.metadata.blocked_at.is_none() {
            let at = task.metadata.updated_at;
            task.metadata.set_blocked(
                task.metadata.blocked_reason.clone().unwrap_or_default(),
                Some(at),
            );
        }
        if task.metadata.origin.is_none() {
            if task.source == TaskSource::Autonomous && task.metadata.requirement.is_none() && task.task_type != "advisory_action" {
                tracing::warn!(task_id = %task.id, "autonomous sub-task without requirement_candidate");
            }
            return Err(TaskError::InvariantViolation("I1: origin missing at finalization".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StubSolver {
        steps: Vec<TaskStep>,
    }

    #[async_trait]
    impl Solver for StubSolver {
        async fn generate_steps(&self, _task: &Task) -> Result<Vec<TaskStep>, SolverError> {
            Ok(self.steps.clone())
        }
    }

    fn setup() -> (TaskStore, DedupFailureRegistry, EventBus) {
        (TaskStore::new(100, false), DedupFailureRegistry::new(500), EventBus::default())
    }

    #[tokio::test]
    async fn test_dedup_probe_returns_existing_task_unchanged() {
        let (mut store, mut registry, events) = setup();
        let pipeline = TaskIngestionPipeline::new(None, None, None, IngestionConfig::default());
        let first = pipeline
            .add_task(&mut store, &mut registry, &events, PartialTask::new("Build a shelter", "building", TaskSource::Manual))
            .await
            .into_task()
            .expect("task created");
        let second = pipeline
            .add_task(&mut store, &mut registry, &events, PartialTask::new("Build a shelter", "building", TaskSource::Manual))
            .await
            .into_task()
            .expect("dedup hit returns existing task");
        assert_eq!(first.id, second.id);
        assert_eq!(store.statistics().total, 1);
    }

    #[tokio::test]
    async fn test_manual_source_stamps_api_origin() {
        let (mut store, mut registry, events) = setup();
        let pipeline = TaskIngestionPipeline::new(None, None, None, IngestionConfig::default());
        let task = pipeline
            .add_task(&mut store, &mut registry, &events, PartialTask::new("Craft a pickaxe", "craft", TaskSource::Manual))
            .await
            .into_task()
            .expect("task created");
        assert_eq!(task.metadata.origin.unwrap().kind, OriginKind::Api);
    }

    #[tokio::test]
    async fn test_navigate_without_macro_planner_gets_sentinel() {
        let (mut store, mut registry, events) = setup();
        let pipeline = TaskIngestionPipeline::new(None, None, None, IngestionConfig::default());
        let task = pipeline
            .add_task(&mut store, &mut registry, &events, PartialTask::new("Go to the village", "navigate", TaskSource::Manual))
            .await
            .into_task()
            .expect("task created");
        assert_eq!(task.steps.len(), 1);
        assert_eq!(task.steps[0].blocked_reason.as_deref(), Some("rig_e_solver_unimplemented"));
    }

    #[tokio::test]
    async fn test_advisory_action_bypasses_step_generation() {
        let (mut store, mut registry, events) = setup();
        let pipeline = TaskIngestionPipeline::new(None, None, None, IngestionConfig::default());
        let task = pipeline
            .add_task(&mut store, &mut registry, &events, PartialTask::new("Check in", "advisory_action", TaskSource::Manual))
            .await
            .into_task()
            .expect("task created");
        assert!(task.steps.is_empty());
        assert_eq!(task.metadata.blocked_reason.as_deref(), Some("advisory_action"));
    }

    #[tokio::test]
    async fn test_collect_kind_compiles_acquire_steps_from_items() {
        let (mut store, mut registry, events) = setup();
        let pipeline = TaskIngestionPipeline::new(None, None, None, IngestionConfig::default());
        let mut partial = PartialTask::new("Collect logs", "collect", TaskSource::Manual);
        partial.parameters = serde_json::json!({ "items": ["oak_log", "oak_log"] });
        let task = pipeline
            .add_task(&mut store, &mut registry, &events, partial)
            .await
            .into_task()
            .expect("task created");
        assert_eq!(task.steps.len(), 2);
        assert_eq!(task.steps[0].meta.leaf.as_deref(), Some("acquire_material"));
    }

    #[tokio::test]
    async fn test_craft_delegates_to_solver_when_configured() {
        let (mut store, mut registry, events) = setup();
        let stub = Arc::new(StubSolver {
            steps: vec![TaskStep::new(0, crate::domain::models::StepMeta {
                leaf: Some("craft_recipe".to_string()),
                executable: true,
                ..Default::default()
            })],
        });
        let pipeline = TaskIngestionPipeline::new(Some(stub), None, None, IngestionConfig::default());
        let task = pipeline
            .add_task(&mut store, &mut registry, &events, PartialTask::new("Craft planks", "craft", TaskSource::Manual))
            .await
            .into_task()
            .expect("task created");
        assert_eq!(task.steps.len(), 1);
    }

    #[tokio::test]
    async fn test_high_priority_task_emits_lifecycle_event() {
        let (mut store, mut registry, events) = setup();
        let mut rx = events.subscribe();
        let pipeline = TaskIngestionPipeline::new(None, None, None, IngestionConfig::default());
        let mut partial = PartialTask::new("Urgent task", "advisory_action", TaskSource::Manual);
        partial.priority = 0.9;
        pipeline.add_task(&mut store, &mut registry, &events, partial).await;

        let mut saw_high_priority = false;
        while let Ok(envelope) = rx.try_recv() {
            if let EventPayload::TaskLifecycleEvent { event_type, .. } = envelope.payload {
                if event_type == "high_priority_added" {
                    saw_high_priority = true;
                }
            }
        }
        assert!(saw_high_priority);
    }

    /// Tier 3 of the dedup probe: requirement-equivalent intents under
    /// different titles still collapse to one Task.
    #[tokio::test]
    async fn test_requirement_digest_dedup_matches_across_differing_titles() {
        let (mut store, mut registry, events) = setup();
        let pipeline = TaskIngestionPipeline::new(None, None, None, IngestionConfig::default());

        let mut first = PartialTask::new("Smelt iron ingots", "craft", TaskSource::Manual);
        first.requirement_candidate = Some(serde_json::json!({ "output": "iron_ingot", "quantity": 4 }));
        let created = pipeline
            .add_task(&mut store, &mut registry, &events, first)
            .await
            .into_task()
            .expect("task created");

        let mut second = PartialTask::new("Smelt some iron", "craft", TaskSource::Manual);
        second.requirement_candidate = Some(serde_json::json!({ "quantity": 4, "output": "iron_ingot" }));
        let repeat = pipeline
            .add_task(&mut store, &mut registry, &events, second)
            .await
            .into_task()
            .expect("requirement-equivalence dedup returns existing task");

        assert_eq!(created.id, repeat.id);
        assert_eq!(store.statistics().total, 1);
    }

    /// Scenario 6: a recently-committed Sterling digest is rejected outright,
    /// even under a different title/id, with no new Task created.
    #[tokio::test]
    async fn test_recent_sterling_digest_drops_ingestion_with_no_task_created() {
        let (mut store, mut registry, events) = setup();
        let pipeline = TaskIngestionPipeline::new(None, None, None, IngestionConfig::default());

        let mut first = PartialTask::new("Smelt iron ingots", "craft", TaskSource::Manual);
        first.committed_ir_digest = Some("digestD".to_string());
        let created = pipeline
            .add_task(&mut store, &mut registry, &events, first)
            .await
            .into_task()
            .expect("task created");
        assert_eq!(
            created.metadata.sterling_dedupe_key.as_ref().map(DedupeKey::as_str),
            Some("1:digestD")
        );

        let mut second = PartialTask::new("Totally different title", "craft", TaskSource::Manual);
        second.committed_ir_digest = Some("digestD".to_string());
        let decision = pipeline.add_task(&mut store, &mut registry, &events, second).await;

        assert!(matches!(decision, IngestDecision::DroppedDedup));
        assert_eq!(store.statistics().total, 1);
    }
}
