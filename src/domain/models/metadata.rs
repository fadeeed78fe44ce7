//! `Task.metadata` envelope.
//!
//! The source system carries task metadata as a dynamic `Record<string,
//! unknown>` bag. Per the re-architecture guidance in section 9 of the
//! spec, this crate replaces it with a closed struct: one field per key on
//! the I7 allowlist, plus a single `extra` escape hatch for forward-
//! compatible data the pipeline reads back but never interprets. The I7
//! allowlist projection becomes a structural copy (see
//! [`filter_allowlisted`]) rather than a runtime key filter.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// I7: the only metadata keys that survive the ingestion pipeline's
/// rebuild. Any other caller-supplied key is dropped (logged in debug
/// mode) by [`filter_allowlisted`].
pub const METADATA_ALLOWLIST: &[&str] = &[
    "goalKey",
    "subtaskKey",
    "taskProvenance",
    "origin",
    "requirement",
    "solver",
    "goalBinding",
    "blockedReason",
    "blockedAt",
    "failureCode",
    "failureError",
];

/// Opaque `"<schema_version>:<committed_ir_digest>"` key identifying a
/// committed Sterling-reduction artifact (section 4.7). Distinct from
/// [`TaskMetadata::subtask_key`], which keys sub-task identity off
/// `(parent_id, title)` rather than reduction output. Treated as opaque
/// except for the `:` split exposing `schema_version` for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupeKey(String);

impl DedupeKey {
    pub fn new(schema_version: &str, committed_ir_digest: &str) -> Self {
        Self(format!("{schema_version}:{committed_ir_digest}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn schema_version(&self) -> &str {
        self.0.split(':').next().unwrap_or(&self.0)
    }
}

/// Immutable creation provenance, stamped exactly once during finalization
/// (I1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginKind {
    /// Submitted through the user-facing API.
    Api,
    /// Emitted by the agent's cognition/thought stream.
    Cognition,
    /// Goal-sourced but not routed through the goal resolver (drift case).
    GoalSource,
    /// Routed through, and bound by, the goal resolver.
    GoalResolver,
    /// Spawned by the executor as a prerequisite of another task.
    Executor,
}

/// The origin envelope itself. Once attached to a [`TaskMetadata`] it can
/// never be overwritten — see [`TaskMetadata::set_origin_once`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Origin {
    pub kind: OriginKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_task_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_goal_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Origin {
    pub fn new(kind: OriginKind) -> Self {
        Self {
            kind,
            name: None,
            parent_task_id: None,
            parent_goal_key: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_parent_task_id(mut self, id: Uuid) -> Self {
        self.parent_task_id = Some(id);
        self
    }

    pub fn with_parent_goal_key(mut self, key: impl Into<String>) -> Self {
        self.parent_goal_key = Some(key.into());
        self
    }
}

/// Reason-tagged suspension on a goal-bound task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldReason {
    /// Absorbing state (I6): only an explicit management `resume` clears
    /// this; `goal_resumed` events are no-ops against it.
    ManualPause,
    /// Set when a `PreemptionCoordinator` budget is exhausted.
    Preempted,
    /// Any other reason carried verbatim.
    Other(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hold {
    pub reason: HoldReason,
    pub set_at: DateTime<Utc>,
}

impl Hold {
    pub fn new(reason: HoldReason) -> Self {
        Self {
            reason,
            set_at: Utc::now(),
        }
    }

    pub fn is_manual_pause(&self) -> bool {
        matches!(self.reason, HoldReason::ManualPause)
    }
}

/// Site signature for location-anchored goals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anchors {
    pub site_signature: String,
}

/// Completion-verifier bookkeeping on a goal binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    pub verifier_name: String,
    pub definition_version: u32,
    pub consecutive_passes: u32,
}

/// Associates a Task with an external Goal identity; enables dedup and
/// lifecycle sync (section 3, section 4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalBinding {
    /// Never mutates post-creation (I3).
    pub goal_instance_id: Uuid,
    /// Current identity; may be rekeyed (old values moved into
    /// `goal_key_aliases`).
    pub goal_key: String,
    #[serde(default)]
    pub goal_key_aliases: Vec<String>,
    pub goal_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchors: Option<Anchors>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion: Option<Completion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hold: Option<Hold>,
}

impl GoalBinding {
    pub fn new(goal_key: impl Into<String>, goal_type: impl Into<String>) -> Self {
        Self {
            goal_instance_id: Uuid::new_v4(),
            goal_key: goal_key.into(),
            goal_key_aliases: Vec::new(),
            goal_type: goal_type.into(),
            goal_id: None,
            anchors: None,
            completion: None,
            hold: None,
        }
    }

    /// Rekey the binding, preserving `goal_instance_id` (I3) and pushing
    /// the old key onto the alias history.
    pub fn rekey(&mut self, new_key: impl Into<String>) {
        let old = std::mem::replace(&mut self.goal_key, new_key.into());
        self.goal_key_aliases.push(old);
    }

    /// I4: anchoring without at least one alias is an invalid state.
    pub fn satisfies_anchor_invariant(&self) -> bool {
        match &self.anchors {
            Some(a) if a.site_signature.is_empty() => true,
            Some(_) => !self.goal_key_aliases.is_empty(),
            None => true,
        }
    }

    pub fn has_manual_pause_hold(&self) -> bool {
        self.hold.as_ref().is_some_and(Hold::is_manual_pause)
    }
}

/// Marker for an in-flight replan, stored at
/// `metadata.solver.rig_g_replan` (section 4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplanMarker {
    pub in_flight: bool,
    pub attempt: u32,
    pub scheduled_at: DateTime<Utc>,
}

/// Rig G feasibility signals attached by the solver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RigGSignals {
    pub feasibility_passed: bool,
    #[serde(default)]
    pub rejection: BTreeMap<String, u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_set_size_p95: Option<f64>,
}

/// Namespace for solver-produced data: feasibility signals, plan
/// identifiers, replan attempt counters, in-flight markers, per-domain
/// episode hashes. Treated generically by the pipeline: deep-merged, never
/// key-by-key filtered (section 3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SolverNamespace {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rig_g: Option<RigGSignals>,
    #[serde(default)]
    pub rig_g_checked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_parallelism: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rig_g_replan: Option<ReplanMarker>,
    #[serde(default)]
    pub replan_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
    #[serde(default)]
    pub episode_hashes: BTreeMap<String, String>,
    /// Anything else a solver attaches; deep-merged verbatim.
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl SolverNamespace {
    /// Deep-merge another namespace's fields into this one. Named/typed
    /// fields in `other` win when set; `extra` keys union, `other` winning
    /// on key collision.
    pub fn merge(&mut self, other: SolverNamespace) {
        if other.rig_g.is_some() {
            self.rig_g = other.rig_g;
        }
        if other.rig_g_checked {
            self.rig_g_checked = true;
        }
        if other.suggested_parallelism.is_some() {
            self.suggested_parallelism = other.suggested_parallelism;
        }
        if other.rig_g_replan.is_some() {
            self.rig_g_replan = other.rig_g_replan;
        }
        if other.replan_attempts > self.replan_attempts {
            self.replan_attempts = other.replan_attempts;
        }
        if other.plan_id.is_some() {
            self.plan_id = other.plan_id;
        }
        self.episode_hashes.extend(other.episode_hashes);
        self.extra.extend(other.extra);
    }
}

/// The structured metadata envelope carried on every [`super::task::Task`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskMetadata {
    /// Immutable once set (I1); see [`TaskMetadata::set_origin_once`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtask_key: Option<String>,
    /// The Sterling dedupe key stamped during ingestion normalization, used
    /// by [`crate::services::dedup_registry::DedupFailureRegistry`]'s
    /// recent-digest window (section 4.7).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sterling_dedupe_key: Option<DedupeKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_provenance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirement: Option<Value>,
    #[serde(default)]
    pub solver: SolverNamespace,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_binding: Option<GoalBinding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_error: Option<String>,
    pub updated_at: DateTime<Utc>,
    /// Escape hatch for non-allowlisted, forward-compatible data.
    #[serde(default)]
    pub extra: BTreeMap<String, Value>,
}

impl TaskMetadata {
    /// I1: set the origin envelope, but only if it is not already set.
    /// Returns `false` (and logs a warning) if an origin was already
    /// present, silently dropping the new value rather than overwriting it.
    pub fn set_origin_once(&mut self, origin: Origin) -> bool {
        if self.origin.is_some() {
            tracing::warn!(
                attempted_kind = ?origin.kind,
                "dropped attempt to overwrite immutable task origin"
            );
            return false;
        }
        self.origin = Some(origin);
        true
    }

    /// I2: `blocked_at` must be set to the same or earlier timestamp as
    /// `blocked_reason`. `backfill_at` is used when the caller does not
    /// supply one explicitly; it must be `metadata.updated_at`, never a
    /// fresh clock read, to preserve causal ordering (section 4.2 step 8).
    pub fn set_blocked(&mut self, reason: impl Into<String>, at: Option<DateTime<Utc>>) {
        self.blocked_reason = Some(reason.into());
        self.blocked_at = Some(at.unwrap_or(self.updated_at));
    }

    pub fn clear_blocked(&mut self) {
        self.blocked_reason = None;
        self.blocked_at = None;
    }

    /// I2 as a predicate: useful for property tests and the finalization
    /// invariant check.
    pub fn satisfies_blocked_invariant(&self) -> bool {
        match (&self.blocked_reason, &self.blocked_at) {
            (Some(_), Some(at)) => *at <= self.updated_at,
            (Some(_), None) => false,
            (None, _) => true,
        }
    }

    /// I1 as a predicate.
    pub fn satisfies_origin_invariant(&self) -> bool {
        self.origin.is_some()
    }
}

/// I7: partition a caller-supplied raw JSON object into the allowlisted
/// subset and the dropped keys (logged by the caller in debug mode).
pub fn filter_allowlisted(raw: Map<String, Value>) -> (Map<String, Value>, Vec<String>) {
    let mut kept = Map::new();
    let mut dropped = Vec::new();
    for (key, value) in raw {
        if METADATA_ALLOWLIST.contains(&key.as_str()) {
            kept.insert(key, value);
        } else {
            dropped.push(key);
        }
    }
    (kept, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_origin_once_is_idempotent() {
        let mut meta = TaskMetadata::default();
        assert!(meta.set_origin_once(Origin::new(OriginKind::Api)));
        assert!(!meta.set_origin_once(Origin::new(OriginKind::Cognition)));
        assert_eq!(meta.origin.unwrap().kind, OriginKind::Api);
    }

    #[test]
    fn test_set_blocked_backfills_from_updated_at_not_fresh_clock() {
        let mut meta = TaskMetadata::default();
        let fixed = meta.updated_at;
        meta.set_blocked("no-executable-plan", None);
        assert_eq!(meta.blocked_at, Some(fixed));
        assert!(meta.satisfies_blocked_invariant());
    }

    #[test]
    fn test_blocked_invariant_violated_without_blocked_at() {
        let mut meta = TaskMetadata::default();
        meta.blocked_reason = Some("x".to_string());
        assert!(!meta.satisfies_blocked_invariant());
    }

    #[test]
    fn test_goal_binding_rekey_preserves_instance_id_and_pushes_alias() {
        let mut binding = GoalBinding::new("build_shelter:1", "build_shelter");
        let instance_id = binding.goal_instance_id;
        binding.rekey("build_shelter:2");
        assert_eq!(binding.goal_instance_id, instance_id);
        assert_eq!(binding.goal_key, "build_shelter:2");
        assert_eq!(binding.goal_key_aliases, vec!["build_shelter:1".to_string()]);
    }

    #[test]
    fn test_anchor_invariant_requires_alias() {
        let mut binding = GoalBinding::new("k", "build_shelter");
        binding.anchors = Some(Anchors {
            site_signature: "5,64,5".to_string(),
        });
        assert!(!binding.satisfies_anchor_invariant());
        binding.goal_key_aliases.push("k0".to_string());
        assert!(binding.satisfies_anchor_invariant());
    }

    #[test]
    fn test_manual_pause_hold_detection() {
        let mut binding = GoalBinding::new("k", "t");
        assert!(!binding.has_manual_pause_hold());
        binding.hold = Some(Hold::new(HoldReason::ManualPause));
        assert!(binding.has_manual_pause_hold());
        binding.hold = Some(Hold::new(HoldReason::Preempted));
        assert!(!binding.has_manual_pause_hold());
    }

    #[test]
    fn test_filter_allowlisted_drops_unknown_keys() {
        let mut raw = Map::new();
        raw.insert("goalKey".to_string(), Value::String("g".to_string()));
        raw.insert("somethingElse".to_string(), Value::Bool(true));
        let (kept, dropped) = filter_allowlisted(raw);
        assert!(kept.contains_key("goalKey"));
        assert_eq!(dropped, vec!["somethingElse".to_string()]);
    }

    #[test]
    fn test_solver_namespace_merge_prefers_other_and_unions_extra() {
        let mut base = SolverNamespace {
            replan_attempts: 1,
            ..SolverNamespace::default()
        };
        base.extra.insert("a".to_string(), Value::Bool(true));

        let mut incoming = SolverNamespace {
            replan_attempts: 2,
            plan_id: Some("plan-1".to_string()),
            ..SolverNamespace::default()
        };
        incoming.extra.insert("b".to_string(), Value::Bool(false));

        base.merge(incoming);
        assert_eq!(base.replan_attempts, 2);
        assert_eq!(base.plan_id.as_deref(), Some("plan-1"));
        assert!(base.extra.contains_key("a"));
        assert!(base.extra.contains_key("b"));
    }
}
