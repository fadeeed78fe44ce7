//! Goal-binding coordination: syncs status/progress mutations on
//! goal-bound tasks with an external Goal registry.
//!
//! Two halves, per section 4.4: a pure hook reducer that turns a status
//! or progress change into a batch of [`SyncEffect`]s, and an effect
//! drain that applies those batches. The "single serialized async queue"
//! described in the spec is realized structurally here rather than with
//! an internal actor: [`GoalBindingCoordinator::schedule`] is a plain
//! `&mut self` async method, and section 5's single-writer model means it
//! is only ever called, awaited, from the one owning event loop — so
//! sequential calls already get "each batch completes before the next
//! begins" and "B observes A's writes" for free, without a `Mutex` or
//! channel actor guarding `TaskStore`.

use uuid::Uuid;

use crate::domain::models::{GoalBinding, HoldReason, Task, TaskStatus};
use crate::services::event_bus::{EventBus, EventPayload};
use crate::services::status_machine::{MutationOrigin, StatusMachine};
use crate::services::task_store::TaskStore;

/// An effect emitted by the hook reducer, to be applied by the drain.
#[derive(Debug, Clone)]
pub enum SyncEffect {
    UpdateGoalStatus { goal_instance_id: Uuid, status: String },
    UpdateTaskStatus { task_id: Uuid, status: TaskStatus },
    ApplyHold { task_id: Uuid, reason: HoldReason },
    ClearHold { task_id: Uuid },
    Noop { reason: String },
}

/// An external Goal-registry lifecycle action, mirrored onto bound tasks
/// by [`on_goal_action`].
#[derive(Debug, Clone)]
pub enum GoalAction {
    GoalResumed { goal_instance_id: Uuid },
    GoalSuspended { goal_instance_id: Uuid, reason: String },
}

/// Pure reducer: a status transition on a goal-bound task produces zero or
/// more effects. Returns an empty vec for tasks with no binding.
pub fn on_task_status_changed(task: &Task, from: TaskStatus, to: TaskStatus) -> Vec<SyncEffect> {
    let Some(binding) = &task.metadata.goal_binding else {
        return Vec::new();
    };
    if from == to {
        return vec![SyncEffect::Noop {
            reason: "status unchanged".to_string(),
        }];
    }
    match to {
        TaskStatus::Completed => vec![SyncEffect::UpdateGoalStatus {
            goal_instance_id: binding.goal_instance_id,
            status: "satisfied".to_string(),
        }],
        TaskStatus::Failed | TaskStatus::Unplannable => vec![SyncEffect::UpdateGoalStatus {
            goal_instance_id: binding.goal_instance_id,
            status: "at_risk".to_string(),
        }],
        _ => vec![SyncEffect::Noop {
            reason: format!("no goal sync needed for {}", to.as_str()),
        }],
    }
}

/// Pure reducer for bare progress updates (no status change) on
/// goal-bound tasks; currently a thin passthrough, kept distinct from
/// [`on_task_status_changed`] because the two fire from different call
/// sites in `StatusMachine::update_progress`.
pub fn on_task_progress_updated(task: &Task, progress: f64) -> Vec<SyncEffect> {
    if task.metadata.goal_binding.is_none() {
        return Vec::new();
    }
    vec![SyncEffect::Noop {
        reason: format!("progress update {progress:.2} does not change goal status"),
    }]
}

/// Handles an external Goal-registry action, possibly against many tasks
/// bound to that goal instance. Implements the I6 manual-pause hard wall:
/// `goal_resumed` against a task whose `hold.reason == manual_pause`
/// produces a `noop`, never a `clear_hold`.
pub fn on_goal_action(action: &GoalAction, tasks: &[&Task]) -> Vec<SyncEffect> {
    match action {
        GoalAction::GoalResumed { goal_instance_id } => tasks
            .iter()
            .filter(|t| bound_to(t, *goal_instance_id))
            .map(|t| {
                if t.metadata
                    .goal_binding
                    .as_ref()
                    .is_some_and(GoalBinding::has_manual_pause_hold)
                {
                    SyncEffect::Noop {
                        reason: "manual_pause hard wall".to_string(),
                    }
                } else {
                    SyncEffect::ClearHold { task_id: t.id }
                }
            })
            .collect(),
        GoalAction::GoalSuspended { goal_instance_id, reason } => tasks
            .iter()
            .filter(|t| bound_to(t, *goal_instance_id))
            .map(|t| SyncEffect::ApplyHold {
                task_id: t.id,
                reason: HoldReason::Other(reason.clone()),
            })
            .collect(),
    }
}

fn bound_to(task: &Task, goal_instance_id: Uuid) -> bool {
    task.metadata
        .goal_binding
        .as_ref()
        .is_some_and(|b| b.goal_instance_id == goal_instance_id)
}

/// Applies scheduled [`SyncEffect`] batches against the store.
pub struct GoalBindingCoordinator;

impl GoalBindingCoordinator {
    /// Apply a batch of effects to completion. Metadata effects
    /// (`apply_hold`/`clear_hold`/`noop`) are applied directly; status
    /// effects go through `StatusMachine::update_status` with
    /// `MutationOrigin::Protocol` to suppress hook re-entry. A failure on
    /// one effect is logged with `may_be_partial=true` and does not abort
    /// the rest of the batch.
    pub fn schedule(store: &mut TaskStore, events: &EventBus, effects: Vec<SyncEffect>) {
        for effect in effects {
            match effect {
                SyncEffect::ApplyHold { task_id, reason } => {
                    if let Some(task) = store.get_mut(task_id) {
                        if let Some(binding) = &mut task.metadata.goal_binding {
                            binding.hold = Some(crate::domain::models::Hold::new(reason));
                        } else {
                            tracing::warn!(task_id = %task_id, may_be_partial = true, "apply_hold on unbound task");
                        }
                    } else {
                        tracing::warn!(task_id = %task_id, may_be_partial = true, "apply_hold on unknown task");
                    }
                }
                SyncEffect::ClearHold { task_id } => {
                    if let Some(task) = store.get_mut(task_id) {
                        if let Some(binding) = &mut task.metadata.goal_binding {
                            binding.hold = None;
                        }
                    } else {
                        tracing::warn!(task_id = %task_id, may_be_partial = true, "clear_hold on unknown task");
                    }
                }
                SyncEffect::UpdateTaskStatus { task_id, status } => {
                    let mut machine = StatusMachine::new(store, events);
                    machine.update_status(task_id, status, MutationOrigin::Protocol);
                }
                SyncEffect::UpdateGoalStatus { goal_instance_id, status } => {
                    events.publish(EventPayload::TaskLifecycleEvent {
                        event_type: "goal_status_sync".to_string(),
                        task_id: goal_instance_id,
                        reason: Some(status),
                        advice: None,
                    });
                }
                SyncEffect::Noop { reason } => {
                    tracing::debug!(reason, "goal binding effect noop");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{GoalBinding, Hold, TaskSource};
    use crate::services::task_store::PutOptions;

    fn bound_task() -> Task {
        let mut task = Task::new("Build shelter", "d").with_source(TaskSource::Goal);
        task.metadata.goal_binding = Some(GoalBinding::new("build_shelter:1", "build_shelter"));
        task
    }

    #[test]
    fn test_unbound_task_produces_no_effects() {
        let task = Task::new("t", "d");
        let effects = on_task_status_changed(&task, TaskStatus::Pending, TaskStatus::Active);
        assert!(effects.is_empty());
    }

    #[test]
    fn test_completed_transition_produces_update_goal_status_satisfied() {
        let task = bound_task();
        let effects = on_task_status_changed(&task, TaskStatus::Active, TaskStatus::Completed);
        assert_eq!(effects.len(), 1);
        assert!(matches!(
            effects[0],
            SyncEffect::UpdateGoalStatus { ref status, .. } if status == "satisfied"
        ));
    }

    #[test]
    fn test_manual_pause_hard_wall_against_goal_resumed() {
        let mut task = bound_task();
        task.metadata.goal_binding.as_mut().unwrap().hold = Some(Hold::new(HoldReason::ManualPause));
        let goal_instance_id = task.metadata.goal_binding.as_ref().unwrap().goal_instance_id;
        let effects = on_goal_action(&GoalAction::GoalResumed { goal_instance_id }, &[&task]);
        assert_eq!(effects.len(), 1);
        assert!(matches!(effects[0], SyncEffect::Noop { .. }));
    }

    #[test]
    fn test_goal_resumed_clears_non_manual_hold() {
        let mut task = bound_task();
        task.metadata.goal_binding.as_mut().unwrap().hold = Some(Hold::new(HoldReason::Preempted));
        let goal_instance_id = task.metadata.goal_binding.as_ref().unwrap().goal_instance_id;
        let effects = on_goal_action(&GoalAction::GoalResumed { goal_instance_id }, &[&task]);
        assert!(matches!(effects[0], SyncEffect::ClearHold { .. }));
    }

    #[test]
    fn test_schedule_apply_hold_then_clear_hold_is_ordered() {
        let mut store = TaskStore::new(10, false);
        let events = EventBus::default();
        let task = bound_task();
        let id = task.id;
        store.put(task, PutOptions::default());

        GoalBindingCoordinator::schedule(
            &mut store,
            &events,
            vec![SyncEffect::ApplyHold {
                task_id: id,
                reason: HoldReason::Preempted,
            }],
        );
        assert!(store.get(id).unwrap().metadata.goal_binding.as_ref().unwrap().hold.is_some());

        GoalBindingCoordinator::schedule(&mut store, &events, vec![SyncEffect::ClearHold { task_id: id }]);
        assert!(store.get(id).unwrap().metadata.goal_binding.as_ref().unwrap().hold.is_none());
    }
}
