//! Authoritative mutator for `task.status` and `task.progress`.
//!
//! Every status/progress write in the crate goes through here rather than
//! touching `Task` fields directly, so the transition table and the
//! goal-binding hook firing policy stay centralized.

use uuid::Uuid;

use crate::domain::models::{Task, TaskStatus};
use crate::services::event_bus::{EventBus, EventPayload};
use crate::services::task_store::TaskStore;

/// Distinguishes a mutation driven by the executor/runtime from one driven
/// by [`crate::services::goal_binding::GoalBindingCoordinator`]'s effect
/// drain. `Runtime` fires goal-binding hooks; `Protocol` suppresses them to
/// prevent re-entry from the drain re-triggering itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOrigin {
    Runtime,
    Protocol,
}

/// Outcome of a status/progress mutation attempt.
#[derive(Debug, Clone)]
pub enum MutationOutcome {
    /// Applied; carries the prior status so callers (the hook reducer) can
    /// fire status-changed hooks on `Runtime`-origin mutations.
    Applied { from: TaskStatus, to: TaskStatus },
    /// No-op: unknown id, or the mutation requested no real change.
    NoOp,
    /// No-op because the target task is terminal; logged, not an error.
    TerminalSuppressed,
}

pub struct StatusMachine<'a> {
    store: &'a mut TaskStore,
    events: &'a EventBus,
}

impl<'a> StatusMachine<'a> {
    pub fn new(store: &'a mut TaskStore, events: &'a EventBus) -> Self {
        Self { store, events }
    }

    /// Clamp `progress` to `[0, 1]`, optionally apply `status`, and update
    /// the lifecycle timestamps. Unknown ids and terminal-task mutations
    /// both return quietly (section 4.3's failure semantics) rather than
    /// erroring — callers that need to distinguish "not found" from
    /// "suppressed" should inspect [`MutationOutcome`].
    pub fn update_progress(
        &mut self,
        id: Uuid,
        progress: f64,
        status: Option<TaskStatus>,
        origin: MutationOrigin,
    ) -> MutationOutcome {
        let Some(task) = self.store.get_mut(id) else {
            return MutationOutcome::NoOp;
        };

        if task.status.is_terminal() {
            tracing::info!(task_id = %id, status = task.status.as_str(), "terminal_mutation_suppressed");
            return MutationOutcome::TerminalSuppressed;
        }

        let from = task.status;
        task.set_progress(progress);

        let outcome = if let Some(new_status) = status {
            if new_status == from {
                MutationOutcome::NoOp
            } else if task.transition_to(new_status).is_ok() {
                MutationOutcome::Applied { from, to: new_status }
            } else {
                tracing::warn!(
                    task_id = %id,
                    from = from.as_str(),
                    to = new_status.as_str(),
                    "rejected illegal status transition"
                );
                MutationOutcome::NoOp
            }
        } else {
            MutationOutcome::NoOp
        };

        self.events.publish(EventPayload::TaskProgressUpdated {
            task_id: id,
            progress: task.progress,
            status: task.status.as_str().to_string(),
        });

        if origin == MutationOrigin::Runtime {
            if let MutationOutcome::Applied { from, to } = outcome {
                self.events.publish(EventPayload::TaskLifecycleEvent {
                    event_type: "task_status_changed".to_string(),
                    task_id: id,
                    reason: None,
                    advice: None,
                });
                let _ = (from, to); // consumed by the goal-binding hook reducer upstream
            }
        }

        outcome
    }

    pub fn update_status(&mut self, id: Uuid, status: TaskStatus, origin: MutationOrigin) -> MutationOutcome {
        let progress = self.store.get(id).map_or(0.0, |t| t.progress);
        self.update_progress(id, progress, Some(status), origin)
    }

    pub fn complete(&mut self, id: Uuid, origin: MutationOrigin) -> MutationOutcome {
        self.update_progress(id, 1.0, Some(TaskStatus::Completed), origin)
    }

    pub fn fail(&mut self, id: Uuid, reason: impl Into<String>, origin: MutationOrigin) -> MutationOutcome {
        let reason = reason.into();
        if let Some(task) = self.store.get_mut(id) {
            task.metadata.set_blocked(reason, None);
        }
        let progress = self.store.get(id).map_or(0.0, |t| t.progress);
        self.update_progress(id, progress, Some(TaskStatus::Failed), origin)
    }

    /// I2-preserving blocked-state entry: backfills `blocked_at` from
    /// `metadata.updated_at`, never a fresh clock read (section 4.2 step 8).
    pub fn reopen_blocked(&mut self, id: Uuid, reason: impl Into<String>) {
        if let Some(task) = self.store.get_mut(id) {
            task.metadata.set_blocked(reason, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::task_store::{PutOptions, TaskStore};

    fn setup() -> (TaskStore, EventBus) {
        (TaskStore::new(100, false), EventBus::default())
    }

    #[test]
    fn test_update_status_on_unknown_id_is_noop() {
        let (mut store, events) = setup();
        let mut machine = StatusMachine::new(&mut store, &events);
        let outcome = machine.update_status(Uuid::new_v4(), TaskStatus::Active, MutationOrigin::Runtime);
        assert!(matches!(outcome, MutationOutcome::NoOp));
    }

    #[test]
    fn test_terminal_mutation_is_suppressed() {
        let (mut store, events) = setup();
        let mut task = Task::new("t", "d");
        task.transition_to(TaskStatus::Completed).unwrap();
        let id = task.id;
        store.put(task, PutOptions::default());

        let mut machine = StatusMachine::new(&mut store, &events);
        let outcome = machine.update_status(id, TaskStatus::Active, MutationOrigin::Runtime);
        assert!(matches!(outcome, MutationOutcome::TerminalSuppressed));
    }

    #[test]
    fn test_complete_sets_progress_to_one() {
        let (mut store, events) = setup();
        let task = Task::new("t", "d");
        let id = task.id;
        store.put(task, PutOptions::default());

        let mut machine = StatusMachine::new(&mut store, &events);
        machine.complete(id, MutationOrigin::Runtime);
        let task = store.get(id).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.progress, 1.0);
    }

    #[test]
    fn test_illegal_transition_is_rejected_not_panicking() {
        let (mut store, events) = setup();
        let mut task = Task::new("t", "d");
        task.transition_to(TaskStatus::Unplannable).unwrap();
        let id = task.id;
        store.put(task, PutOptions::default());

        let mut machine = StatusMachine::new(&mut store, &events);
        let outcome = machine.update_status(id, TaskStatus::Active, MutationOrigin::Runtime);
        assert!(matches!(outcome, MutationOutcome::NoOp));
        assert_eq!(store.get(id).unwrap().status, TaskStatus::Unplannable);
    }
}
