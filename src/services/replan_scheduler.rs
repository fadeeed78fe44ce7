//! Bounded, idempotent replan scheduling for `unplannable` tasks.
//!
//! Holds a `task_id -> timer handle` map plus the in-flight marker
//! mirrored onto `task.metadata.solver.rig_g_replan` (section 4.6). Timer
//! cleanup is guaranteed via an RAII guard dropped at the end of the fire
//! handler, mirroring the teacher's background-task cleanup convention in
//! `event_scheduler.rs`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain::error::TaskError;
use crate::domain::models::metadata::ReplanMarker;
use crate::domain::models::Task;

const MAX_REPLAN_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_secs(5);

/// Outcome of a [`ReplanScheduler::schedule_replan`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Scheduled,
    AlreadyScheduled,
    Exhausted,
}

/// RAII guard that removes a task's in-flight marker when dropped,
/// guaranteeing cleanup regardless of how the fire handler exits.
struct TimerGuard {
    task_id: Uuid,
    in_flight: Arc<Mutex<HashMap<Uuid, tokio::task::JoinHandle<()>>>>,
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        if let Ok(mut map) = self.in_flight.lock() {
            map.remove(&self.task_id);
        }
    }
}

/// Schedules bounded replan attempts and notifies the owning event loop
/// via `fired_tx` when a timer elapses; the loop re-fetches the task and
/// decides what to do next (section 5 lists replan callbacks as a
/// suspension point that resumes on the owning loop, not inline here).
pub struct ReplanScheduler {
    timers: Arc<Mutex<HashMap<Uuid, tokio::task::JoinHandle<()>>>>,
    fired_tx: mpsc::UnboundedSender<Uuid>,
}

impl ReplanScheduler {
    pub fn new(fired_tx: mpsc::UnboundedSender<Uuid>) -> Self {
        Self {
            timers: Arc::new(Mutex::new(HashMap::new())),
            fired_tx,
        }
    }

    /// Section 4.6's schedule contract. Mutates `task.metadata.solver`
    /// bookkeeping in place; the caller is responsible for persisting the
    /// task back to the store (it's already a `&mut Task` into it).
    pub fn schedule_replan(&self, task: &mut Task) -> Result<ScheduleOutcome, TaskError> {
        if task.metadata.solver.replan_attempts >= MAX_REPLAN_ATTEMPTS {
            task.metadata
                .set_blocked("rig_g_replan_exhausted", None);
            tracing::warn!(task_id = %task.id, "rig_g_replan_exhausted");
            return Ok(ScheduleOutcome::Exhausted);
        }

        if task
            .metadata
            .solver
            .rig_g_replan
            .as_ref()
            .is_some_and(|m| m.in_flight)
        {
            tracing::debug!(task_id = %task.id, "replan already scheduled");
            return Ok(ScheduleOutcome::AlreadyScheduled);
        }

        let attempt = task.metadata.solver.replan_attempts + 1;
        task.metadata.solver.replan_attempts = attempt;
        task.metadata.solver.rig_g_replan = Some(ReplanMarker {
            in_flight: true,
            attempt,
            scheduled_at: Utc::now(),
        });

        let backoff = INITIAL_BACKOFF * attempt.max(1);
        let task_id = task.id;
        let tx = self.fired_tx.clone();
        let timers = Arc::clone(&self.timers);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(backoff).await;
            let _guard = TimerGuard {
                task_id,
                in_flight: Arc::clone(&timers),
            };
            let _ = tx.send(task_id);
        });

        if let Ok(mut map) = self.timers.lock() {
            map.insert(task_id, handle);
        }

        Ok(ScheduleOutcome::Scheduled)
    }

    /// Cancel a pending replan timer (e.g. the task left `unplannable`
    /// some other way).
    pub fn cancel(&self, task_id: Uuid) {
        if let Ok(mut map) = self.timers.lock() {
            if let Some(handle) = map.remove(&task_id) {
                handle.abort();
            }
        }
    }

    pub fn has_pending_timer(&self, task_id: Uuid) -> bool {
        self.timers.lock().map(|m| m.contains_key(&task_id)).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::TaskStatus;

    #[tokio::test]
    async fn test_schedule_replan_exhausts_after_three_attempts() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let scheduler = ReplanScheduler::new(tx);
        let mut task = Task::new("t", "d");
        task.force_status(TaskStatus::Unplannable, "test");

        for _ in 0..3 {
            let outcome = scheduler.schedule_replan(&mut task).unwrap();
            assert_eq!(outcome, ScheduleOutcome::Scheduled);
            task.metadata.solver.rig_g_replan = None; // simulate timer firing and clearing
        }
        let outcome = scheduler.schedule_replan(&mut task).unwrap();
        assert_eq!(outcome, ScheduleOutcome::Exhausted);
    }

    #[tokio::test]
    async fn test_schedule_replan_is_idempotent_while_in_flight() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let scheduler = ReplanScheduler::new(tx);
        let mut task = Task::new("t", "d");

        let first = scheduler.schedule_replan(&mut task).unwrap();
        assert_eq!(first, ScheduleOutcome::Scheduled);
        let second = scheduler.schedule_replan(&mut task).unwrap();
        assert_eq!(second, ScheduleOutcome::AlreadyScheduled);
    }

    #[tokio::test]
    async fn test_cancel_removes_pending_timer() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let scheduler = ReplanScheduler::new(tx);
        let mut task = Task::new("t", "d");
        scheduler.schedule_replan(&mut task).unwrap();
        assert!(scheduler.has_pending_timer(task.id));
        scheduler.cancel(task.id);
        assert!(!scheduler.has_pending_timer(task.id));
    }
}
