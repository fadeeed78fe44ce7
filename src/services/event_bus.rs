//! Event bus for the task lifecycle core's subscription surface.
//!
//! A broadcast-based event system: every lifecycle mutation (section 6's
//! "exposed operations") publishes a [`LifecycleEvent`] that external
//! subscribers (a dashboard, the executor boundary) can observe. No
//! persistence — section 5 rules out disk state for this crate, so unlike
//! the teacher's event store this bus is purely in-memory and
//! best-effort: a publish with no subscribers is simply dropped.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Monotonically increasing sequence number assigned by [`EventBus::publish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SequenceNumber(pub u64);

/// Thin lifecycle-event payload, per section 6's "thin payload invariant":
/// full `Task` objects are never embedded, only identifiers and labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    TaskAdded {
        task_id: Uuid,
        task_type: String,
        source: String,
        has_goal_binding: bool,
        origin_kind: Option<String>,
        title: String,
    },
    TaskProgressUpdated {
        task_id: Uuid,
        progress: f64,
        status: String,
    },
    TaskMetadataUpdated {
        task_id: Uuid,
    },
    TaskStepStarted {
        task_id: Uuid,
        step_id: Uuid,
    },
    TaskStepCompleted {
        task_id: Uuid,
        step_id: Uuid,
    },
    TaskStepsInserted {
        task_id: Uuid,
        count: usize,
    },
    TaskLifecycleEvent {
        event_type: String,
        task_id: Uuid,
        reason: Option<String>,
        advice: Option<String>,
    },
    ThoughtConvertedToTask {
        thought_id: String,
        task_id: Uuid,
    },
    GoalBindingDrift {
        task_id: Uuid,
        reason: String,
    },
}

/// Envelope wrapping a payload with bus-assigned metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub id: Uuid,
    pub sequence: SequenceNumber,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

/// Central broadcast bus for lifecycle events.
pub struct EventBus {
    sender: broadcast::Sender<LifecycleEvent>,
    sequence: AtomicU64,
}

impl EventBus {
    pub fn new(channel_capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(channel_capacity);
        Self {
            sender,
            sequence: AtomicU64::new(0),
        }
    }

    /// Publish a payload, assigning it the next sequence number. Ignores
    /// the "no subscribers" send error — publishing is fire-and-forget.
    pub fn publish(&self, payload: EventPayload) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let event = LifecycleEvent {
            id: Uuid::new_v4(),
            sequence: SequenceNumber(seq),
            timestamp: Utc::now(),
            payload,
        };
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    pub fn current_sequence(&self) -> SequenceNumber {
        SequenceNumber(self.sequence.load(Ordering::SeqCst))
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
