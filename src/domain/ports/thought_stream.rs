//! Cognitive thought-stream port.
//!
//! Polled by the ingestion pipeline for autonomously generated intent
//! (section 2, `source == cognition`). Failures degrade to an empty batch
//! rather than propagating — a stalled thought stream should not block
//! ingestion of tasks from other sources.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single raw cognitive thought awaiting conversion into a `Task`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thought {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

#[async_trait]
pub trait ThoughtStream: Send + Sync {
    /// Poll for thoughts not yet converted into tasks. Returns an empty
    /// vector on any transport failure rather than erroring.
    async fn get_actionable(&self) -> Vec<Thought>;

    /// Mark the given thought ids as processed. Fire-and-forget: failures
    /// are absorbed by an outbox queue in the adapter, never surfaced here.
    async fn ack(&self, ids: &[String]);
}
