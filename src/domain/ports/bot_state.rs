//! Bot-state read port.
//!
//! A thin, read-only view onto the embodied agent's world: position,
//! inventory, health. Implementations talk to the bot-state HTTP service;
//! timeouts are terminal for the call (section 5) — retrying, where it
//! happens at all, is a decision the calling component makes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::error::BotStateError;

/// Snapshot of world state relevant to step verification and dedup
/// requirement resolution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotStateSnapshot {
    pub position: Option<Position>,
    #[serde(default)]
    pub inventory: Vec<InventoryItem>,
    pub health: Option<f64>,
    pub food: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub name: String,
    pub count: u64,
}

/// Read-only client over the bot's live state.
#[async_trait]
pub trait BotStateClient: Send + Sync {
    /// Fetch the bot's current snapshot at `path` (e.g. `/state`,
    /// `/inventory`), bounded by `timeout_ms`.
    async fn get(&self, path: &str, timeout_ms: u64) -> Result<BotStateSnapshot, BotStateError>;
}
