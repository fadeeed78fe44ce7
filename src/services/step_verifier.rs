//! Step verification engine.
//!
//! Invoked by the executor boundary around each [`TaskStep`] (section
//! 4.5): captures a pre-step world-state snapshot, runs the Rig G
//! feasibility gate, and on completion diffs a fresh snapshot against the
//! captured one to decide whether the step actually happened, rather than
//! trusting the executor's own report.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::error::VerificationError;
use crate::domain::models::{StepStatus, Task};
use crate::domain::ports::{BotStateClient, BotStateSnapshot};

/// Captured at step start, diffed against a fresh fetch at completion.
#[derive(Debug, Clone)]
pub struct StepSnapshot {
    pub position: Option<(f64, f64, f64)>,
    pub food: Option<f64>,
    pub health: Option<f64>,
    pub inventory_total: u64,
    pub inventory_by_name: HashMap<String, u64>,
    pub ts: DateTime<Utc>,
}

/// Item and block identifiers on the wire carry a `minecraft:` namespace
/// prefix the bot-state service doesn't strip; comparisons in this module
/// are all unprefixed.
fn strip_namespace(name: &str) -> &str {
    name.strip_prefix("minecraft:").unwrap_or(name)
}

impl From<&BotStateSnapshot> for StepSnapshot {
    fn from(s: &BotStateSnapshot) -> Self {
        let mut by_name = HashMap::new();
        let mut total = 0u64;
        for item in &s.inventory {
            *by_name.entry(strip_namespace(&item.name).to_string()).or_insert(0) += item.count;
            total += item.count;
        }
        Self {
            position: s.position.map(|p| (p.x, p.y, p.z)),
            food: s.food,
            health: s.health,
            inventory_total: total,
            inventory_by_name: by_name,
            ts: Utc::now(),
        }
    }
}

/// Result recorded in the `(task_id, step_id)`-keyed verification index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionVerification {
    Verified,
    Skipped,
    Failed,
}

/// Coarse routing over a step's effective leaf name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeafClass {
    Movement,
    InventoryProducing,
    BlockPlacement,
    ConsumeFood,
    SensingOrPlanning,
    Unmapped,
}

const INVENTORY_LEAVES: &[&str] = &["dig_block", "acquire_material", "craft_recipe", "smelt", "pickup_item"];
const MOVEMENT_LEAVES: &[&str] = &["navigate_to", "move_to", "walk_to", "pathfind"];
const PLACEMENT_PREFIX: &str = "place_";
const SENSING_LEAVES: &[&str] = &["look_around", "inspect", "scan_area", "plan_layout"];

fn classify_leaf(leaf: &str) -> LeafClass {
    if INVENTORY_LEAVES.contains(&leaf) {
        LeafClass::InventoryProducing
    } else if MOVEMENT_LEAVES.contains(&leaf) {
        LeafClass::Movement
    } else if leaf.starts_with(PLACEMENT_PREFIX) {
        LeafClass::BlockPlacement
    } else if leaf == "consume_food" || leaf == "eat" {
        LeafClass::ConsumeFood
    } else if SENSING_LEAVES.contains(&leaf) {
        LeafClass::SensingOrPlanning
    } else {
        LeafClass::Unmapped
    }
}

/// The item name a player's inventory actually receives for digging a
/// given ore block, where that differs from the block's own name.
fn ore_drop(block_name: &str) -> Option<&'static str> {
    match block_name {
        "iron_ore" | "deepslate_iron_ore" => Some("raw_iron"),
        "gold_ore" | "deepslate_gold_ore" => Some("raw_gold"),
        "copper_ore" | "deepslate_copper_ore" => Some("raw_copper"),
        "coal_ore" | "deepslate_coal_ore" => Some("coal"),
        "diamond_ore" | "deepslate_diamond_ore" => Some("diamond"),
        "emerald_ore" | "deepslate_emerald_ore" => Some("emerald"),
        "lapis_ore" | "deepslate_lapis_ore" => Some("lapis_lazuli"),
        "redstone_ore" | "deepslate_redstone_ore" => Some("redstone"),
        _ => None,
    }
}

/// Maps an ore-bearing block/drop name to the item names a player
/// actually receives, including the ore-drop map and the wood-group
/// expansion (`*_log` -> `log`/`wood`) named in section 4.5.
fn accepted_item_names(leaf_item: &str) -> Vec<String> {
    let leaf_item = strip_namespace(leaf_item);
    let mut names = vec![leaf_item.to_string()];
    if leaf_item.ends_with("_log") {
        names.push("log".to_string());
        names.push("wood".to_string());
    }
    if let Some(drop) = ore_drop(leaf_item) {
        names.push(drop.to_string());
    }
    names
}

pub struct StepVerifierConfig {
    pub movement_min_delta: f64,
    pub dig_acquire_timeout: Duration,
    pub craft_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for StepVerifierConfig {
    fn default() -> Self {
        Self {
            movement_min_delta: 0.75,
            dig_acquire_timeout: Duration::from_secs(20),
            craft_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(400),
        }
    }
}

pub struct StepVerifier {
    bot_state: Arc<dyn BotStateClient>,
    config: StepVerifierConfig,
    snapshots: HashMap<(Uuid, Uuid), StepSnapshot>,
    verification_index: HashMap<(Uuid, Uuid), ActionVerification>,
}

impl StepVerifier {
    pub fn new(bot_state: Arc<dyn BotStateClient>, config: StepVerifierConfig) -> Self {
        Self {
            bot_state,
            config,
            snapshots: HashMap::new(),
            verification_index: HashMap::new(),
        }
    }

    /// Pre-step: the Rig G feasibility gate, then (unless `dry_run`) a
    /// captured snapshot. Returns `false` when the feasibility gate
    /// rejects the task — the caller is responsible for transitioning it
    /// to `unplannable` and scheduling a replan.
    pub async fn start_task_step(
        &mut self,
        task: &mut Task,
        step_id: Uuid,
        dry_run: bool,
    ) -> Result<bool, VerificationError> {
        if let Some(signals) = task.metadata.solver.rig_g.clone() {
            if !task.metadata.solver.rig_g_checked {
                if !signals.feasibility_passed {
                    let rejection_key = signals
                        .rejection
                        .keys()
                        .next()
                        .cloned()
                        .unwrap_or_else(|| "unknown".to_string());
                    task.metadata
                        .set_blocked(format!("Feasibility failed: {rejection_key}"), None);
                    return Ok(false);
                }
                task.metadata.solver.rig_g_checked = true;
                task.metadata.solver.suggested_parallelism =
                    signals.ready_set_size_p95.map(|p95| p95.round() as u32);
            }
        }

        if dry_run {
            tracing::debug!(task_id = %task.id, %step_id, "shadow_rig_g_evaluation");
            return Ok(true);
        }

        let snapshot = self.bot_state.get("/state", 5000).await?;
        self.snapshots
            .insert((task.id, step_id), StepSnapshot::from(&snapshot));

        if let Some(step) = task.steps.iter_mut().find(|s| s.step_id == step_id) {
            step.status = StepStatus::Started;
        }
        Ok(true)
    }

    /// Post-step: derive the effective leaf, dispatch to the matching
    /// verification strategy, and record the outcome.
    pub async fn complete_task_step(
        &mut self,
        task: &mut Task,
        step_id: Uuid,
        skip_verification: bool,
    ) -> Result<ActionVerification, VerificationError> {
        let Some(step) = task.steps.iter().find(|s| s.step_id == step_id) else {
            return Err(VerificationError::NoLeafDerivable(step_id.to_string()));
        };

        if skip_verification {
            self.record(task.id, step_id, ActionVerification::Skipped);
            self.mark_completed(task, step_id);
            return Ok(ActionVerification::Skipped);
        }

        let Some(leaf) = step.meta.leaf.clone() else {
            if step.meta.executable {
                return Err(VerificationError::NoLeafDerivable(
                    step.meta.intent.clone().unwrap_or_else(|| "unknown".to_string()),
                ));
            }
            self.record(task.id, step_id, ActionVerification::Skipped);
            self.mark_completed(task, step_id);
            return Ok(ActionVerification::Skipped);
        };

        let snapshot = self
            .snapshots
            .get(&(task.id, step_id))
            .cloned()
            .ok_or_else(|| VerificationError::NoLeafDerivable(leaf.clone()))?;

        let result = match classify_leaf(&leaf) {
            LeafClass::Movement => self.verify_movement(&snapshot).await?,
            LeafClass::InventoryProducing => {
                let step = task.steps.iter().find(|s| s.step_id == step_id);
                let produces = step.map(|s| s.meta.produces.clone()).unwrap_or_default();
                // `dig_block` is a generic action name, not an item: the
                // block actually dug is carried in its args, not the leaf.
                let item_key = if leaf == "dig_block" {
                    step.and_then(|s| s.meta.args.as_ref())
                        .and_then(|args| args.get("blockType"))
                        .and_then(serde_json::Value::as_str)
                        .map(ToString::to_string)
                        .unwrap_or_else(|| leaf.clone())
                } else {
                    leaf.clone()
                };
                self.verify_inventory_delta(&item_key, &produces, &snapshot).await?
            }
            LeafClass::BlockPlacement => self.verify_block_placement(&leaf).await?,
            LeafClass::ConsumeFood => self.verify_consume_food(&snapshot).await?,
            LeafClass::SensingOrPlanning => ActionVerification::Verified,
            LeafClass::Unmapped => {
                return Err(VerificationError::NoLeafDerivable(leaf));
            }
        };

        self.record(task.id, step_id, result);
        self.snapshots.remove(&(task.id, step_id));

        if result != ActionVerification::Failed {
            self.mark_completed(task, step_id);
        }
        Ok(result)
    }

    async fn verify_movement(&self, snapshot: &StepSnapshot) -> Result<ActionVerification, VerificationError> {
        let fresh = self.bot_state.get("/state", 5000).await?;
        let Some((sx, sy, sz)) = snapshot.position else {
            return Ok(ActionVerification::Failed);
        };
        let Some(p) = fresh.position else {
            return Ok(ActionVerification::Failed);
        };
        let delta = ((p.x - sx).powi(2) + (p.y - sy).powi(2) + (p.z - sz).powi(2)).sqrt();
        Ok(if delta >= self.config.movement_min_delta {
            ActionVerification::Verified
        } else {
            ActionVerification::Failed
        })
    }

    async fn verify_inventory_delta(
        &self,
        leaf_item: &str,
        produces: &[String],
        snapshot: &StepSnapshot,
    ) -> Result<ActionVerification, VerificationError> {
        let mut accepted: Vec<String> = produces.to_vec();
        accepted.extend(accepted_item_names(leaf_item));

        let fresh = self.bot_state.get("/inventory", 5000).await?;
        let fresh_snapshot = StepSnapshot::from(&fresh);

        let before: u64 = accepted
            .iter()
            .map(|n| snapshot.inventory_by_name.get(n).copied().unwrap_or(0))
            .sum();
        let after: u64 = accepted
            .iter()
            .map(|n| fresh_snapshot.inventory_by_name.get(n).copied().unwrap_or(0))
            .sum();

        Ok(if after >= before + 1 {
            ActionVerification::Verified
        } else {
            ActionVerification::Failed
        })
    }

    async fn verify_block_placement(&self, _leaf: &str) -> Result<ActionVerification, VerificationError> {
        // Placement verification depends on a `nearby_blocks` read that
        // this crate's BotStateClient port does not (yet) expose;
        // auto-pass until that surface is added.
        Ok(ActionVerification::Verified)
    }

    async fn verify_consume_food(&self, snapshot: &StepSnapshot) -> Result<ActionVerification, VerificationError> {
        let fresh = self.bot_state.get("/state", 5000).await?;
        let (Some(before), Some(after)) = (snapshot.food, fresh.food) else {
            return Ok(ActionVerification::Failed);
        };
        Ok(if after > before {
            ActionVerification::Verified
        } else {
            ActionVerification::Failed
        })
    }

    fn record(&mut self, task_id: Uuid, step_id: Uuid, result: ActionVerification) {
        self.verification_index.insert((task_id, step_id), result);
    }

    fn mark_completed(&self, task: &mut Task, step_id: Uuid) {
        if let Some(step) = task.steps.iter_mut().find(|s| s.step_id == step_id) {
            step.status = StepStatus::Completed;
        }
    }

    pub fn verification_of(&self, task_id: Uuid, step_id: Uuid) -> Option<ActionVerification> {
        self.verification_index.get(&(task_id, step_id)).copied()
    }

    /// Final whole-inventory gate (section 4.5): when the task declares a
    /// structured requirement with an output item+quantity, refuse to
    /// complete on an under-count rather than marking the task done.
    pub async fn final_inventory_gate(
        &self,
        required_item: &str,
        required_qty: u64,
    ) -> Result<(), VerificationError> {
        let fresh = self.bot_state.get("/inventory", 5000).await?;
        let snapshot = StepSnapshot::from(&fresh);
        let found = snapshot
            .inventory_by_name
            .get(required_item)
            .copied()
            .unwrap_or(0);
        if found < required_qty {
            return Err(VerificationError::InventoryUnderCount {
                expected: required_qty,
                found,
            });
        }
        Ok(())
    }
}
