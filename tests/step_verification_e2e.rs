//! End-to-end step verification: a full start/complete cycle against a fake
//! bot-state collaborator, plus the final whole-inventory gate.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use task_lifecycle_core::domain::error::BotStateError;
use task_lifecycle_core::domain::models::{StepMeta, Task, TaskStep};
use task_lifecycle_core::domain::ports::{BotStateClient, BotStateSnapshot, InventoryItem, Position};
use task_lifecycle_core::services::step_verifier::{ActionVerification, StepVerifier, StepVerifierConfig};

struct ScriptedBotState {
    snapshots: Mutex<Vec<BotStateSnapshot>>,
}

#[async_trait]
impl BotStateClient for ScriptedBotState {
    async fn get(&self, _path: &str, _timeout_ms: u64) -> Result<BotStateSnapshot, BotStateError> {
        let mut guard = self.snapshots.lock().unwrap();
        if guard.len() > 1 {
            Ok(guard.remove(0))
        } else {
            Ok(guard.first().cloned().unwrap_or_default())
        }
    }
}

/// Scenario 5: digging an ore block that yields a differently-named item
/// (the drop, not the block) verifies via the ore-drop map keyed off
/// `meta.args.blockType`, against a freshly-fetched inventory whose item
/// names carry the `minecraft:` namespace prefix.
#[tokio::test]
async fn inventory_delta_verification_matches_ore_drop_item() {
    let bot = Arc::new(ScriptedBotState {
        snapshots: Mutex::new(vec![
            BotStateSnapshot {
                position: Some(Position { x: 0.0, y: 64.0, z: 0.0 }),
                inventory: vec![],
                health: Some(20.0),
                food: Some(20.0),
            },
            BotStateSnapshot {
                position: Some(Position { x: 0.0, y: 64.0, z: 0.0 }),
                inventory: vec![InventoryItem { name: "minecraft:coal".to_string(), count: 1 }],
                health: Some(20.0),
                food: Some(20.0),
            },
        ]),
    });

    let mut verifier = StepVerifier::new(bot, StepVerifierConfig::default());
    let mut task = Task::new("Mine coal ore", "d").with_steps(vec![TaskStep::new(
        0,
        StepMeta {
            leaf: Some("dig_block".to_string()),
            executable: true,
            args: Some(serde_json::json!({ "blockType": "minecraft:coal_ore" })),
            ..StepMeta::default()
        },
    )]);
    let step_id = task.steps[0].step_id;

    let allowed = verifier.start_task_step(&mut task, step_id, false).await.unwrap();
    assert!(allowed);

    let result = verifier.complete_task_step(&mut task, step_id, false).await.unwrap();
    assert_eq!(result, ActionVerification::Verified);
    assert_eq!(
        verifier.verification_of(task.id, step_id),
        Some(ActionVerification::Verified)
    );
}

#[tokio::test]
async fn final_inventory_gate_passes_once_required_quantity_is_met() {
    let bot = Arc::new(ScriptedBotState {
        snapshots: Mutex::new(vec![BotStateSnapshot {
            position: None,
            inventory: vec![InventoryItem { name: "planks".to_string(), count: 6 }],
            health: None,
            food: None,
        }]),
    });
    let verifier = StepVerifier::new(bot, StepVerifierConfig::default());
    verifier.final_inventory_gate("planks", 4).await.unwrap();
}
