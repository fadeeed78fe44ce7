//! Domain ports (interfaces) for the task lifecycle core.
//!
//! Each trait here is a seam to an external collaborator (section 6):
//! reading the embodied agent's world state, polling its thought stream,
//! generating plans, resolving goal identity, running completion
//! verifiers, and dispatching executable steps. Concrete adapters live
//! under `crate::infrastructure`.

pub mod bot_state;
pub mod executor_pipeline;
pub mod goal_resolver;
pub mod solver;
pub mod thought_stream;
pub mod verifier_registry;

pub use bot_state::{BotStateClient, BotStateSnapshot, InventoryItem, Position};
pub use executor_pipeline::ExecutorPipeline;
pub use goal_resolver::{GoalResolutionOutcome, GoalResolver, GoalStoreAdapter};
pub use solver::Solver;
pub use thought_stream::{Thought, ThoughtStream};
pub use verifier_registry::VerifierRegistry;
