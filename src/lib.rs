//! Task lifecycle core for an autonomous agent's planning subsystem.
//!
//! Owns a task's entire life: dedup on ingestion, a seven-status state
//! machine, goal-binding synchronization, step verification against world
//! state, bounded replan scheduling, and tiered failure cooldowns. No
//! persistence and no network clients of its own — the store is in-memory,
//! single-writer, and the domain ports in [`domain::ports`] are the seams
//! where a concrete deployment plugs in its bot-state client, solver, and
//! goal resolver.

pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::models::{Task, TaskStatus, TaskStep};
pub use services::{EventBus, StatusMachine, TaskIngestionPipeline, TaskStore};
