//! Infrastructure layer
//!
//! Adapters for external dependencies: configuration loading and
//! structured logging. Concrete implementations of the domain ports
//! (bot-state HTTP client, solver/resolver clients, etc.) live alongside
//! whatever binary wires this crate up; this core ships no network clients
//! of its own.

pub mod config;
pub mod logging;
