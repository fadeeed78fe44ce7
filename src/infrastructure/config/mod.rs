//! Configuration management infrastructure
//!
//! Hierarchical configuration using figment:
//! - YAML file loading
//! - Environment variable overrides
//! - Configuration validation
//! - Type-safe config structs

pub mod loader;

use serde::{Deserialize, Serialize};

pub use loader::{ConfigError, ConfigLoader};

/// Feature toggles and tuning knobs for the task lifecycle core
/// (section 6's recognized option set), plus the ambient logging/
/// collaborator/replan/dedup settings every deployment of this crate
/// needs regardless of which lifecycle features are enabled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub enable_real_time_updates: bool,
    pub enable_progress_tracking: bool,
    pub enable_task_statistics: bool,
    pub enable_task_history: bool,
    pub max_task_history: usize,
    pub progress_update_interval_ms: u64,
    pub enable_action_verification: bool,
    pub action_verification_timeout_ms: u64,
    pub strict_convert_eligibility: bool,
    pub strict_finalize: bool,
    pub log: LogConfig,
    pub bot_state: BotStateConfig,
    pub verification: VerificationConfig,
    pub replan: ReplanConfig,
    pub dedup: DedupConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enable_real_time_updates: true,
            enable_progress_tracking: true,
            enable_task_statistics: true,
            enable_task_history: true,
            max_task_history: 1000,
            progress_update_interval_ms: 5000,
            enable_action_verification: true,
            action_verification_timeout_ms: 10_000,
            strict_convert_eligibility: false,
            strict_finalize: false,
            log: LogConfig::default(),
            bot_state: BotStateConfig::default(),
            verification: VerificationConfig::default(),
            replan: ReplanConfig::default(),
            dedup: DedupConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub format: String,
    pub dir: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BotStateConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for BotStateConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3001".to_string(),
            timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VerificationConfig {
    pub timeout_ms: u64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self { timeout_ms: 10_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReplanConfig {
    pub initial_backoff_ms: u64,
    pub max_attempts: u32,
}

impl Default for ReplanConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 5000,
            max_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DedupConfig {
    pub recent_digest_window: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            recent_digest_window: 500,
        }
    }
}
