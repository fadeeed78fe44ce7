use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use super::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid log level: {0}. must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("invalid log format: {0}. must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("invalid max_task_history: {0}. must be at least 1")]
    InvalidMaxTaskHistory(usize),

    #[error("invalid replan.max_attempts: {0}. must be at least 1")]
    InvalidReplanMaxAttempts(u32),

    #[error("invalid bot_state.timeout_ms: {0}. must be positive")]
    InvalidBotStateTimeout(u64),

    #[error("configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. `lifecycle.yaml` (project config)
    /// 3. `lifecycle.local.yaml` (project-local overrides, optional)
    /// 4. Environment variables (`LIFECYCLE_` prefix, highest priority)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file("lifecycle.yaml"))
            .merge(Yaml::file("lifecycle.local.yaml"))
            .merge(Env::prefixed("LIFECYCLE_").split("__"))
            .extract()
            .context("failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, skipping the default
    /// project-local file names (used by tests and alternate deployments).
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!("failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.log.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.log.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.log.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.log.format.clone()));
        }

        if config.max_task_history == 0 {
            return Err(ConfigError::InvalidMaxTaskHistory(config.max_task_history));
        }

        if config.replan.max_attempts == 0 {
            return Err(ConfigError::InvalidReplanMaxAttempts(config.replan.max_attempts));
        }

        if config.bot_state.timeout_ms == 0 {
            return Err(ConfigError::InvalidBotStateTimeout(config.bot_state.timeout_ms));
        }

        Ok(())
    }
}
