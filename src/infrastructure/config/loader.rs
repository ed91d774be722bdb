use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::{Config, RetryConfig};

/// Project-local configuration directory
pub const CONFIG_DIR: &str = ".aianalysis";

/// Environment variable prefix; `__` separates nested keys
pub const ENV_PREFIX: &str = "AIANALYSIS_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid workers: {0}. Must be between 1 and 256")]
    InvalidWorkers(usize),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidLogRotation(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid {name}: {value}. Must be within 0.0-1.0")]
    InvalidThreshold { name: &'static str, value: f64 },

    #[error("Invalid confidence levels: low_below ({0}) must not exceed high_at_or_above ({1})")]
    InvalidConfidenceLevels(f64, f64),

    #[error("Invalid max_session_regenerations: {0}. Must be at least 1")]
    InvalidMaxSessionRegenerations(u32),

    #[error("Investigation base_url cannot be empty")]
    EmptyInvestigationUrl,

    #[error("Invalid audit {name}: must be at least 1")]
    InvalidAuditSize { name: &'static str },

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .aianalysis/config.yaml
    /// 3. .aianalysis/local.yaml (optional developer overrides)
    /// 4. Environment variables (AIANALYSIS_* prefix)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(CONFIG_DIR)
    }

    /// Same layering as [`load`](Self::load) rooted at `dir`
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Config> {
        let dir = dir.as_ref();
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file (environment still applies)
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.controller.workers == 0 || config.controller.workers > 256 {
            return Err(ConfigError::InvalidWorkers(config.controller.workers));
        }
        if config.controller.reconcile_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "controller.reconcile_timeout_secs must be at least 1".to_string(),
            ));
        }
        Self::validate_backoff(&config.controller.requeue)?;

        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(
                config.database.max_connections,
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }
        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidLogRotation(
                config.logging.rotation.clone(),
            ));
        }

        let levels = &config.analysis.confidence_levels;
        for (name, value) in [
            ("analysis.min_confidence", config.analysis.min_confidence),
            (
                "analysis.confidence_levels.low_below",
                levels.low_below,
            ),
            (
                "analysis.confidence_levels.high_at_or_above",
                levels.high_at_or_above,
            ),
            (
                "policy.production_auto_approve_confidence",
                config.policy.production_auto_approve_confidence,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidThreshold { name, value });
            }
        }
        if levels.low_below > levels.high_at_or_above {
            return Err(ConfigError::InvalidConfidenceLevels(
                levels.low_below,
                levels.high_at_or_above,
            ));
        }

        if config.investigation.base_url.trim().is_empty() {
            return Err(ConfigError::EmptyInvestigationUrl);
        }
        if config.investigation.max_session_regenerations == 0 {
            return Err(ConfigError::InvalidMaxSessionRegenerations(0));
        }
        Self::validate_backoff(&config.investigation.retry)?;

        if config.audit.buffer_size == 0 {
            return Err(ConfigError::InvalidAuditSize {
                name: "buffer_size",
            });
        }
        if config.audit.batch_size == 0 {
            return Err(ConfigError::InvalidAuditSize { name: "batch_size" });
        }
        if config.audit.flush_interval_ms == 0 {
            return Err(ConfigError::InvalidAuditSize {
                name: "flush_interval_ms",
            });
        }

        if config.policy.path.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "policy.path cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    fn validate_backoff(retry: &RetryConfig) -> Result<(), ConfigError> {
        if retry.initial_backoff_ms >= retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                retry.initial_backoff_ms,
                retry.max_backoff_ms,
            ));
        }
        Ok(())
    }
}
