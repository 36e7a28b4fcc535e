//! Configuration management for the dataloom engine.
//!
//! This module provides configuration loading with multiple sources:
//! 1. Default values (hardcoded)
//! 2. Configuration file (YAML)
//! 3. Environment variables (override)
//!
//! # Configuration Hierarchy
//!
//! Environment variables take precedence over config file values,
//! which take precedence over defaults.
//!
//! # Example
//!
//! ```ignore
//! use dataloom_engine::config::EngineConfig;
//!
//! // Load from file with env overrides
//! let config = EngineConfig::load("dataloom.yaml")?;
//!
//! // Or load from environment only
//! let config = EngineConfig::from_env()?;
//! ```

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use dataloom_core::RecordCacheConfig;

use crate::handlers::aggregate::AggregatorConfig;
use crate::handlers::mutation::{MutationConfig, MutationMode};

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "DATALOOM";

/// Engine configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct EngineConfig {
    /// Request aggregator settings
    #[serde(default)]
    pub aggregator: AggregatorSettings,

    /// Record cache settings
    #[serde(default)]
    pub cache: CacheSettings,

    /// Mutation controller settings
    #[serde(default)]
    pub mutation: MutationSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Request aggregator settings.
///
/// - `DATALOOM_AGGREGATOR__BATCH_WINDOW_MS=5` - Accumulate for 5ms instead
///   of a single scheduler yield
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct AggregatorSettings {
    /// Accumulation window in milliseconds; 0 means one scheduler yield.
    #[serde(default)]
    pub batch_window_ms: u64,
}

/// Record cache settings.
///
/// # Example YAML Configuration
///
/// ```yaml
/// cache:
///   max_capacity: 10000
///   cache_time_secs: 300
///   stale_time_ms: 0
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CacheSettings {
    /// Maximum number of cached records
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,

    /// How long an unused record stays cached, in seconds
    #[serde(default = "default_cache_time")]
    pub cache_time_secs: u64,

    /// How long a cached record counts as fresh, in milliseconds.
    ///
    /// Default: 0 (every mount refetches in the background)
    /// Environment variable: `DATALOOM_CACHE__STALE_TIME_MS`
    #[serde(default)]
    pub stale_time_ms: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_capacity: default_max_capacity(),
            cache_time_secs: default_cache_time(),
            stale_time_ms: 0,
        }
    }
}

fn default_max_capacity() -> u64 {
    100_000
}

fn default_cache_time() -> u64 {
    300
}

/// Mutation controller settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MutationSettings {
    /// Mode used when an update does not pick one:
    /// "pessimistic", "optimistic" or "undoable"
    #[serde(default = "default_mutation_mode")]
    pub default_mode: String,

    /// Confirm unanswered undoable mutations after this many milliseconds.
    /// Unset means wait for an explicit answer.
    #[serde(default)]
    pub undo_timeout_ms: Option<u64>,
}

impl Default for MutationSettings {
    fn default() -> Self {
        Self {
            default_mode: default_mutation_mode(),
            undo_timeout_ms: None,
        }
    }
}

fn default_mutation_mode() -> String {
    MutationMode::default().as_str().to_string()
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format (true for production, false for development)
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl EngineConfig {
    /// Load configuration from a YAML file with environment variable overrides.
    ///
    /// Environment variables are prefixed with `DATALOOM_` and use `__` as
    /// separator. For example:
    /// - `DATALOOM_CACHE__STALE_TIME_MS=500` overrides `cache.stale_time_ms`
    /// - `DATALOOM_MUTATION__DEFAULT_MODE=undoable` overrides `mutation.default_mode`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let config = Config::builder()
            .add_source(Config::try_from(&EngineConfig::default())?)
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(environment())
            .build()?;

        let engine_config: EngineConfig = config.try_deserialize()?;
        engine_config.validate()?;

        Ok(engine_config)
    }

    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(Config::try_from(&EngineConfig::default())?)
            .add_source(environment())
            .build()?;

        let engine_config: EngineConfig = config.try_deserialize()?;
        engine_config.validate()?;

        Ok(engine_config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.cache.max_capacity == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "cache.max_capacity must be greater than 0".to_string(),
            });
        }

        if let Err(message) = self.mutation.default_mode.parse::<MutationMode>() {
            return Err(ConfigLoadError::Invalid {
                message: format!("mutation.default_mode: {message}"),
            });
        }

        if self.mutation.undo_timeout_ms == Some(0) {
            return Err(ConfigLoadError::Invalid {
                message: "mutation.undo_timeout_ms must be greater than 0 when set".to_string(),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "logging.level must be one of: {:?}, got: {}",
                    valid_levels, self.logging.level
                ),
            });
        }

        Ok(())
    }

    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig::default()
            .with_batch_window(Duration::from_millis(self.aggregator.batch_window_ms))
    }

    pub fn cache_config(&self) -> RecordCacheConfig {
        RecordCacheConfig::default()
            .with_max_capacity(self.cache.max_capacity)
            .with_cache_time(Duration::from_secs(self.cache.cache_time_secs))
    }

    pub fn stale_time(&self) -> Duration {
        Duration::from_millis(self.cache.stale_time_ms)
    }

    /// Builds the controller configuration, rejecting an unknown mode.
    pub fn mutation_config(&self) -> Result<MutationConfig, ConfigLoadError> {
        let mode = self
            .mutation
            .default_mode
            .parse::<MutationMode>()
            .map_err(|message| ConfigLoadError::Invalid { message })?;
        let config = MutationConfig::default().with_default_mode(mode);
        Ok(match self.mutation.undo_timeout_ms {
            Some(ms) => config.with_undo_timeout(Duration::from_millis(ms)),
            None => config,
        })
    }
}

/// Use __ as separator for nested keys: DATALOOM_CACHE__STALE_TIME_MS -> cache.stale_time_ms
fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}
