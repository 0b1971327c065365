//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

use std::time::Duration;

use serde::Deserialize;

use crate::bus::{MessagingConfig, MessagingType};
use crate::storage::{StorageConfig, StorageType};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "WALLETSTREAM_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "WALLETSTREAM";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "WALLETSTREAM_LOG";

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Topic names and partition count.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TopicsConfig {
    /// Balance processor input; internally fed by the windowed processor.
    pub balance: String,
    /// Windowed-accumulator input; the only topic clients deposit into.
    pub windowed: String,
    /// Partition count used when provisioning topics.
    pub partitions: u32,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            balance: "wallet".to_string(),
            windowed: "threshold".to_string(),
            partitions: 8,
        }
    }
}

/// Sliding window parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DecayConfig {
    /// Seconds after which a deposit's contribution leaves the window.
    pub window_secs: u64,
    /// Windowed amount at or above which a wallet is flagged.
    pub threshold: u64,
}

impl DecayConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            window_secs: 120,
            threshold: 10_000,
        }
    }
}

/// Retry policy for appends to the log.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmitterConfig {
    pub max_retries: usize,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            min_delay_ms: 50,
            max_delay_ms: 2000,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub messaging: MessagingConfig,
    pub storage: StorageConfig,
    pub topics: TopicsConfig,
    pub decay: DecayConfig,
    pub emitter: EmitterConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Sources, later ones overriding earlier ones:
    /// 1. `config.yaml` in the current directory (optional)
    /// 2. File at `path`, if given
    /// 3. File named by `CONFIG_ENV_VAR`, if set
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.topics.partitions == 0 {
            return Err(ConfigError::Invalid(
                "topics.partitions must be at least 1".to_string(),
            ));
        }
        if self.topics.balance.is_empty() || self.topics.windowed.is_empty() {
            return Err(ConfigError::Invalid("topic names must not be empty".to_string()));
        }
        if self.topics.balance == self.topics.windowed {
            return Err(ConfigError::Invalid(format!(
                "balance and windowed topics must differ (both '{}')",
                self.topics.balance
            )));
        }
        if self.decay.window_secs == 0 {
            return Err(ConfigError::Invalid(
                "decay.window_secs must be at least 1".to_string(),
            ));
        }
        if self.messaging.messaging_type == MessagingType::Memory
            && self.storage.storage_type != StorageType::Memory
        {
            // Durable offsets and compensations would outlive the log they point into.
            return Err(ConfigError::Invalid(
                "durable storage requires a durable log; use messaging.type=kafka or storage.type=memory"
                    .to_string(),
            ));
        }
        if self.emitter.min_delay_ms > self.emitter.max_delay_ms {
            return Err(ConfigError::Invalid(
                "emitter.min_delay_ms exceeds emitter.max_delay_ms".to_string(),
            ));
        }
        Ok(())
    }
}
