//! Zipper configuration
//!
//! Loaded from a TOML file, then overridden from the environment:
//!
//! | Variable | Field | Default |
//! |----------|-------|---------|
//! | ZIPPER_LOG_LEVEL | logging.level | info |
//! | ZIPPER_LOG_JSON | logging.json | false |
//! | ZIPPER_MISSING_SHARD_FATAL | merge.missing_shard_policy | NonFatal |
//! | ZIPPER_LOG_STEP_MISMATCH | merge.log_step_mismatch | true |

use crate::gather::MissingShardPolicy;
use crate::observer::TracingObserver;
use serde::{Deserialize, Serialize};
use std::path::Path;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config I/O error: {}", e),
            ConfigError::Parse(e) => write!(f, "config parse error: {}", e),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZipperConfig {
    pub logging: LoggingConfig,
    pub merge: MergeConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter level; `RUST_LOG` takes precedence when set
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub missing_shard_policy: MissingShardPolicy,
    pub log_step_mismatch: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        MergeConfig {
            missing_shard_policy: MissingShardPolicy::NonFatal,
            log_step_mismatch: true,
        }
    }
}

impl MergeConfig {
    pub fn observer(&self) -> TracingObserver {
        TracingObserver::new(self.log_step_mismatch)
    }
}

impl ZipperConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: ZipperConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = ZipperConfig::default();
        config.apply_env()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(level) = std::env::var("ZIPPER_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(v) = std::env::var("ZIPPER_LOG_JSON") {
            self.logging.json = parse_bool("ZIPPER_LOG_JSON", &v)?;
        }
        if let Ok(v) = std::env::var("ZIPPER_MISSING_SHARD_FATAL") {
            self.merge.missing_shard_policy = if parse_bool("ZIPPER_MISSING_SHARD_FATAL", &v)? {
                MissingShardPolicy::Fatal
            } else {
                MissingShardPolicy::NonFatal
            };
        }
        if let Ok(v) = std::env::var("ZIPPER_LOG_STEP_MISMATCH") {
            self.merge.log_step_mismatch = parse_bool("ZIPPER_LOG_STEP_MISMATCH", &v)?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let level = self.logging.level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "unknown log level '{}'",
                self.logging.level
            )));
        }
        Ok(())
    }
}

fn parse_bool(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => Err(ConfigError::Invalid(format!("{}: expected bool, got '{}'", var, other))),
    }
}
