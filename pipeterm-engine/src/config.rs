//! Engine configuration
//!
//! Defines where pipelines are stored, how scripts are launched and how
//! often the background actors run.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Name of the directory holding `pipelines.json`, under the data directory
pub const STORAGE_DIR_NAME: &str = "pipeterm_storage";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} has invalid value '{value}': expected {expected}")]
    InvalidValue {
        key: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("{0}")]
    Invalid(String),
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding the persisted collection
    pub storage_dir: PathBuf,

    /// Program used to run pipeline scripts (e.g. "python3")
    pub interpreter: String,

    /// Script run for built-in pipelines
    pub builtin_script: PathBuf,

    /// Script run for custom pipelines; receives the user's script path
    pub custom_runner_script: PathBuf,

    /// How often the liveness monitor checks every pipeline
    pub health_interval: Duration,

    /// How often running pipelines advance their spinner frame
    pub animation_interval: Duration,

    /// Upper bound on a single execution; `None` waits forever
    pub execution_timeout: Option<Duration>,
}

impl EngineConfig {
    /// Creates a new configuration with defaults, storing under `storage_dir`
    pub fn new(storage_dir: impl Into<PathBuf>) -> Self {
        let scripts = default_data_dir().join("pipeterm").join("scripts");
        Self {
            storage_dir: storage_dir.into(),
            interpreter: "python3".to_string(),
            builtin_script: scripts.join("ingest.py"),
            custom_runner_script: scripts.join("byod.py"),
            health_interval: Duration::from_secs(30),
            animation_interval: Duration::from_millis(100),
            execution_timeout: Some(Duration::from_secs(30 * 60)),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Recognized variables (all optional):
    /// - PIPETERM_STORAGE_DIR
    /// - PIPETERM_INTERPRETER (default: python3)
    /// - PIPETERM_BUILTIN_SCRIPT
    /// - PIPETERM_CUSTOM_RUNNER
    /// - PIPETERM_HEALTH_INTERVAL (seconds, default: 30)
    /// - PIPETERM_ANIMATION_INTERVAL_MS (milliseconds, default: 100)
    /// - PIPETERM_EXECUTION_TIMEOUT (seconds, default: 1800, 0 disables)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`EngineConfig::from_env`], reading values through `lookup`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut config = Self::new(
            read("PIPETERM_STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(default_storage_dir),
        );

        if let Some(interpreter) = read("PIPETERM_INTERPRETER") {
            config.interpreter = interpreter;
        }
        if let Some(path) = read("PIPETERM_BUILTIN_SCRIPT") {
            config.builtin_script = PathBuf::from(path);
        }
        if let Some(path) = read("PIPETERM_CUSTOM_RUNNER") {
            config.custom_runner_script = PathBuf::from(path);
        }
        if let Some(value) = read("PIPETERM_HEALTH_INTERVAL") {
            config.health_interval =
                Duration::from_secs(parse_number("PIPETERM_HEALTH_INTERVAL", &value)?);
        }
        if let Some(value) = read("PIPETERM_ANIMATION_INTERVAL_MS") {
            config.animation_interval =
                Duration::from_millis(parse_number("PIPETERM_ANIMATION_INTERVAL_MS", &value)?);
        }
        if let Some(value) = read("PIPETERM_EXECUTION_TIMEOUT") {
            let secs = parse_number("PIPETERM_EXECUTION_TIMEOUT", &value)?;
            config.execution_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("storage_dir cannot be empty".into()));
        }

        if self.interpreter.trim().is_empty() {
            return Err(ConfigError::Invalid("interpreter cannot be empty".into()));
        }

        if self.health_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "health_interval must be greater than 0".into(),
            ));
        }

        if self.animation_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "animation_interval must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(default_storage_dir())
    }
}

/// Per-user application data directory
///
/// Falls back to `~/.local/share`, then to the working directory.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local").join("share")))
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn default_storage_dir() -> PathBuf {
    default_data_dir().join(STORAGE_DIR_NAME)
}

fn parse_number(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            expected: "a non-negative integer",
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::new("/tmp/pipeterm");
        assert_eq!(config.storage_dir, PathBuf::from("/tmp/pipeterm"));
        assert_eq!(config.interpreter, "python3");
        assert_eq!(config.health_interval, Duration::from_secs(30));
        assert_eq!(config.animation_interval, Duration::from_millis(100));
        assert_eq!(config.execution_timeout, Some(Duration::from_secs(1800)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_without_variables() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert!(config.storage_dir.ends_with(STORAGE_DIR_NAME));
        assert_eq!(config.interpreter, "python3");
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("PIPETERM_STORAGE_DIR", "/data/pt"),
            ("PIPETERM_INTERPRETER", "python3.12"),
            ("PIPETERM_BUILTIN_SCRIPT", "/opt/ingest.py"),
            ("PIPETERM_CUSTOM_RUNNER", "/opt/byod.py"),
            ("PIPETERM_HEALTH_INTERVAL", "5"),
            ("PIPETERM_ANIMATION_INTERVAL_MS", "250"),
            ("PIPETERM_EXECUTION_TIMEOUT", "0"),
        ]))
        .unwrap();

        assert_eq!(config.storage_dir, PathBuf::from("/data/pt"));
        assert_eq!(config.interpreter, "python3.12");
        assert_eq!(config.builtin_script, PathBuf::from("/opt/ingest.py"));
        assert_eq!(config.custom_runner_script, PathBuf::from("/opt/byod.py"));
        assert_eq!(config.health_interval, Duration::from_secs(5));
        assert_eq!(config.animation_interval, Duration::from_millis(250));
        assert_eq!(config.execution_timeout, None);
    }

    #[test]
    fn test_from_lookup_rejects_garbage_numbers() {
        let err = EngineConfig::from_lookup(lookup(&[("PIPETERM_HEALTH_INTERVAL", "soon")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "PIPETERM_HEALTH_INTERVAL",
                ..
            }
        ));
    }

    #[test]
    fn test_blank_values_are_ignored() {
        let config =
            EngineConfig::from_lookup(lookup(&[("PIPETERM_INTERPRETER", "  ")])).unwrap();
        assert_eq!(config.interpreter, "python3");
    }

    #[test]
    fn test_validate_rejects_zero_intervals() {
        let mut config = EngineConfig::new("/tmp/x");
        config.health_interval = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::new("/tmp/x");
        config.animation_interval = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::new("/tmp/x");
        config.interpreter = String::new();
        assert!(config.validate().is_err());
    }
}
