//! Configuration module
//!
//! Builds the engine configuration from the environment plus CLI flags.

use anyhow::{Context, Result};
use pipeterm_engine::EngineConfig;
use std::path::PathBuf;
use tracing::debug;

/// Loads configuration from the environment, applying CLI overrides
pub fn load(storage_dir: Option<PathBuf>) -> Result<EngineConfig> {
    let mut config =
        EngineConfig::from_env().context("Failed to read configuration from environment")?;

    if let Some(dir) = storage_dir {
        config.storage_dir = dir;
    }

    config.validate().context("Invalid configuration")?;
    debug!("Using storage directory {}", config.storage_dir.display());

    Ok(config)
}
