//! Engine configuration.
//!
//! Layered loading: built-in defaults, then an optional TOML file, then
//! `UNFURL_*` environment overrides (e.g. `UNFURL_ENGINE__MAX_WORKERS=4`).

use crate::error::EngineError;
use crate::logging::LoggingConfig;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tunables of the session engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Concurrent work-unit cap for the scheduler.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Weight applied to upload progress relative to decompression
    /// progress when accumulating session totals.
    #[serde(default = "default_transfer_multiplier")]
    pub transfer_multiplier: u64,

    /// Fixed per-entry byte cost covering remote metadata round-trips.
    #[serde(default = "default_entry_overhead_bytes")]
    pub entry_overhead_bytes: u64,
}

fn default_max_workers() -> usize {
    2
}

fn default_transfer_multiplier() -> u64 {
    3
}

fn default_entry_overhead_bytes() -> u64 {
    20_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            transfer_multiplier: default_transfer_multiplier(),
            entry_overhead_bytes: default_entry_overhead_bytes(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_workers == 0 {
            return Err(EngineError::Config(
                "max_workers must be at least 1".to_string(),
            ));
        }
        if self.transfer_multiplier == 0 {
            return Err(EngineError::Config(
                "transfer_multiplier must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnfurlConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl UnfurlConfig {
    /// Load from defaults plus `UNFURL_*` environment overrides.
    pub fn load() -> Result<Self, EngineError> {
        Self::builder(None)
    }

    /// Load from defaults, a TOML file, and environment overrides, in
    /// ascending precedence.
    pub fn load_from_file(path: &Path) -> Result<Self, EngineError> {
        Self::builder(Some(path))
    }

    fn builder(file: Option<&Path>) -> Result<Self, EngineError> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path));
        }
        let settings = builder
            .add_source(Environment::with_prefix("UNFURL").separator("__"))
            .build()?;

        let config: UnfurlConfig = settings.try_deserialize()?;
        config.engine.validate()?;
        Ok(config)
    }
}
