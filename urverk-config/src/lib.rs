//! # Urverk Configuration System
//!
//! Hierarchical configuration for the urverk simulator.
//!
//! ## Features
//! - **Unified Configuration**: single source of truth across engine,
//!   replay, and telemetry settings
//! - **Validation**: runtime validation of critical parameters (worker
//!   counts, stack sizes, log levels)
//! - **Environment Awareness**: YAML files layered with `URVERK_*`
//!   environment overrides

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod engine;
mod error;
mod replay;
mod telemetry;
mod validation;

pub use engine::{EngineConfig, ExecutionMode};
pub use error::ConfigError;
pub use replay::ReplayConfig;
pub use telemetry::TelemetryConfig;

/// Top-level configuration container for all urverk components.
#[derive(Debug, Serialize, Deserialize, Validate, Default)]
pub struct UrverkConfig {
    /// Kernel/scheduler configuration (context variant, workers, stacks).
    #[validate(nested)]
    pub engine: EngineConfig,

    /// Replay parameters (expected hash).
    #[validate(nested)]
    pub replay: ReplayConfig,

    /// Telemetry and observability configuration.
    #[validate(nested)]
    pub telemetry: TelemetryConfig,
}

impl UrverkConfig {
    /// Load configuration from default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default values
    /// 2. `config/urverk.yaml` - base settings. If missing, defaults are used.
    /// 3. `URVERK_*` environment variables (`__` splits nesting).
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(UrverkConfig::default()));

        if Path::new("config/urverk.yaml").exists() {
            figment = figment.merge(Yaml::file("config/urverk.yaml"));
        }

        figment
            .merge(Env::prefixed("URVERK_").split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }

    /// Load configuration from a specific path.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::Missing(PathBuf::from(path)));
        }

        Figment::from(Serialized::defaults(UrverkConfig::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("URVERK_").split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_config_validation() {
        let config = UrverkConfig::default();
        config.validate().expect("Default config should validate");
    }

    #[test]
    fn missing_file_is_reported() {
        assert!(matches!(
            UrverkConfig::load_from_path("does/not/exist.yaml"),
            Err(ConfigError::Missing(_))
        ));
    }
}
