//! Telemetry configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation;

/// Logging and metrics parameters.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TelemetryConfig {
    /// Log level: trace|debug|info|warn|error.
    #[validate(custom(function = validation::validate_log_level))]
    #[serde(default = "default_level")]
    pub level: String,

    /// Include thread names in log lines (useful to follow context
    /// handoffs).
    #[serde(default = "default_thread_names")]
    pub thread_names: bool,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_thread_names() -> bool {
    true
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        TelemetryConfig {
            level: default_level(),
            thread_names: default_thread_names(),
        }
    }
}
