//! Replay configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Replay run parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ReplayConfig {
    /// Recorded state hash to validate the run against, if any.
    #[serde(default)]
    pub expected_hash: Option<String>,
}
