//! Runtime configuration file.
//!
//! ```json
//! { "autosave_interval_ms": 30000,
//!   "settlement": { "queue_limit": 3, "timers_enabled": true } }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use settlement_core::SettlementConfig;

use crate::save_file::SaveError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// 0 disables autosave.
    pub autosave_interval_ms: u64,
    pub settlement: SettlementConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            autosave_interval_ms: 30_000,
            settlement: SettlementConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_json_str(json: &str) -> Result<Self, SaveError> {
        serde_json::from_str(json).map_err(|e| SaveError::Deserialization(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, SaveError> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }
}
