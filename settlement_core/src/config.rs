//! Tunable settlement parameters.
//!
//! Every field has a default; a JSON config only needs the keys it overrides.

use serde::{Deserialize, Serialize};

use crate::curves::CostCurve;
use crate::domain::ResourceVector;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SettlementConfig {
    /// Maximum number of simultaneously timed jobs.
    pub queue_limit: usize,
    /// When false, placements and upgrades complete instantly.
    pub timers_enabled: bool,
    /// `k` of the value curve `floor(k * seconds^p)`.
    pub cost_scale: f64,
    /// `p` of the value curve.
    pub cost_exponent: f64,
    /// Ledger balances of a fresh settlement.
    pub starting_resources: ResourceVector,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            queue_limit: 2,
            timers_enabled: true,
            cost_scale: 6.0,
            cost_exponent: 1.10,
            starting_resources: ResourceVector::zeroed(),
        }
    }
}

impl SettlementConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn cost_curve(&self) -> CostCurve {
        CostCurve {
            scale: self.cost_scale,
            exponent: self.cost_exponent,
        }
    }
}
