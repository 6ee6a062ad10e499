//! Mutable settlement state.

use serde::{Deserialize, Serialize};

use crate::config::SettlementConfig;
use crate::ledger::ResourceLedger;
use crate::store::BuildingInstanceStore;
use crate::training::TrainingState;

/// Everything that changes while the game runs. Static tables live in
/// the [`Settlement`](crate::engine::Settlement) next to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettlementState {
    pub resources: ResourceLedger,
    pub buildings: BuildingInstanceStore,
    pub training: TrainingState,
}

/// Fresh state: starting resources from `config`, no buildings.
pub fn create_initial_state(config: &SettlementConfig) -> SettlementState {
    SettlementState {
        resources: ResourceLedger::new(&config.starting_resources),
        buildings: BuildingInstanceStore::new(),
        training: TrainingState::default(),
    }
}
