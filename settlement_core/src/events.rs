//! Outcome records.
//!
//! Pure data returned by commands and ticks so callers (UI, logs, tests)
//! can react without diffing state.

use serde::{Deserialize, Serialize};

use crate::domain::ResourceVector;

/// Which kind of timed job finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Construction,
    Upgrade,
}

/// A job promoted by a tick (or completed on load).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCompletion {
    pub plot_id: String,
    pub building_id: String,
    pub kind: JobKind,
    /// Level of the instance after completion.
    pub level: u8,
}

/// A training job resolved by a tick (or completed on load).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingCompletion {
    pub slot: usize,
    pub troop_id: String,
    pub amount: u32,
}

/// What an accepted command did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommandOutcome {
    /// `end_at` is `None` in instant mode.
    Placed {
        plot_id: String,
        building_id: String,
        cost: ResourceVector,
        end_at: Option<u64>,
    },
    UpgradeStarted {
        plot_id: String,
        to_level: u8,
        cost: ResourceVector,
        end_at: u64,
    },
    UpgradedInstantly {
        plot_id: String,
        level: u8,
        cost: ResourceVector,
    },
    Cancelled {
        plot_id: String,
        level: u8,
        refund: ResourceVector,
    },
    SpedUp {
        plot_id: String,
        end_at: u64,
    },
    /// `end_at` is `None` in instant mode, where the troops are already
    /// credited.
    TrainingStarted {
        slot: usize,
        troop_id: String,
        amount: u32,
        cost: ResourceVector,
        end_at: Option<u64>,
    },
    TrainingCancelled {
        slot: usize,
        troop_id: String,
        amount: u32,
        refund: ResourceVector,
    },
}
