//! Error types.
//!
//! `Rejection` is an expected business-rule outcome the caller recovers
//! from without cleanup. `CommandError` adds the boundary faults (unknown
//! plot, bad argument) that fail the whole call.

use thiserror::Error;

/// Why a command was refused. Nothing was mutated when one is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("unknown building {0:?}")]
    UnknownBuilding(String),
    #[error("plot {0:?} is already occupied")]
    PlotOccupied(String),
    #[error("plot {0:?} cannot hold this building")]
    PlotNotBuildable(String),
    #[error("{0:?} is unique and already placed")]
    AlreadyPlaced(String),
    #[error("requires town hall level {required} (currently {townhall_level})")]
    ProgressionTooLow { required: u8, townhall_level: u8 },
    #[error("all builders busy ({active}/{limit})")]
    QueueFull { active: usize, limit: usize },
    #[error("not enough resources")]
    InsufficientResources,
    #[error("no building on plot {0:?}")]
    NoBuildingHere(String),
    #[error("building on plot {0:?} is already constructing or upgrading")]
    AlreadyBusy(String),
    #[error("max level reached")]
    MaxLevelReached,
    #[error("{building_id:?} must be built and at level {required_level} first")]
    MissingPrerequisite { building_id: String, required_level: u8 },
    #[error("no active job on plot {0:?}")]
    NoActiveJob(String),
    #[error("unknown troop {0:?}")]
    UnknownTroop(String),
    #[error("training slot {slot} not available ({available} slots)")]
    SlotUnavailable { slot: usize, available: usize },
    #[error("training slot {0} is busy")]
    SlotBusy(usize),
    #[error("{troop_id:?} requires barracks level {required} (currently {barracks_level})")]
    TierLocked {
        troop_id: String,
        required: u8,
        barracks_level: u8,
    },
    #[error("no active training in slot {0}")]
    NoActiveTraining(usize),
}

/// Failure of a command call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    #[error(transparent)]
    Rejected(#[from] Rejection),
    #[error("unknown plot {0:?}")]
    UnknownPlot(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl CommandError {
    /// The business-rule rejection, if this is one.
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            CommandError::Rejected(r) => Some(r),
            _ => None,
        }
    }
}

/// Static table validation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("duplicate building id {0:?}")]
    DuplicateBuilding(String),
    #[error("invalid building id {0:?}")]
    InvalidBuildingId(String),
    #[error("catalog has no town hall definition")]
    MissingTownhall,
    #[error("building {0:?} has a negative or non-finite number in its definition")]
    InvalidNumbers(String),
    #[error("plot registry is empty")]
    NoPlots,
    #[error("duplicate plot id {0:?}")]
    DuplicatePlot(String),
    #[error("invalid plot id {0:?}")]
    InvalidPlotId(String),
    #[error("cannot parse table: {0}")]
    Parse(String),
    #[error("invalid troop {0:?}")]
    InvalidTroop(String),
    #[error("duplicate troop id {0:?}")]
    DuplicateTroop(String),
}

impl From<serde_json::Error> for CatalogError {
    fn from(e: serde_json::Error) -> Self {
        CatalogError::Parse(e.to_string())
    }
}

/// A persisted record that cannot be turned into an instance.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("malformed record: {0}")]
    Malformed(String),
    #[error("unknown plot {0:?}")]
    UnknownPlot(String),
    #[error("unknown building {0:?}")]
    UnknownBuilding(String),
    #[error("level {0} outside 1..=20")]
    LevelOutOfRange(i64),
    #[error("construction and upgrade timers both set")]
    ConflictingTimers,
    #[error("upgrade target {target} does not follow level {level}")]
    BadUpgradeTarget { level: i64, target: i64 },
    #[error("plot {0:?} appears more than once")]
    DuplicatePlot(String),
    #[error("unique building {0:?} appears more than once")]
    DuplicateUnique(String),
    #[error("plot {plot_id:?} cannot hold {building_id:?}")]
    PlotNotBuildable { plot_id: String, building_id: String },
}

/// A broken progression invariant. Always a defect, never user error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("[INVARIANT:{rule}] {detail}")]
pub struct InvariantViolation {
    pub rule: &'static str,
    pub detail: String,
}
