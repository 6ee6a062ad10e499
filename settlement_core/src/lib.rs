#![forbid(unsafe_code)]

/// Version of the persisted layout (save envelope and canonical hash).
pub const SAVE_FORMAT_VERSION: u32 = 2;

/// Highest level any building can reach.
pub const MAX_LEVEL: u8 = 20;

pub mod arithmetic;
pub mod domain;
pub mod error;
pub mod config;
pub mod catalog;
pub mod curves;
pub mod ledger;
pub mod production;
pub mod store;
pub mod scheduler;
pub mod gates;
pub mod tick;
pub mod events;
pub mod clock;
pub mod state;
pub mod invariants;
pub mod hashing;
pub mod engine;
pub mod commands;
pub mod persistence;
pub mod troops;
pub mod training;

pub use catalog::{BuildingCatalog, BuildingDefinition, PlotRegistry};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SettlementConfig;
pub use domain::{BuildingInstance, Job, Resource, ResourceVector};
pub use engine::Settlement;
pub use error::{CommandError, Rejection};
pub use persistence::{LoadReport, SaveRecord};
pub use training::{TrainingSnapshot, TrainingState};
pub use troops::{Tier, TroopCatalog, TroopDefinition, TroopType};
