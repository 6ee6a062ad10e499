//! Core domain types.
//!
//! Pure data. The only behaviour here is accessors and small vector math.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Building id of the town hall, the progression clock of the settlement.
pub const TOWNHALL_ID: &str = "townhall";

// ── Resources ──────────────────────────────────────────────────────

/// The five resource counters of a settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Food,
    Wood,
    Stone,
    Ore,
    Gold,
}

impl Resource {
    pub const ALL: [Resource; 5] = [
        Resource::Food,
        Resource::Wood,
        Resource::Stone,
        Resource::Ore,
        Resource::Gold,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Resource::Food => "food",
            Resource::Wood => "wood",
            Resource::Stone => "stone",
            Resource::Ore => "ore",
            Resource::Gold => "gold",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named resource quantities.
///
/// Sparse: a resource that is absent carries no requirement, which is not
/// the same as a requirement of zero against a slightly negative balance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceVector {
    amounts: BTreeMap<Resource, f64>,
}

impl ResourceVector {
    /// Empty vector; every resource absent.
    pub fn new() -> Self {
        Self::default()
    }

    /// All five resources present at zero.
    pub fn zeroed() -> Self {
        Resource::ALL
            .iter()
            .fold(Self::new(), |v, r| v.with(*r, 0.0))
    }

    /// Builder-style setter.
    pub fn with(mut self, resource: Resource, amount: f64) -> Self {
        self.amounts.insert(resource, amount);
        self
    }

    pub fn get(&self, resource: Resource) -> Option<f64> {
        self.amounts.get(&resource).copied()
    }

    /// Amount of `resource`, zero when absent.
    pub fn amount(&self, resource: Resource) -> f64 {
        self.get(resource).unwrap_or(0.0)
    }

    pub fn set(&mut self, resource: Resource, amount: f64) {
        self.amounts.insert(resource, amount);
    }

    pub fn add(&mut self, resource: Resource, delta: f64) {
        *self.amounts.entry(resource).or_insert(0.0) += delta;
    }

    pub fn iter(&self) -> impl Iterator<Item = (Resource, f64)> + '_ {
        self.amounts.iter().map(|(r, a)| (*r, *a))
    }

    pub fn is_empty(&self) -> bool {
        self.amounts.is_empty()
    }

    /// Drop entries whose amount is zero.
    pub fn without_zeros(mut self) -> Self {
        self.amounts.retain(|_, a| *a != 0.0);
        self
    }

    /// `fraction` of every entry, floored per resource. Zero results are omitted.
    pub fn scaled_floor(&self, fraction: f64) -> Self {
        let amounts = self
            .amounts
            .iter()
            .map(|(r, a)| (*r, (a * fraction).floor()))
            .filter(|(_, a)| *a > 0.0)
            .collect();
        Self { amounts }
    }
}

impl FromIterator<(Resource, f64)> for ResourceVector {
    fn from_iter<I: IntoIterator<Item = (Resource, f64)>>(iter: I) -> Self {
        Self {
            amounts: iter.into_iter().collect(),
        }
    }
}

// ── Plots ──────────────────────────────────────────────────────────

/// Footprint of a plot in map tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Footprint {
    pub width: u32,
    pub height: u32,
}

/// A fixed building site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Plot {
    pub id: String,
    pub footprint: Footprint,
    pub buildable: bool,
}

// ── Building instances ─────────────────────────────────────────────

/// The timed job an instance is running. End times are absolute epoch ms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Job {
    #[default]
    Idle,
    Constructing { end_at: u64 },
    Upgrading { to_level: u8, end_at: u64 },
}

impl Job {
    pub fn is_idle(&self) -> bool {
        matches!(self, Job::Idle)
    }

    pub fn end_at(&self) -> Option<u64> {
        match self {
            Job::Idle => None,
            Job::Constructing { end_at } | Job::Upgrading { end_at, .. } => Some(*end_at),
        }
    }

    /// A job still running at `now` (its end time lies in the future).
    pub fn is_active_at(&self, now: u64) -> bool {
        self.end_at().is_some_and(|end| end > now)
    }

    /// A job whose end time has been reached at `now`.
    pub fn is_due_at(&self, now: u64) -> bool {
        self.end_at().is_some_and(|end| end <= now)
    }
}

/// A building standing on a plot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildingInstance {
    pub plot_id: String,
    pub building_id: String,
    pub level: u8,
    pub job: Job,
}

impl BuildingInstance {
    pub fn new(plot_id: &str, building_id: &str, level: u8, job: Job) -> Self {
        Self {
            plot_id: plot_id.to_string(),
            building_id: building_id.to_string(),
            level,
            job,
        }
    }

    pub fn is_townhall(&self) -> bool {
        self.building_id == TOWNHALL_ID
    }

    pub fn is_constructing(&self) -> bool {
        matches!(self.job, Job::Constructing { .. })
    }

    pub fn is_upgrading(&self) -> bool {
        matches!(self.job, Job::Upgrading { .. })
    }

    /// Busy instances cannot start another job.
    pub fn is_busy(&self) -> bool {
        !self.job.is_idle()
    }
}
