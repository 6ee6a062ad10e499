//! Persisted record codec: `SaveRecord` <-> building instances.
//!
//! One record per occupied plot, in the flat shape the save file stores:
//!
//! ```json
//! { "plotId": "plot_a", "buildingId": "farm", "level": 2,
//!   "constructionEndAt": 0, "upgradeEndAt": 1700000000000, "upgradingToLevel": 3 }
//! ```
//!
//! Hydration never fails on a bad record: the record is dropped (or repaired
//! when it is only out of step with the town hall) and counted in the
//! returned [`LoadReport`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::catalog::{BuildingCatalog, PlotRegistry};
use crate::domain::{BuildingInstance, Job, ResourceVector};
use crate::engine::Settlement;
use crate::error::{InvariantViolation, Rejection, RecordError};
use crate::ledger::ResourceLedger;
use crate::scheduler::BuildQueue;
use crate::MAX_LEVEL;

/// Flat persisted form of a building instance. A zero timer means "none".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRecord {
    pub plot_id: String,
    pub building_id: String,
    pub level: i64,
    #[serde(default)]
    pub construction_end_at: u64,
    #[serde(default)]
    pub upgrade_end_at: u64,
    #[serde(default)]
    pub upgrading_to_level: i64,
}

impl SaveRecord {
    pub fn from_instance(inst: &BuildingInstance) -> Self {
        let (construction_end_at, upgrade_end_at, upgrading_to_level) = match inst.job {
            Job::Idle => (0, 0, 0),
            Job::Constructing { end_at } => (end_at, 0, 0),
            Job::Upgrading { to_level, end_at } => (0, end_at, i64::from(to_level)),
        };
        Self {
            plot_id: inst.plot_id.clone(),
            building_id: inst.building_id.clone(),
            level: i64::from(inst.level),
            construction_end_at,
            upgrade_end_at,
            upgrading_to_level,
        }
    }

    /// Validate against the static tables and build the instance.
    ///
    /// An upgrade timer with `upgradingToLevel` 0 targets the next level.
    pub fn to_instance(
        &self,
        catalog: &BuildingCatalog,
        plots: &PlotRegistry,
    ) -> Result<BuildingInstance, RecordError> {
        let plot = plots
            .get(&self.plot_id)
            .ok_or_else(|| RecordError::UnknownPlot(self.plot_id.clone()))?;
        if !catalog.contains(&self.building_id) {
            return Err(RecordError::UnknownBuilding(self.building_id.clone()));
        }
        if !plots.accepts(plot, &self.building_id) {
            return Err(RecordError::PlotNotBuildable {
                plot_id: self.plot_id.clone(),
                building_id: self.building_id.clone(),
            });
        }
        if !(1..=i64::from(MAX_LEVEL)).contains(&self.level) {
            return Err(RecordError::LevelOutOfRange(self.level));
        }
        let level = self.level as u8;

        let job = match (self.construction_end_at, self.upgrade_end_at) {
            (0, 0) => Job::Idle,
            (end_at, 0) => Job::Constructing { end_at },
            (0, end_at) => {
                let target = if self.upgrading_to_level == 0 {
                    self.level + 1
                } else {
                    self.upgrading_to_level
                };
                if target != self.level + 1 || target > i64::from(MAX_LEVEL) {
                    return Err(RecordError::BadUpgradeTarget {
                        level: self.level,
                        target,
                    });
                }
                Job::Upgrading {
                    to_level: target as u8,
                    end_at,
                }
            }
            _ => return Err(RecordError::ConflictingTimers),
        };

        Ok(BuildingInstance::new(&self.plot_id, &self.building_id, level, job))
    }
}

/// Parse raw JSON records, dropping the ones that do not fit the shape.
/// Returns the parsed records and the number dropped.
pub fn decode_records(values: &[Value]) -> (Vec<SaveRecord>, usize) {
    let mut records = Vec::with_capacity(values.len());
    let mut dropped = 0;
    for value in values {
        match serde_json::from_value::<SaveRecord>(value.clone()) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(error = %e, "dropping malformed save record");
                dropped += 1;
            }
        }
    }
    (records, dropped)
}

/// What happened while loading records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    /// Instances present after the load.
    pub loaded: usize,
    /// Records discarded as malformed, unknown or duplicate.
    pub dropped: usize,
    /// Records kept but adjusted to satisfy the progression rules.
    pub repaired: usize,
    /// Jobs that finished while the game was closed.
    pub completed_on_load: usize,
}

impl LoadReport {
    /// Add the drop, repair and completion counts of `other`. `loaded`
    /// keeps counting instances only.
    pub fn absorb(&mut self, other: LoadReport) {
        self.dropped += other.dropped;
        self.repaired += other.repaired;
        self.completed_on_load += other.completed_on_load;
    }
}

impl Settlement {
    /// One record per occupied plot, in plot id order.
    pub fn export_records(&self) -> Vec<SaveRecord> {
        self.state
            .buildings
            .iter()
            .map(SaveRecord::from_instance)
            .collect()
    }

    /// [`hydrate`](Self::hydrate) from raw JSON records.
    pub fn hydrate_values(
        &mut self,
        values: &[Value],
        resources: Option<&ResourceVector>,
    ) -> Result<LoadReport, InvariantViolation> {
        let (records, malformed) = decode_records(values);
        let mut report = self.hydrate(&records, resources)?;
        report.dropped += malformed;
        Ok(report)
    }

    /// Replace all instances with `records` (and the balances with
    /// `resources` when given), then resolve every job that finished while
    /// the game was closed.
    ///
    /// Order: validate and insert, seed a missing town hall, clamp levels
    /// above the town hall, finish jobs beyond the queue limit, tick.
    pub fn hydrate(
        &mut self,
        records: &[SaveRecord],
        resources: Option<&ResourceVector>,
    ) -> Result<LoadReport, InvariantViolation> {
        let mut report = LoadReport::default();
        self.state.buildings.clear();

        for record in records {
            let inserted = record
                .to_instance(&self.catalog, &self.plots)
                .and_then(|inst| {
                    let unique = self.catalog.is_unique(&inst.building_id);
                    self.state
                        .buildings
                        .insert(inst, unique)
                        .map_err(|r| match r {
                            Rejection::AlreadyPlaced(id) => RecordError::DuplicateUnique(id),
                            _ => RecordError::DuplicatePlot(record.plot_id.clone()),
                        })
                });
            if let Err(e) = inserted {
                warn!(plot = %record.plot_id, building = %record.building_id, error = %e, "dropping save record");
                report.dropped += 1;
            }
        }

        self.ensure_townhall();
        report.repaired += self.clamp_to_townhall();

        let now = self.now();
        let finished = self.finish_excess_jobs(now);
        report.repaired += finished;
        report.completed_on_load += finished;

        if let Some(balances) = resources {
            self.state.resources = ResourceLedger::new(balances);
        }

        report.completed_on_load += self.tick(now).len();
        report.loaded = self.state.buildings.len();

        self.check_invariants()?;
        info!(
            loaded = report.loaded,
            dropped = report.dropped,
            repaired = report.repaired,
            completed = report.completed_on_load,
            "settlement loaded"
        );
        Ok(report)
    }

    /// Pull every non-town-hall instance down to the town hall level and
    /// drop upgrades that would overtake it. Returns how many were touched.
    fn clamp_to_townhall(&mut self) -> usize {
        let cap = self.state.buildings.townhall_level().max(1);
        let over: Vec<String> = self
            .state
            .buildings
            .iter()
            .filter(|i| !i.is_townhall())
            .filter(|i| {
                i.level > cap || matches!(i.job, Job::Upgrading { to_level, .. } if to_level > cap)
            })
            .map(|i| i.plot_id.clone())
            .collect();

        for plot_id in &over {
            if let Some(inst) = self.state.buildings.get_mut(plot_id) {
                warn!(plot = %plot_id, level = inst.level, cap, "repairing level above town hall");
                inst.level = inst.level.min(cap);
                if inst.is_upgrading() {
                    inst.job = Job::Idle;
                }
            }
        }
        over.len()
    }

    /// Complete the jobs that do not fit in the queue, soonest-ending first.
    fn finish_excess_jobs(&mut self, now: u64) -> usize {
        let active = BuildQueue::new(&self.state.buildings, self.config.queue_limit).active_jobs(now);
        let excess = active.saturating_sub(self.config.queue_limit);
        if excess == 0 {
            return 0;
        }
        let mut running: Vec<(u64, String)> = self
            .state
            .buildings
            .iter()
            .filter(|i| i.job.is_active_at(now))
            .filter_map(|i| i.job.end_at().map(|e| (e, i.plot_id.clone())))
            .collect();
        running.sort();
        running
            .into_iter()
            .take(excess)
            .filter_map(|(_, plot_id)| {
                warn!(plot = %plot_id, "finishing job beyond the queue limit");
                self.state.buildings.complete_job(&plot_id)
            })
            .count()
    }
}
