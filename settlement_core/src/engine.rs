//! Settlement: the simulation context.
//!
//! Owns the mutable state and holds the static tables and the clock by
//! injection. Commands (see `commands`) and queries are methods on it; a
//! host keeps one `Settlement` per game and passes it around explicitly.
//!
//! After every accepted command and every tick that changed something the
//! progression invariants are re-checked and a violation panics.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::arithmetic::remaining_ms;
use crate::catalog::{BuildingCatalog, PlotRegistry};
use crate::clock::Clock;
use crate::config::SettlementConfig;
use crate::domain::{BuildingInstance, Job, ResourceVector, TOWNHALL_ID};
use crate::error::{InvariantViolation, Rejection};
use crate::events::JobCompletion;
use crate::gates::{GateEvaluator, PlacementPlan, UpgradePlan};
use crate::invariants::{try_validate_invariants, validate_invariants};
use crate::ledger::ResourceLedger;
use crate::production::production_per_second;
use crate::scheduler::{BuildQueue, QueueInfo};
use crate::state::{create_initial_state, SettlementState};
use crate::tick;
use crate::troops::TroopCatalog;

/// Job state of one plot as shown to the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobStatus {
    pub constructing: bool,
    pub upgrading: bool,
    pub remaining_ms: u64,
    pub upgrading_to_level: Option<u8>,
}

pub struct Settlement {
    pub(crate) catalog: Arc<BuildingCatalog>,
    pub(crate) plots: Arc<PlotRegistry>,
    pub(crate) config: SettlementConfig,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) troops: Arc<TroopCatalog>,
    pub(crate) state: SettlementState,
}

impl fmt::Debug for Settlement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settlement")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Settlement {
    /// Create a settlement with starting resources and a level 1 town hall.
    pub fn new(
        catalog: Arc<BuildingCatalog>,
        plots: Arc<PlotRegistry>,
        config: SettlementConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let state = create_initial_state(&config);
        let mut settlement = Self {
            catalog,
            plots,
            config,
            clock,
            troops: Arc::new(TroopCatalog::standard()),
            state,
        };
        settlement.ensure_townhall();
        settlement
    }

    /// Standard catalog, standard plots, default config.
    pub fn with_defaults(clock: Arc<dyn Clock>) -> Self {
        Self::new(
            Arc::new(BuildingCatalog::standard()),
            Arc::new(PlotRegistry::standard()),
            SettlementConfig::default(),
            clock,
        )
    }

    /// Replace the troop table. Meant for setup, before any training.
    pub fn with_troop_catalog(mut self, troops: Arc<TroopCatalog>) -> Self {
        self.troops = troops;
        self
    }

    // ── Time ───────────────────────────────────────────────────────

    pub fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Resolve every job due at `now`, training included. Safe to call
    /// every frame and after arbitrarily long gaps. Returns the building
    /// jobs that completed.
    pub fn tick(&mut self, now: u64) -> Vec<JobCompletion> {
        let completed = tick::tick(&mut self.state.buildings, now);
        let trained = self.resolve_training(now);
        self.after_completions(&completed, now);
        if completed.is_empty() && !trained.is_empty() {
            self.assert_invariants(now);
        }
        completed
    }

    /// [`tick`](Self::tick) at the clock's current time.
    pub fn tick_now(&mut self) -> Vec<JobCompletion> {
        let now = self.now();
        self.tick(now)
    }

    /// Complete every active job immediately, training included.
    pub fn finish_all_now(&mut self) -> Vec<JobCompletion> {
        let completed = tick::finish_all(&mut self.state.buildings);
        self.finish_all_training();
        let now = self.now();
        let target = crate::training::training_slots(self.barracks_level());
        self.state.training.sync_slots(target);
        self.after_completions(&completed, now);
        completed
    }

    fn after_completions(&self, completed: &[JobCompletion], now: u64) {
        for c in completed {
            info!(
                plot = %c.plot_id,
                building = %c.building_id,
                kind = ?c.kind,
                level = c.level,
                "job complete"
            );
        }
        if !completed.is_empty() {
            self.assert_invariants(now);
        }
    }

    /// Add `dt_secs` worth of production to the ledger.
    pub fn accumulate(&mut self, dt_secs: f64) {
        let rates = self.get_production_per_second();
        self.state.resources.accumulate(dt_secs, &rates);
    }

    // ── Setup ──────────────────────────────────────────────────────

    /// Seed a level 1 town hall on the town-hall plot if none exists.
    /// Returns whether one was seeded.
    pub fn ensure_townhall(&mut self) -> bool {
        if self.state.buildings.townhall().is_some() {
            return false;
        }
        let plot_id = self.plots.townhall_plot().id.clone();
        let instance = BuildingInstance::new(&plot_id, TOWNHALL_ID, 1, Job::Idle);
        match self.state.buildings.insert(instance, true) {
            Ok(()) => {
                info!(plot = %plot_id, "seeded town hall");
                true
            }
            Err(e) => {
                warn!(plot = %plot_id, error = %e, "could not seed town hall");
                false
            }
        }
    }

    /// Switch between timed and instant mode. Running jobs keep their end
    /// times either way.
    pub fn set_timers_enabled(&mut self, enabled: bool) {
        debug!(enabled, "timers toggled");
        self.config.timers_enabled = enabled;
    }

    /// Grant resources outside the normal economy (rewards, debug).
    pub fn credit(&mut self, amounts: &ResourceVector) {
        self.state.resources.credit(amounts);
    }

    // ── Gates ──────────────────────────────────────────────────────

    pub(crate) fn gates_at(&self, now: u64) -> GateEvaluator<'_> {
        GateEvaluator {
            catalog: &self.catalog,
            plots: &self.plots,
            store: &self.state.buildings,
            ledger: &self.state.resources,
            config: &self.config,
            now,
        }
    }

    pub fn can_place(&self, building_id: &str) -> Result<PlacementPlan, Rejection> {
        self.gates_at(self.now()).can_place(building_id)
    }

    pub fn can_upgrade(&self, plot_id: &str) -> Result<UpgradePlan, Rejection> {
        self.gates_at(self.now()).can_upgrade(plot_id)
    }

    // ── Queries ────────────────────────────────────────────────────

    pub fn get_instance(&self, plot_id: &str) -> Option<&BuildingInstance> {
        self.state.buildings.get(plot_id)
    }

    pub fn get_by_building_id(&self, building_id: &str) -> Option<&BuildingInstance> {
        self.state.buildings.by_building(building_id)
    }

    pub fn get_all_instances(&self) -> Vec<&BuildingInstance> {
        self.state.buildings.iter().collect()
    }

    /// `None` for an unknown plot; an empty plot reports an idle status.
    pub fn get_status(&self, plot_id: &str) -> Option<JobStatus> {
        if !self.plots.contains(plot_id) {
            return None;
        }
        let now = self.now();
        let Some(inst) = self.state.buildings.get(plot_id) else {
            return Some(JobStatus::default());
        };
        let status = match inst.job {
            Job::Constructing { end_at } if end_at > now => JobStatus {
                constructing: true,
                remaining_ms: remaining_ms(end_at, now),
                ..JobStatus::default()
            },
            Job::Upgrading { to_level, end_at } if end_at > now => JobStatus {
                upgrading: true,
                remaining_ms: remaining_ms(end_at, now),
                upgrading_to_level: Some(to_level),
                ..JobStatus::default()
            },
            _ => JobStatus::default(),
        };
        Some(status)
    }

    pub fn get_queue_info(&self) -> QueueInfo {
        BuildQueue::new(&self.state.buildings, self.config.queue_limit).info(self.now())
    }

    /// Recomputed on every call.
    pub fn get_production_per_second(&self) -> ResourceVector {
        production_per_second(self.state.buildings.iter(), &self.catalog)
    }

    pub fn resources(&self) -> &ResourceLedger {
        &self.state.resources
    }

    pub fn townhall_level(&self) -> u8 {
        self.state.buildings.townhall_level()
    }

    /// Cost of the next upgrade of the instance on `plot_id`, whether or not
    /// it is currently allowed. `None` for an empty plot or max level.
    pub fn upgrade_cost_preview(&self, plot_id: &str) -> Option<ResourceVector> {
        let inst = self.state.buildings.get(plot_id)?;
        if inst.level >= crate::MAX_LEVEL {
            return None;
        }
        let def = self.catalog.get(&inst.building_id)?;
        Some(
            self.catalog
                .upgrade_cost(def, inst.level, &self.config.cost_curve()),
        )
    }

    /// Seconds until current production covers `cost`.
    pub fn time_to_afford(&self, cost: &ResourceVector) -> Option<f64> {
        self.state
            .resources
            .time_to_afford(cost, &self.get_production_per_second())
    }

    pub fn state(&self) -> &SettlementState {
        &self.state
    }

    pub fn catalog(&self) -> &BuildingCatalog {
        &self.catalog
    }

    pub fn plots(&self) -> &PlotRegistry {
        &self.plots
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    // ── Invariants ─────────────────────────────────────────────────

    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        try_validate_invariants(
            &self.state,
            &self.catalog,
            &self.plots,
            &self.config,
            self.now(),
        )
    }

    pub(crate) fn assert_invariants(&self, now: u64) {
        validate_invariants(&self.state, &self.catalog, &self.plots, &self.config, now);
    }
}
