//! Gate evaluation.
//!
//! Pure decisions over a borrowed view of the settlement. A passing gate
//! returns the plan the command will execute (cost, target level, job
//! duration), so the preview shown to the player and the debit agree.

use crate::arithmetic::end_at;
use crate::catalog::{BuildingCatalog, BuildingDefinition, PlotRegistry};
use crate::config::SettlementConfig;
use crate::curves::job_duration_ms;
use crate::domain::{BuildingInstance, ResourceVector};
use crate::error::Rejection;
use crate::ledger::ResourceLedger;
use crate::scheduler::BuildQueue;
use crate::store::BuildingInstanceStore;
use crate::MAX_LEVEL;

/// A placement that passed every gate.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementPlan {
    pub building_id: String,
    pub unique: bool,
    pub cost: ResourceVector,
    /// `None` in instant mode.
    pub end_at: Option<u64>,
}

/// An upgrade that passed every gate.
#[derive(Debug, Clone, PartialEq)]
pub struct UpgradePlan {
    pub plot_id: String,
    pub building_id: String,
    pub from_level: u8,
    pub to_level: u8,
    pub cost: ResourceVector,
    /// `None` in instant mode.
    pub end_at: Option<u64>,
}

pub struct GateEvaluator<'a> {
    pub catalog: &'a BuildingCatalog,
    pub plots: &'a PlotRegistry,
    pub store: &'a BuildingInstanceStore,
    pub ledger: &'a ResourceLedger,
    pub config: &'a SettlementConfig,
    pub now: u64,
}

impl<'a> GateEvaluator<'a> {
    fn queue(&self) -> BuildQueue<'a> {
        BuildQueue::new(self.store, self.config.queue_limit)
    }

    fn check_queue(&self) -> Result<(), Rejection> {
        if !self.config.timers_enabled {
            return Ok(());
        }
        let queue = self.queue();
        if queue.has_capacity(self.now) {
            Ok(())
        } else {
            Err(Rejection::QueueFull {
                active: queue.active_jobs(self.now),
                limit: queue.limit(),
            })
        }
    }

    fn schedule(&self, def: &BuildingDefinition, target_level: u8) -> Option<u64> {
        self.config
            .timers_enabled
            .then(|| end_at(self.now, job_duration_ms(def, target_level)))
    }

    /// Can `building_id` be placed somewhere right now?
    ///
    /// Checks, in order: unknown building, uniqueness, town hall level,
    /// builder capacity, placement cost.
    pub fn can_place(&self, building_id: &str) -> Result<PlacementPlan, Rejection> {
        let def = self
            .catalog
            .get(building_id)
            .ok_or_else(|| Rejection::UnknownBuilding(building_id.to_string()))?;

        if def.unique && self.store.by_building(building_id).is_some() {
            return Err(Rejection::AlreadyPlaced(building_id.to_string()));
        }

        let townhall_level = self.store.townhall_level();
        if townhall_level < def.min_townhall_level {
            return Err(Rejection::ProgressionTooLow {
                required: def.min_townhall_level,
                townhall_level,
            });
        }

        self.check_queue()?;

        if !self.ledger.can_afford(&def.placement_cost) {
            return Err(Rejection::InsufficientResources);
        }

        Ok(PlacementPlan {
            building_id: def.id.clone(),
            unique: def.unique,
            cost: def.placement_cost.clone(),
            end_at: self.schedule(def, 1),
        })
    }

    /// [`can_place`](Self::can_place) on a specific plot. The caller has
    /// already resolved `plot_id` against the registry.
    pub fn can_place_on(&self, plot_id: &str, building_id: &str) -> Result<PlacementPlan, Rejection> {
        if self.store.is_occupied(plot_id) {
            return Err(Rejection::PlotOccupied(plot_id.to_string()));
        }
        if let Some(plot) = self.plots.get(plot_id) {
            if !self.plots.accepts(plot, building_id) {
                return Err(Rejection::PlotNotBuildable(plot_id.to_string()));
            }
        }
        self.can_place(building_id)
    }

    /// Can the instance on `plot_id` start its next upgrade?
    ///
    /// Checks, in order: empty plot, busy instance, level ceiling, builder
    /// capacity, progression (town hall cap or town hall prerequisites),
    /// upgrade cost.
    pub fn can_upgrade(&self, plot_id: &str) -> Result<UpgradePlan, Rejection> {
        let inst = self
            .store
            .get(plot_id)
            .ok_or_else(|| Rejection::NoBuildingHere(plot_id.to_string()))?;

        if inst.is_busy() {
            return Err(Rejection::AlreadyBusy(plot_id.to_string()));
        }
        if inst.level >= MAX_LEVEL {
            return Err(Rejection::MaxLevelReached);
        }

        self.check_queue()?;

        let def = self
            .catalog
            .get(&inst.building_id)
            .ok_or_else(|| Rejection::UnknownBuilding(inst.building_id.clone()))?;
        let to_level = inst.level + 1;

        if inst.is_townhall() {
            self.check_townhall_prerequisites(inst)?;
        } else {
            let townhall_level = self.store.townhall_level();
            if to_level > townhall_level {
                return Err(Rejection::ProgressionTooLow {
                    required: to_level,
                    townhall_level,
                });
            }
        }

        let cost = self
            .catalog
            .upgrade_cost(def, inst.level, &self.config.cost_curve());
        if !self.ledger.can_afford(&cost) {
            return Err(Rejection::InsufficientResources);
        }

        Ok(UpgradePlan {
            plot_id: plot_id.to_string(),
            building_id: def.id.clone(),
            from_level: inst.level,
            to_level,
            cost,
            end_at: self.schedule(def, to_level),
        })
    }

    /// The town hall at level `L` advances only when every other instance
    /// has reached `L` and every building required at or below `L` exists.
    fn check_townhall_prerequisites(&self, townhall: &BuildingInstance) -> Result<(), Rejection> {
        let level = townhall.level;
        if let Some(lagging) = self
            .store
            .iter()
            .find(|i| !i.is_townhall() && i.level < level)
        {
            return Err(Rejection::MissingPrerequisite {
                building_id: lagging.building_id.clone(),
                required_level: level,
            });
        }
        if let Some(missing) = self
            .catalog
            .required_up_to(level)
            .find(|d| self.store.by_building(&d.id).is_none())
        {
            return Err(Rejection::MissingPrerequisite {
                building_id: missing.id.clone(),
                required_level: level,
            });
        }
        Ok(())
    }
}
