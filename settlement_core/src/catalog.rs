//! Static tables: building definitions and the plot registry.
//!
//! Both are validated once at construction and shared read-only
//! (`Arc`) with every settlement that uses them.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::arithmetic::is_valid_id;
use crate::curves::{self, CostCurve, ResourceUnlocks};
use crate::domain::{Footprint, Plot, Resource, ResourceVector, TOWNHALL_ID};
use crate::error::CatalogError;

/// Linear production: `per_level` units of `resource` per second per level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProductionRate {
    pub resource: Resource,
    pub per_level: f64,
}

/// Immutable definition of a building type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildingDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub unique: bool,
    /// Town hall level needed to place this building.
    #[serde(default)]
    pub min_townhall_level: u8,
    /// Once the town hall reaches this level, it cannot advance further
    /// until at least one of these is placed.
    #[serde(default)]
    pub required_at_townhall: Option<u8>,
    pub placement_cost: ResourceVector,
    #[serde(default = "default_time_multiplier")]
    pub time_multiplier: f64,
    /// Resource split of upgrade costs; weights are normalized.
    pub cost_profile: ResourceVector,
    #[serde(default)]
    pub production: Option<ProductionRate>,
}

/// Time multiplier of a definition that does not set one.
pub const DEFAULT_TIME_MULTIPLIER: f64 = 0.75;

fn default_time_multiplier() -> f64 {
    DEFAULT_TIME_MULTIPLIER
}

impl BuildingDefinition {
    fn has_valid_numbers(&self) -> bool {
        let finite_non_negative = |v: f64| v.is_finite() && v >= 0.0;
        finite_non_negative(self.time_multiplier)
            && self.placement_cost.iter().all(|(_, a)| finite_non_negative(a))
            && self.cost_profile.iter().all(|(_, a)| finite_non_negative(a))
            && self
                .production
                .map_or(true, |p| finite_non_negative(p.per_level))
    }
}

// ---------------------------------------------------------------------------
// BuildingCatalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct BuildingCatalog {
    definitions: BTreeMap<String, BuildingDefinition>,
    unlocks: ResourceUnlocks,
}

impl BuildingCatalog {
    /// Validate and index `definitions`.
    pub fn new(definitions: Vec<BuildingDefinition>) -> Result<Self, CatalogError> {
        let mut by_id = BTreeMap::new();
        for def in definitions {
            if !is_valid_id(&def.id) {
                return Err(CatalogError::InvalidBuildingId(def.id));
            }
            if !def.has_valid_numbers() {
                return Err(CatalogError::InvalidNumbers(def.id));
            }
            if by_id.contains_key(&def.id) {
                return Err(CatalogError::DuplicateBuilding(def.id));
            }
            by_id.insert(def.id.clone(), def);
        }
        if !by_id.contains_key(TOWNHALL_ID) {
            return Err(CatalogError::MissingTownhall);
        }

        let mut unlocks = ResourceUnlocks::default();
        for def in by_id.values() {
            if let Some(rate) = def.production {
                unlocks.unlock_at(rate.resource, def.min_townhall_level);
            }
        }

        Ok(Self {
            definitions: by_id,
            unlocks,
        })
    }

    /// Parse a JSON array of definitions.
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let defs: Vec<BuildingDefinition> = serde_json::from_str(json)?;
        Self::new(defs)
    }

    pub fn get(&self, building_id: &str) -> Option<&BuildingDefinition> {
        self.definitions.get(building_id)
    }

    pub fn contains(&self, building_id: &str) -> bool {
        self.definitions.contains_key(building_id)
    }

    /// Definitions in id order.
    pub fn iter(&self) -> impl Iterator<Item = &BuildingDefinition> {
        self.definitions.values()
    }

    pub fn is_unique(&self, building_id: &str) -> bool {
        self.get(building_id).is_some_and(|d| d.unique)
    }

    pub fn resource_unlocks(&self) -> &ResourceUnlocks {
        &self.unlocks
    }

    /// Cost to upgrade `def` from `from_level`; see [`curves::upgrade_cost`].
    pub fn upgrade_cost(
        &self,
        def: &BuildingDefinition,
        from_level: u8,
        curve: &CostCurve,
    ) -> ResourceVector {
        curves::upgrade_cost(def, from_level, curve, &self.unlocks)
    }

    /// Buildings whose `required_at_townhall` is at or below `townhall_level`.
    pub fn required_up_to(&self, townhall_level: u8) -> impl Iterator<Item = &BuildingDefinition> {
        self.iter()
            .filter(move |d| d.required_at_townhall.is_some_and(|l| l <= townhall_level))
    }

    /// The nine-building catalog the game ships with.
    pub fn standard() -> Self {
        // The table is static and valid; `new` only fails on malformed input.
        match Self::new(standard_definitions()) {
            Ok(catalog) => catalog,
            Err(e) => unreachable!("standard catalog is invalid: {e}"),
        }
    }
}

fn cost(pairs: &[(Resource, f64)]) -> ResourceVector {
    pairs.iter().copied().collect()
}

fn profile(food: f64, wood: f64, stone: f64, ore: f64, gold: f64) -> ResourceVector {
    cost(&[
        (Resource::Food, food),
        (Resource::Wood, wood),
        (Resource::Stone, stone),
        (Resource::Ore, ore),
        (Resource::Gold, gold),
    ])
}

fn produces(resource: Resource, per_level: f64) -> Option<ProductionRate> {
    Some(ProductionRate {
        resource,
        per_level,
    })
}

#[allow(clippy::too_many_arguments)]
fn def(
    id: &str,
    name: &str,
    unique: bool,
    min_townhall_level: u8,
    required_at_townhall: Option<u8>,
    placement_cost: ResourceVector,
    time_multiplier: f64,
    cost_profile: ResourceVector,
    production: Option<ProductionRate>,
) -> BuildingDefinition {
    BuildingDefinition {
        id: id.to_string(),
        name: name.to_string(),
        unique,
        min_townhall_level,
        required_at_townhall,
        placement_cost,
        time_multiplier,
        cost_profile,
        production,
    }
}

fn standard_definitions() -> Vec<BuildingDefinition> {
    use Resource::*;
    vec![
        def(
            TOWNHALL_ID,
            "Town Hall",
            true,
            0,
            None,
            ResourceVector::new(),
            1.0,
            profile(0.05, 0.25, 0.25, 0.10, 0.35),
            produces(Gold, 0.2),
        ),
        def(
            "farm",
            "Farm",
            false,
            1,
            Some(2),
            cost(&[(Wood, 60.0), (Gold, 10.0)]),
            0.5,
            profile(0.30, 0.55, 0.05, 0.00, 0.10),
            produces(Food, 1.5),
        ),
        def(
            "lumber",
            "Lumber Yard",
            false,
            1,
            Some(3),
            cost(&[(Wood, 40.0), (Gold, 10.0)]),
            0.5,
            profile(0.25, 0.60, 0.05, 0.00, 0.10),
            produces(Wood, 1.2),
        ),
        def(
            "barracks",
            "Barracks",
            true,
            2,
            Some(4),
            cost(&[(Wood, 120.0), (Gold, 60.0)]),
            0.8,
            profile(0.10, 0.35, 0.20, 0.10, 0.25),
            None,
        ),
        def(
            "quarry",
            "Quarry",
            false,
            5,
            Some(5),
            cost(&[(Wood, 80.0), (Gold, 25.0)]),
            0.6,
            profile(0.05, 0.20, 0.55, 0.05, 0.15),
            produces(Stone, 1.0),
        ),
        def(
            "house",
            "House",
            false,
            1,
            Some(6),
            cost(&[(Wood, 80.0), (Gold, 20.0)]),
            0.4,
            profile(0.10, 0.55, 0.10, 0.00, 0.25),
            produces(Gold, 0.5),
        ),
        def(
            "mine",
            "Mine",
            false,
            6,
            Some(7),
            cost(&[(Wood, 120.0), (Gold, 40.0)]),
            0.6,
            profile(0.05, 0.15, 0.25, 0.45, 0.10),
            produces(Ore, 0.8),
        ),
        def(
            "academy",
            "Academy",
            true,
            8,
            Some(8),
            cost(&[(Wood, 120.0), (Stone, 80.0), (Gold, 80.0)]),
            0.9,
            profile(0.05, 0.20, 0.20, 0.15, 0.40),
            None,
        ),
        def(
            "commandcenter",
            "Command Center",
            true,
            5,
            Some(10),
            cost(&[(Wood, 150.0), (Stone, 120.0), (Gold, 120.0)]),
            1.1,
            profile(0.05, 0.20, 0.25, 0.15, 0.35),
            None,
        ),
    ]
}

// ---------------------------------------------------------------------------
// PlotRegistry
// ---------------------------------------------------------------------------

/// The fixed list of plots. One of them is the town-hall plot, which only
/// ever holds the town hall.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotRegistry {
    plots: Vec<Plot>,
    townhall_index: usize,
}

impl PlotRegistry {
    /// Validate `plots`. The town-hall plot is the first whose id contains
    /// "townhall", or the first plot when none does.
    pub fn new(plots: Vec<Plot>) -> Result<Self, CatalogError> {
        if plots.is_empty() {
            return Err(CatalogError::NoPlots);
        }
        let mut seen = BTreeSet::new();
        for plot in &plots {
            if !is_valid_id(&plot.id) {
                return Err(CatalogError::InvalidPlotId(plot.id.clone()));
            }
            if !seen.insert(plot.id.as_str()) {
                return Err(CatalogError::DuplicatePlot(plot.id.clone()));
            }
        }
        let townhall_index = plots
            .iter()
            .position(|p| p.id.to_ascii_lowercase().contains(TOWNHALL_ID))
            .unwrap_or(0);
        Ok(Self {
            plots,
            townhall_index,
        })
    }

    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let plots: Vec<Plot> = serde_json::from_str(json)?;
        Self::new(plots)
    }

    pub fn get(&self, plot_id: &str) -> Option<&Plot> {
        self.plots.iter().find(|p| p.id == plot_id)
    }

    pub fn contains(&self, plot_id: &str) -> bool {
        self.get(plot_id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Plot> {
        self.plots.iter()
    }

    pub fn len(&self) -> usize {
        self.plots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plots.is_empty()
    }

    pub fn townhall_plot(&self) -> &Plot {
        &self.plots[self.townhall_index]
    }

    /// Whether `building_id` may stand on `plot`.
    pub fn accepts(&self, plot: &Plot, building_id: &str) -> bool {
        if !plot.buildable {
            return false;
        }
        plot.id != self.townhall_plot().id || building_id == TOWNHALL_ID
    }

    /// The city layout: a 6x3 town-hall pad and nine 2x2 pads.
    pub fn standard() -> Self {
        let pad = |id: &str, width, height| Plot {
            id: id.to_string(),
            footprint: Footprint { width, height },
            buildable: true,
        };
        let mut plots = vec![pad(TOWNHALL_ID, 6, 3)];
        for id in [
            "plot_a", "plot_b", "plot_c", "plot_d", "plot_e", "plot_f", "plot_h", "plot_i",
            "plot_j",
        ] {
            plots.push(pad(id, 2, 2));
        }
        match Self::new(plots) {
            Ok(registry) => registry,
            Err(e) => unreachable!("standard plot registry is invalid: {e}"),
        }
    }
}
