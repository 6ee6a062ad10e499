//! Troop catalog.
//!
//! Four troop types in four tiers. A tier scales a type's cost, training
//! time and stats; the barracks level decides which tiers may be trained.
//! Ids are `<type>_<tier>`, e.g. `archer_T2`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::arithmetic::is_valid_id;
use crate::domain::{Resource, ResourceVector};
use crate::error::CatalogError;

// ── Tiers ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    T1,
    T2,
    T3,
    T4,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::T1, Tier::T2, Tier::T3, Tier::T4];

    /// Barracks level that unlocks training of this tier.
    pub fn unlock_level(self) -> u8 {
        match self {
            Tier::T1 => 1,
            Tier::T2 => 5,
            Tier::T3 => 10,
            Tier::T4 => 15,
        }
    }

    fn stat_multiplier(self) -> f64 {
        match self {
            Tier::T1 => 1.0,
            Tier::T2 => 2.0,
            Tier::T3 => 4.0,
            Tier::T4 => 8.0,
        }
    }

    fn cost_multiplier(self) -> f64 {
        match self {
            Tier::T1 => 1.0,
            Tier::T2 => 2.5,
            Tier::T3 => 5.0,
            Tier::T4 => 10.0,
        }
    }

    fn time_multiplier(self) -> f64 {
        match self {
            Tier::T1 => 1.0,
            Tier::T2 => 2.2,
            Tier::T3 => 4.5,
            Tier::T4 => 9.0,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Tier::T1 => "T1",
            Tier::T2 => "T2",
            Tier::T3 => "T3",
            Tier::T4 => "T4",
        };
        f.write_str(s)
    }
}

// ── Troop types ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TroopType {
    Infantry,
    Archer,
    Cavalry,
    Siege,
}

impl TroopType {
    pub const ALL: [TroopType; 4] = [
        TroopType::Infantry,
        TroopType::Archer,
        TroopType::Cavalry,
        TroopType::Siege,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TroopType::Infantry => "infantry",
            TroopType::Archer => "archer",
            TroopType::Cavalry => "cavalry",
            TroopType::Siege => "siege",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TroopType::Infantry => "Infantry",
            TroopType::Archer => "Archers",
            TroopType::Cavalry => "Cavalry",
            TroopType::Siege => "Siege",
        }
    }

    fn base_stats(self) -> TroopStats {
        let (hp, atk, def, speed, carry) = match self {
            TroopType::Infantry => (100, 10, 12, 8, 8),
            TroopType::Archer => (70, 16, 6, 9, 6),
            TroopType::Cavalry => (85, 14, 8, 12, 10),
            TroopType::Siege => (120, 22, 4, 6, 4),
        };
        TroopStats {
            hp,
            atk,
            def,
            speed,
            carry,
        }
    }

    /// Per-unit T1 cost as (food, wood, stone, ore).
    fn base_cost(self) -> [f64; 4] {
        match self {
            TroopType::Infantry => [30.0, 15.0, 0.0, 5.0],
            TroopType::Archer => [25.0, 25.0, 0.0, 5.0],
            TroopType::Cavalry => [40.0, 10.0, 0.0, 15.0],
            TroopType::Siege => [35.0, 15.0, 25.0, 25.0],
        }
    }

    fn base_train_seconds(self) -> f64 {
        match self {
            TroopType::Infantry => 8.0,
            TroopType::Archer => 10.0,
            TroopType::Cavalry => 12.0,
            TroopType::Siege => 18.0,
        }
    }
}

pub fn troop_id(troop_type: TroopType, tier: Tier) -> String {
    format!("{}_{}", troop_type.as_str(), tier)
}

// ── Definitions ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TroopStats {
    pub hp: u32,
    pub atk: u32,
    pub def: u32,
    /// Not scaled by tier.
    pub speed: u32,
    pub carry: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TroopDefinition {
    pub id: String,
    pub troop_type: TroopType,
    pub tier: Tier,
    pub label: String,
    pub stats: TroopStats,
    /// Cost of one unit.
    pub cost: ResourceVector,
    /// Seconds to train one unit.
    pub train_seconds: u64,
}

impl TroopDefinition {
    /// Derive the standard definition of `troop_type` at `tier`.
    pub fn derive(troop_type: TroopType, tier: Tier) -> Self {
        let base = troop_type.base_stats();
        let scale = |v: u32| (f64::from(v) * tier.stat_multiplier()).round() as u32;
        let stats = TroopStats {
            hp: scale(base.hp),
            atk: scale(base.atk),
            def: scale(base.def),
            speed: base.speed,
            carry: scale(base.carry),
        };

        let resources = [Resource::Food, Resource::Wood, Resource::Stone, Resource::Ore];
        let cost = resources
            .into_iter()
            .zip(troop_type.base_cost())
            .map(|(r, amount)| (r, (amount * tier.cost_multiplier()).round()))
            .collect::<ResourceVector>()
            .without_zeros();

        Self {
            id: troop_id(troop_type, tier),
            troop_type,
            tier,
            label: format!("{} {}", troop_type.label(), tier),
            stats,
            cost,
            train_seconds: (troop_type.base_train_seconds() * tier.time_multiplier()).round() as u64,
        }
    }

    /// Total cost of training `amount` units.
    pub fn cost_for(&self, amount: u32) -> ResourceVector {
        self.cost
            .iter()
            .map(|(r, a)| (r, a * f64::from(amount)))
            .collect()
    }

    /// Training time of `amount` units, in ms.
    pub fn duration_ms(&self, amount: u32) -> u64 {
        self.train_seconds
            .max(1)
            .saturating_mul(1_000)
            .saturating_mul(u64::from(amount))
    }

    fn has_valid_numbers(&self) -> bool {
        self.train_seconds > 0 && self.cost.iter().all(|(_, a)| a.is_finite() && a >= 0.0)
    }
}

// ── Catalog ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct TroopCatalog {
    troops: BTreeMap<String, TroopDefinition>,
}

impl TroopCatalog {
    pub fn new(definitions: Vec<TroopDefinition>) -> Result<Self, CatalogError> {
        let mut troops = BTreeMap::new();
        for def in definitions {
            if !is_valid_id(&def.id) || !def.has_valid_numbers() {
                return Err(CatalogError::InvalidTroop(def.id));
            }
            if troops.contains_key(&def.id) {
                return Err(CatalogError::DuplicateTroop(def.id));
            }
            troops.insert(def.id.clone(), def);
        }
        Ok(Self { troops })
    }

    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let defs: Vec<TroopDefinition> = serde_json::from_str(json)?;
        Self::new(defs)
    }

    pub fn get(&self, troop_id: &str) -> Option<&TroopDefinition> {
        self.troops.get(troop_id)
    }

    pub fn contains(&self, troop_id: &str) -> bool {
        self.troops.contains_key(troop_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TroopDefinition> {
        self.troops.values()
    }

    /// Every type in every tier.
    pub fn standard() -> Self {
        let defs = TroopType::ALL
            .into_iter()
            .flat_map(|t| Tier::ALL.into_iter().map(move |tier| TroopDefinition::derive(t, tier)))
            .collect();
        match Self::new(defs) {
            Ok(catalog) => catalog,
            Err(e) => unreachable!("standard troop catalog is invalid: {e}"),
        }
    }
}

impl Default for TroopCatalog {
    fn default() -> Self {
        Self::standard()
    }
}
