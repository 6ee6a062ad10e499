//! Time and cost curves.
//!
//! One curve family drives both job durations and upgrade costs: a base
//! upgrade time per level, scaled per building, converted into a total value
//! with a super-linear exponent and split across resources by the building's
//! profile. Everything here is pure and deterministic so previews and the
//! actual debit agree.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::arithmetic::secs_to_ms;
use crate::catalog::BuildingDefinition;
use crate::domain::{Resource, ResourceVector};
use crate::MAX_LEVEL;

/// Seconds to upgrade from level `L` to `L + 1`, indexed by `L - 1`.
pub const UPGRADE_SECONDS_BY_LEVEL: [u64; (MAX_LEVEL - 1) as usize] = [
    30, 60, 120, 300, 600, // 1..=5
    1_200, 1_800, 2_700, 3_600, // 6..=9
    7_200, 10_800, 14_400, 21_600, 28_800, // 10..=14
    43_200, 64_800, 86_400, 129_600, 172_800, // 15..=19
];

// Absorbs float dust from normalization so an exact share is not floored down.
const SHARE_EPSILON: f64 = 1e-9;

/// Parameters of `value = floor(scale * seconds^exponent)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostCurve {
    pub scale: f64,
    pub exponent: f64,
}

impl Default for CostCurve {
    fn default() -> Self {
        Self {
            scale: 6.0,
            exponent: 1.10,
        }
    }
}

impl CostCurve {
    /// Total resource value of an upgrade taking `seconds`.
    pub fn total_value(&self, seconds: f64) -> f64 {
        if seconds <= 0.0 {
            return 0.0;
        }
        (self.scale * seconds.powf(self.exponent)).floor()
    }
}

/// Level from which each resource may appear in an upgrade cost.
///
/// A resource with no producer in the catalog is never charged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceUnlocks {
    levels: BTreeMap<Resource, u8>,
}

impl ResourceUnlocks {
    /// Record that `resource` becomes available at `level`, keeping the lowest.
    pub fn unlock_at(&mut self, resource: Resource, level: u8) {
        let entry = self.levels.entry(resource).or_insert(level);
        *entry = (*entry).min(level);
    }

    pub fn level_of(&self, resource: Resource) -> Option<u8> {
        self.levels.get(&resource).copied()
    }

    /// Whether an upgrade starting at `from_level` may charge `resource`.
    pub fn is_unlocked(&self, resource: Resource, from_level: u8) -> bool {
        self.level_of(resource).is_some_and(|l| l <= from_level)
    }
}

/// Unscaled seconds for the upgrade starting at `from_level`.
pub fn base_upgrade_seconds(from_level: u8) -> u64 {
    let level = from_level.clamp(1, MAX_LEVEL - 1);
    UPGRADE_SECONDS_BY_LEVEL[(level - 1) as usize]
}

/// Seconds for `def` to upgrade from `from_level`.
pub fn upgrade_seconds(def: &BuildingDefinition, from_level: u8) -> f64 {
    base_upgrade_seconds(from_level) as f64 * def.time_multiplier
}

/// Duration of the job that brings `def` to `target_level`.
/// Construction (target 1) uses the first row of the table.
pub fn job_duration_ms(def: &BuildingDefinition, target_level: u8) -> u64 {
    let from_level = target_level.saturating_sub(1).max(1);
    secs_to_ms(upgrade_seconds(def, from_level))
}

/// Normalize profile weights to sum to 1. Each weight is clamped to `[0, 1]`
/// first; an all-zero profile charges everything in gold.
pub fn normalized_profile(profile: &ResourceVector) -> Vec<(Resource, f64)> {
    let weights: Vec<(Resource, f64)> = Resource::ALL
        .iter()
        .map(|r| (*r, profile.amount(*r).clamp(0.0, 1.0)))
        .collect();
    let sum: f64 = weights.iter().map(|(_, w)| w).sum();
    if sum <= 0.0 {
        return vec![(Resource::Gold, 1.0)];
    }
    weights
        .into_iter()
        .map(|(r, w)| (r, w / sum))
        .collect()
}

/// Cost to upgrade `def` from `from_level` to `from_level + 1`.
///
/// Zero shares are omitted rather than charged as zero, and so are shares of
/// resources still locked at `from_level`. Locked shares are dropped, not
/// redistributed, which keeps every resource non-decreasing in level.
pub fn upgrade_cost(
    def: &BuildingDefinition,
    from_level: u8,
    curve: &CostCurve,
    unlocks: &ResourceUnlocks,
) -> ResourceVector {
    let total = curve.total_value(upgrade_seconds(def, from_level));
    normalized_profile(&def.cost_profile)
        .into_iter()
        .filter(|(r, _)| unlocks.is_unlocked(*r, from_level))
        .map(|(r, share)| (r, (total * share + SHARE_EPSILON).floor()))
        .collect::<ResourceVector>()
        .without_zeros()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::BuildingCatalog;

    #[test]
    fn table_is_non_decreasing() {
        for pair in UPGRADE_SECONDS_BY_LEVEL.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
    }

    #[test]
    fn base_seconds_clamp_to_table() {
        assert_eq!(base_upgrade_seconds(0), 30);
        assert_eq!(base_upgrade_seconds(1), 30);
        assert_eq!(base_upgrade_seconds(19), 172_800);
        assert_eq!(base_upgrade_seconds(20), 172_800);
    }

    #[test]
    fn construction_and_first_upgrade_share_a_row() {
        let catalog = BuildingCatalog::standard();
        let farm = catalog.get("farm").unwrap();
        // farm multiplier 0.5 of 30s
        assert_eq!(job_duration_ms(farm, 1), 15_000);
        assert_eq!(job_duration_ms(farm, 2), 15_000);
        assert_eq!(job_duration_ms(farm, 3), 30_000);
    }

    #[test]
    fn townhall_first_upgrade_cost() {
        let catalog = BuildingCatalog::standard();
        let th = catalog.get("townhall").unwrap();
        // value = floor(6 * 30^1.1) = 252
        let cost = upgrade_cost(th, 1, &CostCurve::default(), catalog.resource_unlocks());
        assert_eq!(CostCurve::default().total_value(30.0), 252.0);
        assert_eq!(cost.get(Resource::Gold), Some(88.0));
        assert_eq!(cost.get(Resource::Wood), Some(63.0));
        assert_eq!(cost.get(Resource::Food), Some(12.0));
        // no quarry or mine can exist yet
        assert_eq!(cost.get(Resource::Stone), None);
        assert_eq!(cost.get(Resource::Ore), None);
    }

    #[test]
    fn stone_joins_the_townhall_cost_once_quarries_unlock() {
        let catalog = BuildingCatalog::standard();
        let th = catalog.get("townhall").unwrap();
        let unlocks = catalog.resource_unlocks();
        let curve = CostCurve::default();
        assert_eq!(upgrade_cost(th, 4, &curve, unlocks).get(Resource::Stone), None);
        assert!(upgrade_cost(th, 5, &curve, unlocks).get(Resource::Stone).is_some());
        assert!(upgrade_cost(th, 6, &curve, unlocks).get(Resource::Ore).is_some());
    }

    #[test]
    fn unlocks_keep_the_lowest_level() {
        let mut unlocks = ResourceUnlocks::default();
        unlocks.unlock_at(Resource::Gold, 3);
        unlocks.unlock_at(Resource::Gold, 1);
        unlocks.unlock_at(Resource::Gold, 2);
        assert_eq!(unlocks.level_of(Resource::Gold), Some(1));
        assert!(!unlocks.is_unlocked(Resource::Ore, 20));
    }

    #[test]
    fn zero_weight_resources_are_omitted() {
        let catalog = BuildingCatalog::standard();
        let farm = catalog.get("farm").unwrap();
        let cost = upgrade_cost(farm, 4, &CostCurve::default(), catalog.resource_unlocks());
        assert_eq!(cost.get(Resource::Ore), None);
        assert!(cost.get(Resource::Wood).is_some());
    }

    #[test]
    fn cost_is_monotonic_and_deterministic_for_every_building() {
        let catalog = BuildingCatalog::standard();
        let curve = CostCurve::default();
        for def in catalog.iter() {
            let mut previous = ResourceVector::new();
            for level in 1..MAX_LEVEL {
                let cost = upgrade_cost(def, level, &curve, catalog.resource_unlocks());
                assert_eq!(cost, upgrade_cost(def, level, &curve, catalog.resource_unlocks()));
                for r in Resource::ALL {
                    assert!(
                        cost.amount(r) >= previous.amount(r),
                        "{} {} level {}",
                        def.id,
                        r,
                        level
                    );
                }
                previous = cost;
            }
        }
    }

    #[test]
    fn empty_profile_falls_back_to_gold() {
        let profile = normalized_profile(&ResourceVector::new());
        assert_eq!(profile, vec![(Resource::Gold, 1.0)]);
    }
}
