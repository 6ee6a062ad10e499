//! Production model.

use std::collections::BTreeMap;

use crate::catalog::BuildingCatalog;
use crate::domain::{BuildingInstance, ResourceVector};

/// Per-second production of `instances`.
///
/// Levels are summed per building type over instances that are not under
/// construction; an upgrading instance still produces at its current level.
/// Every resource is present in the result, zero when nothing produces it.
pub fn production_per_second<'a, I>(instances: I, catalog: &BuildingCatalog) -> ResourceVector
where
    I: IntoIterator<Item = &'a BuildingInstance>,
{
    let mut levels: BTreeMap<&str, u32> = BTreeMap::new();
    for inst in instances {
        if inst.is_constructing() {
            continue;
        }
        *levels.entry(inst.building_id.as_str()).or_insert(0) += u32::from(inst.level);
    }

    let mut rates = ResourceVector::zeroed();
    for (building_id, total_level) in levels {
        let Some(rate) = catalog.get(building_id).and_then(|d| d.production) else {
            continue;
        };
        rates.add(rate.resource, rate.per_level * f64::from(total_level));
    }
    rates
}
