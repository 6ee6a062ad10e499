//! Building instance store.
//!
//! Authoritative plot -> instance map. Insertion enforces one instance per
//! plot and one instance per unique building; every other mutation is
//! crate-private so that only commands, ticks and hydration change state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{BuildingInstance, Job, TOWNHALL_ID};
use crate::error::Rejection;
use crate::events::{JobCompletion, JobKind};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildingInstanceStore {
    by_plot: BTreeMap<String, BuildingInstance>,
}

impl BuildingInstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, plot_id: &str) -> Option<&BuildingInstance> {
        self.by_plot.get(plot_id)
    }

    pub fn is_occupied(&self, plot_id: &str) -> bool {
        self.by_plot.contains_key(plot_id)
    }

    /// Instances in plot id order.
    pub fn iter(&self) -> impl Iterator<Item = &BuildingInstance> {
        self.by_plot.values()
    }

    /// `(plot_id, instance)` pairs in plot id order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &BuildingInstance)> {
        self.by_plot.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.by_plot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_plot.is_empty()
    }

    /// First instance of `building_id` in plot order.
    pub fn by_building(&self, building_id: &str) -> Option<&BuildingInstance> {
        self.iter().find(|i| i.building_id == building_id)
    }

    pub fn count_of(&self, building_id: &str) -> usize {
        self.iter().filter(|i| i.building_id == building_id).count()
    }

    pub fn townhall(&self) -> Option<&BuildingInstance> {
        self.by_building(TOWNHALL_ID)
    }

    /// Town hall level, 0 while no town hall exists.
    pub fn townhall_level(&self) -> u8 {
        self.townhall().map_or(0, |t| t.level)
    }

    /// Add `instance`. `unique` is the catalog flag of its building.
    pub(crate) fn insert(&mut self, instance: BuildingInstance, unique: bool) -> Result<(), Rejection> {
        if self.is_occupied(&instance.plot_id) {
            return Err(Rejection::PlotOccupied(instance.plot_id));
        }
        if unique && self.by_building(&instance.building_id).is_some() {
            return Err(Rejection::AlreadyPlaced(instance.building_id));
        }
        self.by_plot.insert(instance.plot_id.clone(), instance);
        Ok(())
    }

    pub(crate) fn get_mut(&mut self, plot_id: &str) -> Option<&mut BuildingInstance> {
        self.by_plot.get_mut(plot_id)
    }

    pub(crate) fn remove(&mut self, plot_id: &str) -> Option<BuildingInstance> {
        self.by_plot.remove(plot_id)
    }

    pub(crate) fn clear(&mut self) {
        self.by_plot.clear();
    }

    /// Promote the job on `plot_id` and return what finished. `None` when the
    /// plot is empty or idle, so a second call never completes twice.
    pub(crate) fn complete_job(&mut self, plot_id: &str) -> Option<JobCompletion> {
        let inst = self.by_plot.get_mut(plot_id)?;
        let kind = match inst.job {
            Job::Idle => return None,
            Job::Constructing { .. } => JobKind::Construction,
            Job::Upgrading { to_level, .. } => {
                inst.level = inst.level.max(to_level);
                JobKind::Upgrade
            }
        };
        inst.job = Job::Idle;
        Some(JobCompletion {
            plot_id: inst.plot_id.clone(),
            building_id: inst.building_id.clone(),
            kind,
            level: inst.level,
        })
    }
}
