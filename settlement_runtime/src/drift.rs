//! Drift detection: determinism verification and state comparison.
//!
//! Used to check that a reloaded settlement matches the one that was saved,
//! and that the same command script always produces the same state.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use settlement_core::domain::{Job, Resource, ResourceVector};
use settlement_core::hashing::canonical_hash;
use settlement_core::state::SettlementState;
use settlement_core::Settlement;

/// An instance present in both states but different between them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceDrift {
    pub plot_id: String,
    pub building_a: String,
    pub building_b: String,
    pub level_a: u8,
    pub level_b: u8,
    pub job_a: Job,
    pub job_b: Job,
}

/// Structured comparison of two settlement states.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriftReport {
    pub hash_a: String,
    pub hash_b: String,
    pub townhall_level_a: u8,
    pub townhall_level_b: u8,
    /// `b - a` per resource; zero deltas omitted.
    pub resource_deltas: ResourceVector,
    pub added_plots: Vec<String>,
    pub removed_plots: Vec<String>,
    pub changed: Vec<InstanceDrift>,
    /// `b - a` trained troops per troop id; zero deltas omitted.
    pub troop_deltas: BTreeMap<String, i64>,
    /// Active training jobs on each side.
    pub training_jobs_a: usize,
    pub training_jobs_b: usize,
}

impl DriftReport {
    pub fn is_identical(&self) -> bool {
        self.hash_a == self.hash_b
    }
}

/// Compare two states plot by plot.
pub fn compare_states(a: &SettlementState, b: &SettlementState) -> DriftReport {
    let plots_a: BTreeSet<&str> = a.buildings.iter().map(|i| i.plot_id.as_str()).collect();
    let plots_b: BTreeSet<&str> = b.buildings.iter().map(|i| i.plot_id.as_str()).collect();

    let added_plots = plots_b.difference(&plots_a).map(|s| s.to_string()).collect();
    let removed_plots = plots_a.difference(&plots_b).map(|s| s.to_string()).collect();

    let mut changed = Vec::new();
    for plot in plots_a.intersection(&plots_b) {
        let (Some(ia), Some(ib)) = (a.buildings.get(plot), b.buildings.get(plot)) else {
            continue;
        };
        if ia != ib {
            changed.push(InstanceDrift {
                plot_id: plot.to_string(),
                building_a: ia.building_id.clone(),
                building_b: ib.building_id.clone(),
                level_a: ia.level,
                level_b: ib.level,
                job_a: ia.job,
                job_b: ib.job,
            });
        }
    }

    let resource_deltas = Resource::ALL
        .iter()
        .map(|r| (*r, b.resources.balance(*r) - a.resources.balance(*r)))
        .collect::<ResourceVector>()
        .without_zeros();

    let troop_ids: BTreeSet<&String> =
        a.training.troops.keys().chain(b.training.troops.keys()).collect();
    let count = |s: &SettlementState, id: &str| {
        i64::try_from(s.training.troop_count(id)).unwrap_or(i64::MAX)
    };
    let troop_deltas = troop_ids
        .into_iter()
        .filter_map(|id| {
            let delta = count(b, id).saturating_sub(count(a, id));
            (delta != 0).then(|| (id.clone(), delta))
        })
        .collect();

    DriftReport {
        hash_a: canonical_hash(a),
        hash_b: canonical_hash(b),
        townhall_level_a: a.buildings.townhall_level(),
        townhall_level_b: b.buildings.townhall_level(),
        resource_deltas,
        added_plots,
        removed_plots,
        changed,
        troop_deltas,
        training_jobs_a: a.training.active_jobs(),
        training_jobs_b: b.training.active_jobs(),
    }
}

/// Run `scenario` twice and compare the results. Returns the shared hash,
/// or the drift between the two runs.
pub fn verify_determinism<F>(scenario: F) -> Result<String, DriftReport>
where
    F: Fn() -> Settlement,
{
    let first = scenario();
    let second = scenario();
    let report = compare_states(first.state(), second.state());
    if report.is_identical() {
        Ok(report.hash_a)
    } else {
        Err(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use settlement_core::ManualClock;

    fn base(clock: &ManualClock) -> Settlement {
        let mut s = Settlement::with_defaults(Arc::new(clock.clone()));
        s.credit(&Resource::ALL.iter().map(|r| (*r, 1_000.0)).collect());
        s
    }

    #[test]
    fn identical_states_have_no_drift() {
        let clock = ManualClock::new(0);
        let s = base(&clock);
        let report = compare_states(s.state(), s.state());
        assert!(report.is_identical());
        assert!(report.changed.is_empty());
        assert!(report.resource_deltas.is_empty());
    }

    #[test]
    fn reports_added_plots_and_spent_resources() {
        let clock = ManualClock::new(0);
        let before = base(&clock);
        let mut after = base(&clock);
        after.place_building_on_plot("plot_a", "farm").unwrap();

        let report = compare_states(before.state(), after.state());
        assert!(!report.is_identical());
        assert_eq!(report.added_plots, vec!["plot_a".to_string()]);
        assert!(report.removed_plots.is_empty());
        assert_eq!(report.resource_deltas.get(Resource::Wood), Some(-60.0));
        assert_eq!(report.resource_deltas.get(Resource::Gold), Some(-10.0));
        assert_eq!(report.resource_deltas.get(Resource::Food), None);
    }

    #[test]
    fn reports_level_changes() {
        let clock = ManualClock::new(0);
        let before = base(&clock);
        let mut after = base(&clock);
        after.set_timers_enabled(false);
        after.upgrade_plot("townhall").unwrap();

        let report = compare_states(before.state(), after.state());
        assert_eq!(report.changed.len(), 1);
        assert_eq!((report.changed[0].level_a, report.changed[0].level_b), (1, 2));
        assert_eq!((report.townhall_level_a, report.townhall_level_b), (1, 2));
    }

    #[test]
    fn reports_trained_troops() {
        let clock = ManualClock::new(0);
        let before = base(&clock);
        let mut after = base(&clock);
        after.set_timers_enabled(false);
        after.upgrade_plot("townhall").unwrap();
        after.place_building_on_plot("plot_b", "barracks").unwrap();
        after.start_training(0, "infantry_T1", 3).unwrap();

        let report = compare_states(before.state(), after.state());
        assert_eq!(report.troop_deltas.get("infantry_T1"), Some(&3));
        assert_eq!(report.troop_deltas.len(), 1);
        assert_eq!((report.training_jobs_a, report.training_jobs_b), (0, 0));

        let back = compare_states(after.state(), before.state());
        assert_eq!(back.troop_deltas.get("infantry_T1"), Some(&-3));
    }

    #[test]
    fn scripted_run_is_deterministic() {
        let hash = verify_determinism(|| {
            let clock = ManualClock::new(42);
            let mut s = base(&clock);
            s.place_building_on_plot("plot_a", "farm").unwrap();
            clock.advance(60_000);
            s.tick_now();
            s.accumulate(60.0);
            s
        })
        .unwrap();
        assert_eq!(hash.len(), 64);
    }
}
