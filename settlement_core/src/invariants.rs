//! Progression invariant checks.
//!
//! `validate_invariants` is the hard-fail variant run after every accepted
//! command and every tick that changed state; a failure there is a bug.
//! `try_validate_invariants` returns the first violation instead and is used
//! where untrusted data is involved (loading a save).

use std::collections::BTreeSet;

use crate::catalog::{BuildingCatalog, PlotRegistry};
use crate::config::SettlementConfig;
use crate::domain::{Job, Resource};
use crate::error::InvariantViolation;
use crate::scheduler::BuildQueue;
use crate::state::SettlementState;
use crate::MAX_LEVEL;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run every check. Panics on the first failure.
pub fn validate_invariants(
    state: &SettlementState,
    catalog: &BuildingCatalog,
    plots: &PlotRegistry,
    config: &SettlementConfig,
    now: u64,
) {
    if let Err(violation) = try_validate_invariants(state, catalog, plots, config, now) {
        panic!("Invariant violation: {violation}");
    }
}

/// Non-panicking variant of [`validate_invariants`].
pub fn try_validate_invariants(
    state: &SettlementState,
    catalog: &BuildingCatalog,
    plots: &PlotRegistry,
    config: &SettlementConfig,
    now: u64,
) -> Result<(), InvariantViolation> {
    check_plot_occupancy(state, catalog, plots)?;
    check_unique_buildings(state, catalog)?;
    check_level_range(state)?;
    check_job_shape(state)?;
    check_queue_limit(state, config, now)?;
    check_townhall_present(state)?;
    check_townhall_cap(state)?;
    check_balances(state)?;
    check_training(state)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Individual checks (private)
// ---------------------------------------------------------------------------

fn violation(rule: &'static str, detail: String) -> Result<(), InvariantViolation> {
    Err(InvariantViolation { rule, detail })
}

/// Every instance sits on a known plot that may hold it, under its own key,
/// and is of a known building type.
fn check_plot_occupancy(
    state: &SettlementState,
    catalog: &BuildingCatalog,
    plots: &PlotRegistry,
) -> Result<(), InvariantViolation> {
    for (key, inst) in state.buildings.entries() {
        if key != inst.plot_id {
            return violation(
                "plot_key",
                format!("instance on {:?} is keyed under {:?}", inst.plot_id, key),
            );
        }
        let Some(plot) = plots.get(key) else {
            return violation("plot_known", format!("instance on unknown plot {key:?}"));
        };
        if !plots.accepts(plot, &inst.building_id) {
            return violation(
                "plot_buildable",
                format!("plot {key:?} cannot hold {:?}", inst.building_id),
            );
        }
        if !catalog.contains(&inst.building_id) {
            return violation(
                "building_known",
                format!("plot {key:?} holds unknown building {:?}", inst.building_id),
            );
        }
    }
    Ok(())
}

fn check_unique_buildings(
    state: &SettlementState,
    catalog: &BuildingCatalog,
) -> Result<(), InvariantViolation> {
    let mut seen = BTreeSet::new();
    for inst in state.buildings.iter() {
        if catalog.is_unique(&inst.building_id) && !seen.insert(inst.building_id.as_str()) {
            return violation(
                "unique_building",
                format!("{:?} exists more than once", inst.building_id),
            );
        }
    }
    Ok(())
}

fn check_level_range(state: &SettlementState) -> Result<(), InvariantViolation> {
    for inst in state.buildings.iter() {
        if !(1..=MAX_LEVEL).contains(&inst.level) {
            return violation(
                "level_range",
                format!("{:?} on {:?} has level {}", inst.building_id, inst.plot_id, inst.level),
            );
        }
    }
    Ok(())
}

/// An upgrade always targets exactly the next level.
fn check_job_shape(state: &SettlementState) -> Result<(), InvariantViolation> {
    for inst in state.buildings.iter() {
        if let Job::Upgrading { to_level, .. } = inst.job {
            if u16::from(to_level) != u16::from(inst.level) + 1 || to_level > MAX_LEVEL {
                return violation(
                    "upgrade_target",
                    format!(
                        "{:?} at level {} upgrading to {}",
                        inst.plot_id, inst.level, to_level
                    ),
                );
            }
        }
    }
    Ok(())
}

fn check_queue_limit(
    state: &SettlementState,
    config: &SettlementConfig,
    now: u64,
) -> Result<(), InvariantViolation> {
    let queue = BuildQueue::new(&state.buildings, config.queue_limit);
    let active = queue.active_jobs(now);
    if active > queue.limit() {
        return violation(
            "queue_limit",
            format!("{active} active jobs exceed the limit of {}", queue.limit()),
        );
    }
    Ok(())
}

fn check_townhall_present(state: &SettlementState) -> Result<(), InvariantViolation> {
    if state.buildings.townhall().is_none() {
        return violation("townhall_present", "no town hall".to_string());
    }
    Ok(())
}

/// No building outranks the town hall.
fn check_townhall_cap(state: &SettlementState) -> Result<(), InvariantViolation> {
    let cap = state.buildings.townhall_level();
    for inst in state.buildings.iter().filter(|i| !i.is_townhall()) {
        if inst.level > cap {
            return violation(
                "townhall_cap",
                format!(
                    "{:?} on {:?} is level {} above town hall level {}",
                    inst.building_id, inst.plot_id, inst.level, cap
                ),
            );
        }
    }
    Ok(())
}

fn check_balances(state: &SettlementState) -> Result<(), InvariantViolation> {
    for resource in Resource::ALL {
        let amount = state.resources.balance(resource);
        if !amount.is_finite() || amount < 0.0 {
            return violation("balance", format!("{resource} balance is {amount}"));
        }
    }
    Ok(())
}

/// Every training job holds at least one unit and ends no earlier than it
/// started; troop counts are positive.
fn check_training(state: &SettlementState) -> Result<(), InvariantViolation> {
    for (slot, job) in state.training.slots.iter().enumerate() {
        let Some(job) = job else { continue };
        if job.amount == 0 || job.end_at < job.start_at {
            return violation(
                "training_job",
                format!(
                    "slot {slot}: {} x{} from {} to {}",
                    job.troop_id, job.amount, job.start_at, job.end_at
                ),
            );
        }
    }
    if let Some((id, _)) = state.training.troops.iter().find(|(_, n)| **n == 0) {
        return violation("troop_count", format!("zero count kept for {id:?}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BuildingInstance, TOWNHALL_ID};

    fn setup() -> (SettlementState, BuildingCatalog, PlotRegistry, SettlementConfig) {
        let mut state = SettlementState::default();
        state
            .buildings
            .insert(BuildingInstance::new("townhall", TOWNHALL_ID, 3, Job::Idle), true)
            .unwrap();
        (
            state,
            BuildingCatalog::standard(),
            PlotRegistry::standard(),
            SettlementConfig::default(),
        )
    }

    fn rule_of(
        state: &SettlementState,
        catalog: &BuildingCatalog,
        plots: &PlotRegistry,
        config: &SettlementConfig,
    ) -> Option<&'static str> {
        try_validate_invariants(state, catalog, plots, config, 0)
            .err()
            .map(|v| v.rule)
    }

    #[test]
    fn valid_state_passes() {
        let (state, catalog, plots, config) = setup();
        assert_eq!(rule_of(&state, &catalog, &plots, &config), None);
        validate_invariants(&state, &catalog, &plots, &config, 0);
    }

    #[test]
    fn building_above_townhall_is_caught() {
        let (mut state, catalog, plots, config) = setup();
        state
            .buildings
            .insert(BuildingInstance::new("plot_a", "farm", 4, Job::Idle), false)
            .unwrap();
        assert_eq!(rule_of(&state, &catalog, &plots, &config), Some("townhall_cap"));
    }

    #[test]
    fn queue_overflow_is_caught() {
        let (mut state, catalog, plots, config) = setup();
        for plot in ["plot_a", "plot_b", "plot_c"] {
            state
                .buildings
                .insert(
                    BuildingInstance::new(plot, "farm", 1, Job::Constructing { end_at: 10 }),
                    false,
                )
                .unwrap();
        }
        assert_eq!(rule_of(&state, &catalog, &plots, &config), Some("queue_limit"));
        // all three are due at t=10, so none count
        assert!(try_validate_invariants(&state, &catalog, &plots, &config, 10).is_ok());
    }

    #[test]
    fn skipped_upgrade_target_is_caught() {
        let (mut state, catalog, plots, config) = setup();
        state
            .buildings
            .insert(
                BuildingInstance::new(
                    "plot_a",
                    "farm",
                    1,
                    Job::Upgrading {
                        to_level: 3,
                        end_at: 10,
                    },
                ),
                false,
            )
            .unwrap();
        assert_eq!(rule_of(&state, &catalog, &plots, &config), Some("upgrade_target"));
    }

    #[test]
    fn missing_townhall_is_caught() {
        let (_, catalog, plots, config) = setup();
        let state = SettlementState::default();
        assert_eq!(
            rule_of(&state, &catalog, &plots, &config),
            Some("townhall_present")
        );
    }

    #[test]
    #[should_panic(expected = "[INVARIANT:unique_building]")]
    fn hard_fail_variant_panics() {
        let (mut state, catalog, plots, config) = setup();
        state
            .buildings
            .insert(BuildingInstance::new("plot_a", TOWNHALL_ID, 1, Job::Idle), false)
            .unwrap();
        validate_invariants(&state, &catalog, &plots, &config, 0);
    }
}
