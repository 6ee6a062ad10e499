//! Player commands.
//!
//! ALL command-driven mutation lives here. Each handler follows the same
//! sequence:
//!   1. resolve due jobs (`tick(now)`) so gates see current state
//!   2. validate the boundary arguments (plot id, fractions)
//!   3. run the gate, which yields the plan to execute
//!   4. debit, then mutate; nothing is changed if any step fails
//!   5. re-check invariants
//!
//! Business-rule refusals come back as `CommandError::Rejected`.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::arithmetic::{is_open_unit_fraction, is_unit_fraction, remaining_ms};
use crate::domain::{BuildingInstance, Job, ResourceVector};
use crate::engine::Settlement;
use crate::error::{CommandError, Rejection};
use crate::events::CommandOutcome;

/// A command as data, for scripted input and replays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Place { plot_id: String, building_id: String },
    Upgrade { plot_id: String },
    Cancel { plot_id: String, refund_fraction: f64 },
    Speedup { plot_id: String, fraction: f64 },
    Train { slot: usize, troop_id: String, amount: u32 },
    CancelTraining { slot: usize, refund_fraction: f64 },
}

// ---------------------------------------------------------------------------
// Public dispatcher
// ---------------------------------------------------------------------------

impl Settlement {
    pub fn apply(&mut self, command: &Command) -> Result<CommandOutcome, CommandError> {
        match command {
            Command::Place {
                plot_id,
                building_id,
            } => self.place_building_on_plot(plot_id, building_id),
            Command::Upgrade { plot_id } => self.upgrade_plot(plot_id),
            Command::Cancel {
                plot_id,
                refund_fraction,
            } => self.cancel(plot_id, *refund_fraction),
            Command::Speedup { plot_id, fraction } => self.apply_speedup(plot_id, *fraction),
            Command::Train {
                slot,
                troop_id,
                amount,
            } => self.start_training(*slot, troop_id, *amount),
            Command::CancelTraining {
                slot,
                refund_fraction,
            } => self.cancel_training(*slot, *refund_fraction),
        }
    }

    // -----------------------------------------------------------------------
    // Handlers
    // -----------------------------------------------------------------------

    /// Place `building_id` on the empty plot `plot_id`.
    pub fn place_building_on_plot(
        &mut self,
        plot_id: &str,
        building_id: &str,
    ) -> Result<CommandOutcome, CommandError> {
        let now = self.begin_command(plot_id)?;
        let plan = self
            .gates_at(now)
            .can_place_on(plot_id, building_id)
            .map_err(|r| rejected("place", plot_id, r))?;

        self.state.resources.debit(&plan.cost)?;
        let job = match plan.end_at {
            Some(end_at) => Job::Constructing { end_at },
            None => Job::Idle,
        };
        let instance = BuildingInstance::new(plot_id, building_id, 1, job);
        if let Err(r) = self.state.buildings.insert(instance, plan.unique) {
            self.state.resources.credit(&plan.cost);
            return Err(rejected("place", plot_id, r));
        }

        self.assert_invariants(now);
        info!(plot = plot_id, building = building_id, end_at = ?plan.end_at, "placed");
        Ok(CommandOutcome::Placed {
            plot_id: plot_id.to_string(),
            building_id: building_id.to_string(),
            cost: plan.cost,
            end_at: plan.end_at,
        })
    }

    /// Start the next upgrade of the instance on `plot_id`. In instant mode
    /// the new level applies at once.
    pub fn upgrade_plot(&mut self, plot_id: &str) -> Result<CommandOutcome, CommandError> {
        let now = self.begin_command(plot_id)?;
        let plan = self
            .gates_at(now)
            .can_upgrade(plot_id)
            .map_err(|r| rejected("upgrade", plot_id, r))?;

        self.state.resources.debit(&plan.cost)?;
        let Some(inst) = self.state.buildings.get_mut(plot_id) else {
            self.state.resources.credit(&plan.cost);
            return Err(Rejection::NoBuildingHere(plot_id.to_string()).into());
        };
        let outcome = match plan.end_at {
            Some(end_at) => {
                inst.job = Job::Upgrading {
                    to_level: plan.to_level,
                    end_at,
                };
                CommandOutcome::UpgradeStarted {
                    plot_id: plot_id.to_string(),
                    to_level: plan.to_level,
                    cost: plan.cost,
                    end_at,
                }
            }
            None => {
                inst.level = plan.to_level;
                CommandOutcome::UpgradedInstantly {
                    plot_id: plot_id.to_string(),
                    level: plan.to_level,
                    cost: plan.cost,
                }
            }
        };

        self.assert_invariants(now);
        info!(
            plot = plot_id,
            building = %plan.building_id,
            from = plan.from_level,
            to = plan.to_level,
            "upgrade started"
        );
        Ok(outcome)
    }

    /// Abort the active job on `plot_id`, refunding `refund_fraction` of what
    /// the job cost (floored per resource). The level does not change.
    pub fn cancel(
        &mut self,
        plot_id: &str,
        refund_fraction: f64,
    ) -> Result<CommandOutcome, CommandError> {
        if !is_unit_fraction(refund_fraction) {
            return Err(CommandError::InvalidArgument(format!(
                "refund fraction {refund_fraction} outside [0, 1]"
            )));
        }
        let now = self.begin_command(plot_id)?;
        let inst = self.active_job_instance(plot_id, "cancel")?;
        let paid = self.job_cost(inst);
        let refund = paid.scaled_floor(refund_fraction);

        let Some(inst) = self.state.buildings.get_mut(plot_id) else {
            return Err(Rejection::NoBuildingHere(plot_id.to_string()).into());
        };
        inst.job = Job::Idle;
        let level = inst.level;
        self.state.resources.credit(&refund);

        self.assert_invariants(now);
        info!(plot = plot_id, level, refund = ?refund, "job cancelled");
        Ok(CommandOutcome::Cancelled {
            plot_id: plot_id.to_string(),
            level,
            refund,
        })
    }

    /// Cut the remaining time of the active job on `plot_id` by `fraction`.
    /// The new remaining time is rounded up to the millisecond.
    pub fn apply_speedup(
        &mut self,
        plot_id: &str,
        fraction: f64,
    ) -> Result<CommandOutcome, CommandError> {
        if !is_open_unit_fraction(fraction) {
            return Err(CommandError::InvalidArgument(format!(
                "speedup fraction {fraction} outside (0, 1)"
            )));
        }
        let now = self.begin_command(plot_id)?;
        let end_at = self
            .active_job_instance(plot_id, "speedup")?
            .job
            .end_at()
            .unwrap_or(now);
        let remaining = remaining_ms(end_at, now) as f64;
        let new_end = now.saturating_add((remaining * (1.0 - fraction)).ceil() as u64);

        let Some(inst) = self.state.buildings.get_mut(plot_id) else {
            return Err(Rejection::NoBuildingHere(plot_id.to_string()).into());
        };
        inst.job = match inst.job {
            Job::Constructing { .. } => Job::Constructing { end_at: new_end },
            Job::Upgrading { to_level, .. } => Job::Upgrading {
                to_level,
                end_at: new_end,
            },
            Job::Idle => Job::Idle,
        };

        self.assert_invariants(now);
        debug!(plot = plot_id, fraction, old_end = end_at, new_end, "sped up");
        Ok(CommandOutcome::SpedUp {
            plot_id: plot_id.to_string(),
            end_at: new_end,
        })
    }

    // -----------------------------------------------------------------------
    // Helpers (private)
    // -----------------------------------------------------------------------

    /// Tick to the clock's time and resolve `plot_id` against the registry.
    fn begin_command(&mut self, plot_id: &str) -> Result<u64, CommandError> {
        let now = self.now();
        self.tick(now);
        if !self.plots.contains(plot_id) {
            debug!(plot = plot_id, "unknown plot");
            return Err(CommandError::UnknownPlot(plot_id.to_string()));
        }
        Ok(now)
    }

    fn active_job_instance(&self, plot_id: &str, op: &str) -> Result<&BuildingInstance, CommandError> {
        let inst = self
            .state
            .buildings
            .get(plot_id)
            .ok_or_else(|| rejected(op, plot_id, Rejection::NoBuildingHere(plot_id.to_string())))?;
        if inst.job.is_idle() {
            return Err(rejected(op, plot_id, Rejection::NoActiveJob(plot_id.to_string())));
        }
        Ok(inst)
    }

    /// What the instance's current job was charged. Costs are deterministic,
    /// so recomputing gives the debited amount.
    fn job_cost(&self, inst: &BuildingInstance) -> ResourceVector {
        let Some(def) = self.catalog.get(&inst.building_id) else {
            return ResourceVector::new();
        };
        match inst.job {
            Job::Idle => ResourceVector::new(),
            Job::Constructing { .. } => def.placement_cost.clone(),
            Job::Upgrading { to_level, .. } => self.catalog.upgrade_cost(
                def,
                to_level.saturating_sub(1),
                &self.config.cost_curve(),
            ),
        }
    }
}

fn rejected(op: &str, plot_id: &str, rejection: Rejection) -> CommandError {
    debug!(op, plot = plot_id, reason = %rejection, "rejected");
    CommandError::Rejected(rejection)
}
