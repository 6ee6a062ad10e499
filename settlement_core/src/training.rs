//! Barracks troop training.
//!
//! The barracks owns a row of training slots, each idle or running one
//! job. Slot count and trainable tiers follow the barracks level:
//!
//! | level | slots | tiers        |
//! |-------|-------|--------------|
//! | 1     | 1     | T1           |
//! | 5     | 2     | T1, T2       |
//! | 10    | 3     | T1..T3       |
//! | 15    | 4     | T1..T4       |
//!
//! Jobs carry absolute end times and are resolved by `Settlement::tick`,
//! which credits the trained troops. Training does not use the build queue.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::arithmetic::{end_at, is_unit_fraction, remaining_ms};
use crate::domain::ResourceVector;
use crate::engine::Settlement;
use crate::error::{CommandError, Rejection};
use crate::events::{CommandOutcome, TrainingCompletion};
use crate::persistence::LoadReport;
use crate::troops::TroopCatalog;

pub const BARRACKS_ID: &str = "barracks";

/// Training slots at `barracks_level`.
pub fn training_slots(barracks_level: u8) -> usize {
    if barracks_level >= 15 {
        4
    } else if barracks_level >= 10 {
        3
    } else if barracks_level >= 5 {
        2
    } else {
        1
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainingJob {
    pub troop_id: String,
    pub amount: u32,
    pub start_at: u64,
    pub end_at: u64,
    /// What was debited, kept for refunds.
    pub cost: ResourceVector,
}

impl TrainingJob {
    pub fn total_ms(&self) -> u64 {
        self.end_at.saturating_sub(self.start_at).max(1)
    }
}

/// Slots (`None` = idle) and trained troop counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainingState {
    pub slots: Vec<Option<TrainingJob>>,
    pub troops: BTreeMap<String, u64>,
}

impl TrainingState {
    pub fn troop_count(&self, troop_id: &str) -> u64 {
        self.troops.get(troop_id).copied().unwrap_or(0)
    }

    pub fn active_jobs(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Grow to `target` slots. Shrinking only removes trailing idle slots.
    pub(crate) fn sync_slots(&mut self, target: usize) {
        if self.slots.len() < target {
            self.slots.resize(target, None);
        }
        while self.slots.len() > target && matches!(self.slots.last(), Some(None)) {
            self.slots.pop();
        }
    }

    fn credit_troops(&mut self, troop_id: &str, amount: u32) {
        *self.troops.entry(troop_id.to_string()).or_insert(0) += u64::from(amount);
    }

    /// Complete every job with `end_at <= now`.
    pub(crate) fn resolve(&mut self, now: u64) -> Vec<TrainingCompletion> {
        self.complete_where(|job| job.end_at <= now)
    }

    pub(crate) fn finish_all(&mut self) -> Vec<TrainingCompletion> {
        self.complete_where(|_| true)
    }

    fn complete_where(&mut self, due: impl Fn(&TrainingJob) -> bool) -> Vec<TrainingCompletion> {
        let mut done = Vec::new();
        for (slot, entry) in self.slots.iter_mut().enumerate() {
            if entry.as_ref().is_some_and(&due) {
                if let Some(job) = entry.take() {
                    done.push(TrainingCompletion {
                        slot,
                        troop_id: job.troop_id,
                        amount: job.amount,
                    });
                }
            }
        }
        for c in &done {
            self.credit_troops(&c.troop_id, c.amount);
        }
        done
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SlotView {
    Idle,
    Training {
        troop_id: String,
        amount: u32,
        start_at: u64,
        end_at: u64,
        remaining_ms: u64,
        total_ms: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrainingSnapshot {
    pub building_id: String,
    pub now: u64,
    pub barracks_level: u8,
    pub slots: Vec<SlotView>,
    pub troops: BTreeMap<String, u64>,
}

// ---------------------------------------------------------------------------
// Settlement API
// ---------------------------------------------------------------------------

impl Settlement {
    pub fn troop_catalog(&self) -> &TroopCatalog {
        &self.troops
    }

    pub fn training(&self) -> &TrainingState {
        &self.state.training
    }

    pub fn troop_count(&self, troop_id: &str) -> u64 {
        self.state.training.troop_count(troop_id)
    }

    /// Level of the barracks, or 0 when there is none or it is still
    /// under construction.
    pub fn barracks_level(&self) -> u8 {
        self.state
            .buildings
            .by_building(BARRACKS_ID)
            .filter(|b| !b.is_constructing())
            .map_or(0, |b| b.level)
    }

    /// Train `amount` units of `troop_id` in `slot`. Cost is the unit cost
    /// times `amount`; duration is the unit time times `amount`.
    pub fn start_training(
        &mut self,
        slot: usize,
        troop_id: &str,
        amount: u32,
    ) -> Result<CommandOutcome, CommandError> {
        if amount == 0 {
            return Err(CommandError::InvalidArgument(
                "training amount must be at least 1".to_string(),
            ));
        }
        let now = self.now();
        self.tick(now);
        let barracks_level = self.barracks_level();
        self.state.training.sync_slots(training_slots(barracks_level));

        let available = self.state.training.slots.len();
        match self.state.training.slots.get(slot) {
            None => return Err(refused(slot, Rejection::SlotUnavailable { slot, available })),
            Some(Some(_)) => return Err(refused(slot, Rejection::SlotBusy(slot))),
            Some(None) => {}
        }
        let Some(def) = self.troops.get(troop_id) else {
            return Err(refused(slot, Rejection::UnknownTroop(troop_id.to_string())));
        };
        let required = def.tier.unlock_level();
        if barracks_level < required {
            return Err(refused(
                slot,
                Rejection::TierLocked {
                    troop_id: troop_id.to_string(),
                    required,
                    barracks_level,
                },
            ));
        }
        let cost = def.cost_for(amount);
        let duration = def.duration_ms(amount);
        if !self.state.resources.can_afford(&cost) {
            return Err(refused(slot, Rejection::InsufficientResources));
        }

        self.state.resources.debit(&cost)?;
        let finish = if self.config.timers_enabled {
            let job = TrainingJob {
                troop_id: troop_id.to_string(),
                amount,
                start_at: now,
                end_at: end_at(now, duration),
                cost: cost.clone(),
            };
            let finish = job.end_at;
            self.state.training.slots[slot] = Some(job);
            Some(finish)
        } else {
            self.state.training.credit_troops(troop_id, amount);
            None
        };

        self.assert_invariants(now);
        info!(slot, troop = troop_id, amount, end_at = ?finish, "training started");
        Ok(CommandOutcome::TrainingStarted {
            slot,
            troop_id: troop_id.to_string(),
            amount,
            cost,
            end_at: finish,
        })
    }

    /// Abort the job in `slot`, refunding `refund_fraction` of what it cost
    /// (floored per resource). No troops are credited.
    pub fn cancel_training(
        &mut self,
        slot: usize,
        refund_fraction: f64,
    ) -> Result<CommandOutcome, CommandError> {
        if !is_unit_fraction(refund_fraction) {
            return Err(CommandError::InvalidArgument(format!(
                "refund fraction {refund_fraction} outside [0, 1]"
            )));
        }
        let now = self.now();
        self.tick(now);
        let Some(job) = self.state.training.slots.get_mut(slot).and_then(Option::take) else {
            return Err(refused(slot, Rejection::NoActiveTraining(slot)));
        };
        let refund = job.cost.scaled_floor(refund_fraction);
        self.state.resources.credit(&refund);
        self.state
            .training
            .sync_slots(training_slots(self.barracks_level()));

        self.assert_invariants(now);
        info!(slot, troop = %job.troop_id, amount = job.amount, refund = ?refund, "training cancelled");
        Ok(CommandOutcome::TrainingCancelled {
            slot,
            troop_id: job.troop_id,
            amount: job.amount,
            refund,
        })
    }

    /// Slots as shown to the player, padded to the barracks' slot count.
    pub fn training_snapshot(&self) -> TrainingSnapshot {
        let now = self.now();
        let barracks_level = self.barracks_level();
        let mut slots: Vec<SlotView> = self
            .state
            .training
            .slots
            .iter()
            .map(|entry| match entry {
                None => SlotView::Idle,
                Some(job) => SlotView::Training {
                    troop_id: job.troop_id.clone(),
                    amount: job.amount,
                    start_at: job.start_at,
                    end_at: job.end_at,
                    remaining_ms: remaining_ms(job.end_at, now),
                    total_ms: job.total_ms(),
                },
            })
            .collect();
        let target = training_slots(barracks_level);
        if slots.len() < target {
            slots.resize(target, SlotView::Idle);
        }
        TrainingSnapshot {
            building_id: BARRACKS_ID.to_string(),
            now,
            barracks_level,
            slots,
            troops: self.state.training.troops.clone(),
        }
    }

    /// Replace the training state with a saved one. Jobs and counts that
    /// name unknown troops or hold nothing are dropped; jobs that finished
    /// while the game was closed are completed.
    pub fn restore_training(&mut self, saved: &TrainingState) -> LoadReport {
        let mut report = LoadReport::default();
        let mut restored = TrainingState::default();

        for (slot, entry) in saved.slots.iter().enumerate() {
            let kept = entry.as_ref().filter(|job| {
                let valid = self.troops.contains(&job.troop_id)
                    && job.amount > 0
                    && job.end_at >= job.start_at;
                if !valid {
                    warn!(slot, troop = %job.troop_id, "dropping training job");
                    report.dropped += 1;
                }
                valid
            });
            restored.slots.push(kept.cloned());
        }
        for (troop_id, count) in &saved.troops {
            if self.troops.contains(troop_id) && *count > 0 {
                restored.troops.insert(troop_id.clone(), *count);
            } else {
                warn!(troop = %troop_id, count, "dropping troop count");
                report.dropped += 1;
            }
        }

        report.loaded = restored.active_jobs();
        self.state.training = restored;
        let now = self.now();
        report.completed_on_load = self.resolve_training(now).len();
        report
    }

    /// Sync slots to the barracks level and complete due jobs.
    pub(crate) fn resolve_training(&mut self, now: u64) -> Vec<TrainingCompletion> {
        let target = training_slots(self.barracks_level());
        let completed = self.state.training.resolve(now);
        self.state.training.sync_slots(target);
        log_training(&completed);
        completed
    }

    pub(crate) fn finish_all_training(&mut self) -> Vec<TrainingCompletion> {
        let completed = self.state.training.finish_all();
        log_training(&completed);
        completed
    }
}

fn log_training(completed: &[TrainingCompletion]) {
    for c in completed {
        info!(slot = c.slot, troop = %c.troop_id, amount = c.amount, "training complete");
    }
}

fn refused(slot: usize, rejection: Rejection) -> CommandError {
    debug!(slot, reason = %rejection, "training rejected");
    CommandError::Rejected(rejection)
}
