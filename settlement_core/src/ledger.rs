//! Resource ledger: the five balances and the only code that changes them.
//!
//! Balances are raw `f64`; nothing is rounded here. Flooring for display is
//! done by [`ResourceLedger::display_balances`].

use serde::{Deserialize, Serialize};

use crate::domain::{Resource, ResourceVector};
use crate::error::Rejection;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceLedger {
    balances: ResourceVector,
}

impl Default for ResourceLedger {
    fn default() -> Self {
        Self::new(&ResourceVector::new())
    }
}

impl ResourceLedger {
    /// Every resource present at zero, then `starting` merged on top.
    pub fn new(starting: &ResourceVector) -> Self {
        let mut balances = ResourceVector::zeroed();
        for (resource, amount) in starting.iter() {
            if amount.is_finite() {
                balances.set(resource, amount.max(0.0));
            }
        }
        Self { balances }
    }

    pub fn balance(&self, resource: Resource) -> f64 {
        self.balances.amount(resource)
    }

    pub fn balances(&self) -> &ResourceVector {
        &self.balances
    }

    /// Balances floored to whole units.
    pub fn display_balances(&self) -> ResourceVector {
        self.balances
            .iter()
            .map(|(r, a)| (r, a.max(0.0).floor()))
            .collect()
    }

    /// True when every named component of `cost` is covered. Absent
    /// components carry no requirement.
    pub fn can_afford(&self, cost: &ResourceVector) -> bool {
        cost.iter().all(|(r, amount)| amount <= self.balance(r))
    }

    /// Subtract `cost`, or refuse without touching any balance.
    pub fn debit(&mut self, cost: &ResourceVector) -> Result<(), Rejection> {
        if !self.can_afford(cost) {
            return Err(Rejection::InsufficientResources);
        }
        for (resource, amount) in cost.iter() {
            self.balances.add(resource, -amount);
        }
        Ok(())
    }

    /// Add `amounts`. Non-positive and non-finite entries are skipped.
    pub fn credit(&mut self, amounts: &ResourceVector) {
        for (resource, amount) in amounts.iter() {
            if amount.is_finite() && amount > 0.0 {
                self.balances.add(resource, amount);
            }
        }
    }

    /// Integrate `rates` over `dt_secs`. A non-positive `dt_secs` is a no-op.
    pub fn accumulate(&mut self, dt_secs: f64, rates: &ResourceVector) {
        if !(dt_secs.is_finite() && dt_secs > 0.0) {
            return;
        }
        for (resource, rate) in rates.iter() {
            if rate.is_finite() && rate > 0.0 {
                self.balances.add(resource, rate * dt_secs);
            }
        }
        // A negative transient may not survive an accumulation step.
        for resource in Resource::ALL {
            if self.balance(resource) < 0.0 {
                self.balances.set(resource, 0.0);
            }
        }
    }

    /// Seconds of production at `rates` until `cost` is affordable.
    ///
    /// `Some(0.0)` when already affordable, `None` when some missing
    /// resource is not produced at all.
    pub fn time_to_afford(&self, cost: &ResourceVector, rates: &ResourceVector) -> Option<f64> {
        let mut worst: f64 = 0.0;
        for (resource, amount) in cost.iter() {
            let missing = amount - self.balance(resource);
            if missing <= 0.0 {
                continue;
            }
            let rate = rates.amount(resource);
            if rate <= 0.0 {
                return None;
            }
            worst = worst.max(missing / rate);
        }
        Some(worst)
    }
}
