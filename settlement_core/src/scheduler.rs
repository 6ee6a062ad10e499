//! Build queue.
//!
//! Holds no counter of its own: the number of in-flight jobs is always
//! derived from the instance store, so it cannot drift across save/load.

use serde::{Deserialize, Serialize};

use crate::store::BuildingInstanceStore;

/// Queue occupancy as shown to the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueInfo {
    pub active: usize,
    pub max: usize,
    pub full: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct BuildQueue<'a> {
    store: &'a BuildingInstanceStore,
    limit: usize,
}

impl<'a> BuildQueue<'a> {
    pub fn new(store: &'a BuildingInstanceStore, limit: usize) -> Self {
        Self { store, limit }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Jobs whose end time is still ahead of `now`.
    pub fn active_jobs(&self, now: u64) -> usize {
        self.store.iter().filter(|i| i.job.is_active_at(now)).count()
    }

    pub fn has_capacity(&self, now: u64) -> bool {
        self.active_jobs(now) < self.limit
    }

    pub fn info(&self, now: u64) -> QueueInfo {
        let active = self.active_jobs(now);
        QueueInfo {
            active,
            max: self.limit,
            full: active >= self.limit,
        }
    }
}
