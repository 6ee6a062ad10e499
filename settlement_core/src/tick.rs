//! Tick engine: resolves timed jobs against wall-clock time.

use crate::events::JobCompletion;
use crate::store::BuildingInstanceStore;

/// Promote every job whose end time is `<= now`.
///
/// Idempotent: a promoted instance is idle, so repeating the call with the
/// same `now` completes nothing. Completions come back in plot id order.
pub fn tick(store: &mut BuildingInstanceStore, now: u64) -> Vec<JobCompletion> {
    let due: Vec<String> = store
        .iter()
        .filter(|i| i.job.is_due_at(now))
        .map(|i| i.plot_id.clone())
        .collect();
    due.iter().filter_map(|p| store.complete_job(p)).collect()
}

/// Promote every active job regardless of its end time.
pub fn finish_all(store: &mut BuildingInstanceStore) -> Vec<JobCompletion> {
    let busy: Vec<String> = store
        .iter()
        .filter(|i| i.is_busy())
        .map(|i| i.plot_id.clone())
        .collect();
    busy.iter().filter_map(|p| store.complete_job(p)).collect()
}
