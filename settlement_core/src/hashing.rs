//! Canonical hashing.
//!
//! Deterministic serialization + SHA-256 of a settlement state, used for
//! determinism checks and as the save-file checksum.
//!
//! Rules:
//!   - `format_version` first, then `resources`, `buildings`, `training`
//!   - resources in fixed order (food, wood, stone, ore, gold)
//!   - buildings sorted by plot id, fields in fixed order
//!   - jobs flattened to the persisted record fields
//!   - training slots in slot order (`null` when idle), troops by id
//!   - compact UTF-8 JSON, no whitespace

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::domain::{Job, Resource};
use crate::state::SettlementState;
use crate::SAVE_FORMAT_VERSION;

/// Canonical UTF-8 JSON bytes of `state`.
pub fn canonical_serialize(state: &SettlementState) -> Vec<u8> {
    build_canonical_value(state).to_string().into_bytes()
}

/// SHA-256 of [`canonical_serialize`]. Lowercase hex string.
pub fn canonical_hash(state: &SettlementState) -> String {
    sha256_hex(&canonical_serialize(state))
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn number(v: f64) -> Value {
    serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number)
}

fn build_canonical_value(state: &SettlementState) -> Value {
    // -- resources (fixed order) ---
    let mut resources = Map::new();
    for r in Resource::ALL {
        resources.insert(r.as_str().to_string(), number(state.resources.balance(r)));
    }

    // -- buildings (store is keyed by plot id, already sorted) ---
    let mut buildings = Vec::new();
    for inst in state.buildings.iter() {
        let (construction_end_at, upgrade_end_at, upgrading_to_level) = match inst.job {
            Job::Idle => (0, 0, 0),
            Job::Constructing { end_at } => (end_at, 0, 0),
            Job::Upgrading { to_level, end_at } => (0, end_at, to_level),
        };
        let mut b = Map::new();
        b.insert("plot_id".to_string(), Value::String(inst.plot_id.clone()));
        b.insert(
            "building_id".to_string(),
            Value::String(inst.building_id.clone()),
        );
        b.insert("level".to_string(), Value::from(inst.level));
        b.insert(
            "construction_end_at".to_string(),
            Value::from(construction_end_at),
        );
        b.insert("upgrade_end_at".to_string(), Value::from(upgrade_end_at));
        b.insert(
            "upgrading_to_level".to_string(),
            Value::from(upgrading_to_level),
        );
        buildings.push(Value::Object(b));
    }

    let mut root = Map::new();
    root.insert(
        "format_version".to_string(),
        Value::from(SAVE_FORMAT_VERSION),
    );
    root.insert("resources".to_string(), Value::Object(resources));
    root.insert("buildings".to_string(), Value::Array(buildings));
    root.insert("training".to_string(), training_value(state));
    Value::Object(root)
}

fn training_value(state: &SettlementState) -> Value {
    let slots = state
        .training
        .slots
        .iter()
        .map(|entry| match entry {
            None => Value::Null,
            Some(job) => {
                let mut cost = Map::new();
                for (r, amount) in job.cost.iter() {
                    cost.insert(r.as_str().to_string(), number(amount));
                }
                let mut j = Map::new();
                j.insert("troop_id".to_string(), Value::String(job.troop_id.clone()));
                j.insert("amount".to_string(), Value::from(job.amount));
                j.insert("start_at".to_string(), Value::from(job.start_at));
                j.insert("end_at".to_string(), Value::from(job.end_at));
                j.insert("cost".to_string(), Value::Object(cost));
                Value::Object(j)
            }
        })
        .collect();

    let mut troops = Map::new();
    for (id, count) in &state.training.troops {
        troops.insert(id.clone(), Value::from(*count));
    }

    let mut training = Map::new();
    training.insert("slots".to_string(), Value::Array(slots));
    training.insert("troops".to_string(), Value::Object(troops));
    Value::Object(training)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BuildingInstance, ResourceVector, TOWNHALL_ID};
    use crate::ledger::ResourceLedger;

    fn sample() -> SettlementState {
        let mut state = SettlementState {
            resources: ResourceLedger::new(&ResourceVector::new().with(Resource::Wood, 40.0)),
            ..SettlementState::default()
        };
        state
            .buildings
            .insert(BuildingInstance::new("townhall", TOWNHALL_ID, 2, Job::Idle), true)
            .unwrap();
        state
            .buildings
            .insert(
                BuildingInstance::new("plot_a", "farm", 1, Job::Constructing { end_at: 500 }),
                false,
            )
            .unwrap();
        state
    }

    #[test]
    fn canonical_layout() {
        let text = String::from_utf8(canonical_serialize(&sample())).unwrap();
        assert!(text.starts_with(r#"{"format_version":2,"resources":{"food":0.0,"wood":40.0"#));
        let plot_a = text.find("plot_a").unwrap();
        let townhall = text.find(r#""plot_id":"townhall""#).unwrap();
        assert!(plot_a < townhall);
        assert!(text.contains(r#""construction_end_at":500,"upgrade_end_at":0"#));
        assert!(text.ends_with(r#""training":{"slots":[],"troops":{}}}"#));
        assert!(!text.contains(' '));
    }

    #[test]
    fn hash_is_stable_and_sensitive() {
        let a = sample();
        assert_eq!(canonical_hash(&a), canonical_hash(&a.clone()));
        assert_eq!(canonical_hash(&a).len(), 64);
        let mut b = a.clone();
        b.resources.credit(&ResourceVector::new().with(Resource::Gold, 1.0));
        assert_ne!(canonical_hash(&a), canonical_hash(&b));

        let mut c = a.clone();
        c.training.troops.insert("infantry_T1".to_string(), 5);
        assert_ne!(canonical_hash(&a), canonical_hash(&c));
    }
}
