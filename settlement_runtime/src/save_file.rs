//! Save file codec: the on-disk envelope around the persisted records.
//!
//! ```json
//! { "format_version": 2, "saved_at": 1700000000000,
//!   "resources": { "food": 12.5, ... },
//!   "records": [ { "plotId": ..., ... } ],
//!   "training": { "slots": [null, { "troop_id": ..., ... }], "troops": { ... } },
//!   "checksum": "<sha256 hex of the body>" }
//! ```
//!
//! - `SaveFile::capture`:  settlement → envelope
//! - `SaveFile::encode` / `SaveFile::decode`: envelope ↔ JSON (decode verifies)
//! - `SaveFile::restore_into`: hydrate a settlement, reporting dropped records
//! - `write_save_file` / `read_save_file`: file I/O (atomic write)
//!
//! Records are kept as raw JSON so one malformed entry only drops itself,
//! while a broken checksum or unknown version rejects the whole file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use settlement_core::domain::ResourceVector;
use settlement_core::error::InvariantViolation;
use settlement_core::hashing::sha256_hex;
use settlement_core::persistence::LoadReport;
use settlement_core::{Settlement, TrainingState, SAVE_FORMAT_VERSION};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum SaveError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("deserialization error: {0}")]
    Deserialization(String),
    #[error("checksum mismatch: file says {expected}, body hashes to {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("unsupported save format version {0}")]
    UnsupportedVersion(u32),
    #[error("loaded settlement is inconsistent: {0}")]
    Invariant(#[from] InvariantViolation),
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SaveFile {
    pub format_version: u32,
    /// Epoch ms at capture.
    pub saved_at: u64,
    pub resources: ResourceVector,
    pub records: Vec<Value>,
    #[serde(default)]
    pub training: TrainingState,
    pub checksum: String,
}

impl SaveFile {
    /// Snapshot `settlement` at its clock's current time.
    pub fn capture(settlement: &Settlement) -> Result<Self, SaveError> {
        let records = settlement
            .export_records()
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| SaveError::Serialization(e.to_string()))?;
        let mut file = Self {
            format_version: SAVE_FORMAT_VERSION,
            saved_at: settlement.now(),
            resources: settlement.resources().balances().clone(),
            records,
            training: settlement.training().clone(),
            checksum: String::new(),
        };
        file.checksum = file.body_checksum()?;
        Ok(file)
    }

    /// SHA-256 over the compact JSON of every field except `checksum`,
    /// in declaration order.
    pub fn body_checksum(&self) -> Result<String, SaveError> {
        let resources = serde_json::to_value(&self.resources)
            .map_err(|e| SaveError::Serialization(e.to_string()))?;
        let training = serde_json::to_value(&self.training)
            .map_err(|e| SaveError::Serialization(e.to_string()))?;
        let mut body = Map::new();
        body.insert("format_version".to_string(), Value::from(self.format_version));
        body.insert("saved_at".to_string(), Value::from(self.saved_at));
        body.insert("resources".to_string(), resources);
        body.insert("records".to_string(), Value::Array(self.records.clone()));
        body.insert("training".to_string(), training);
        Ok(sha256_hex(Value::Object(body).to_string().as_bytes()))
    }

    /// Check version and checksum.
    pub fn verify(&self) -> Result<(), SaveError> {
        if self.format_version != SAVE_FORMAT_VERSION {
            return Err(SaveError::UnsupportedVersion(self.format_version));
        }
        let actual = self.body_checksum()?;
        if actual != self.checksum {
            return Err(SaveError::ChecksumMismatch {
                expected: self.checksum.clone(),
                actual,
            });
        }
        Ok(())
    }

    pub fn encode(&self) -> Result<String, SaveError> {
        serde_json::to_string(self).map_err(|e| SaveError::Serialization(e.to_string()))
    }

    /// Parse and verify.
    pub fn decode(json: &str) -> Result<Self, SaveError> {
        let file: Self =
            serde_json::from_str(json).map_err(|e| SaveError::Deserialization(e.to_string()))?;
        file.verify()?;
        Ok(file)
    }

    /// Replace the contents of `settlement` with this save: buildings and
    /// balances first, so the barracks level is known, then training.
    pub fn restore_into(&self, settlement: &mut Settlement) -> Result<LoadReport, SaveError> {
        let mut report = settlement.hydrate_values(&self.records, Some(&self.resources))?;
        report.absorb(settlement.restore_training(&self.training));
        settlement.check_invariants()?;
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// File I/O
// ---------------------------------------------------------------------------

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `file` to `path` via a temp file and rename, so a crash never
/// leaves a half-written save. Creates parent directories if needed.
pub fn write_save_file(path: &Path, file: &SaveFile) -> Result<(), SaveError> {
    let json = file.encode()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = temp_path(path);
    fs::write(&tmp, json.as_bytes())?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Read and verify the save at `path`.
pub fn read_save_file(path: &Path) -> Result<SaveFile, SaveError> {
    let content = fs::read_to_string(path)?;
    SaveFile::decode(&content)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use settlement_core::{ManualClock, Resource};

    fn make_settlement(clock: &ManualClock) -> Settlement {
        let mut s = Settlement::with_defaults(Arc::new(clock.clone()));
        s.credit(
            &ResourceVector::new()
                .with(Resource::Wood, 200.0)
                .with(Resource::Gold, 80.5),
        );
        s.place_building_on_plot("plot_a", "farm").unwrap();
        s
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join("settlement_save_file_tests")
            .join(name);
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    // ── Encode → decode keeps every field ──────────────────────────

    #[test]
    fn roundtrip_produces_identical_json() {
        let clock = ManualClock::new(5_000);
        let file = SaveFile::capture(&make_settlement(&clock)).unwrap();
        let json1 = file.encode().unwrap();
        let decoded = SaveFile::decode(&json1).unwrap();
        assert_eq!(decoded, file);
        assert_eq!(decoded.encode().unwrap(), json1);
        assert_eq!(decoded.saved_at, 5_000);
        assert_eq!(decoded.records.len(), 2);
    }

    #[test]
    fn fractional_balances_survive_decode() {
        let clock = ManualClock::new(0);
        let mut s = Settlement::with_defaults(Arc::new(clock.clone()));
        s.place_building_on_plot("plot_a", "farm").ok();
        for i in 0..2_000u32 {
            let odd = f64::from(i) * 0.123_456_789_1 + 1.0 / 7.0;
            s.credit(&ResourceVector::new().with(Resource::Food, odd));
            for _ in 0..5 {
                s.accumulate(0.016 + f64::from(i % 7) * 1e-4);
            }
            let file = SaveFile::capture(&s).unwrap();
            let decoded = SaveFile::decode(&file.encode().unwrap())
                .unwrap_or_else(|e| panic!("iteration {i}: {e}"));
            assert_eq!(decoded.resources, file.resources);
        }
    }

    // ── Tampering is detected ──────────────────────────────────────

    #[test]
    fn edited_body_fails_checksum() {
        let clock = ManualClock::new(0);
        let mut file = SaveFile::capture(&make_settlement(&clock)).unwrap();
        file.resources.set(Resource::Gold, 1_000_000.0);
        let json = file.encode().unwrap();
        assert!(matches!(
            SaveFile::decode(&json),
            Err(SaveError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn future_version_is_rejected() {
        let clock = ManualClock::new(0);
        let mut file = SaveFile::capture(&make_settlement(&clock)).unwrap();
        file.format_version = 3;
        file.checksum = file.body_checksum().unwrap();
        assert!(matches!(file.verify(), Err(SaveError::UnsupportedVersion(3))));
    }

    #[test]
    fn garbage_is_a_deserialization_error() {
        assert!(matches!(
            SaveFile::decode("{ not valid json !!!}"),
            Err(SaveError::Deserialization(_))
        ));
        assert!(matches!(
            SaveFile::decode(r#"{"format_version":1}"#),
            Err(SaveError::Deserialization(_))
        ));
    }

    // ── File I/O ───────────────────────────────────────────────────

    #[test]
    fn file_roundtrip_restores_settlement() {
        let clock = ManualClock::new(10_000);
        let original = make_settlement(&clock);
        let path = temp_dir("file_roundtrip").join("nested").join("save.json");

        write_save_file(&path, &SaveFile::capture(&original).unwrap()).unwrap();
        assert!(!temp_path(&path).exists());

        let mut restored = Settlement::with_defaults(Arc::new(clock.clone()));
        let report = read_save_file(&path)
            .unwrap()
            .restore_into(&mut restored)
            .unwrap();
        assert_eq!(report.loaded, 2);
        assert_eq!(report.dropped, 0);
        assert_eq!(restored.state(), original.state());
    }

    #[test]
    fn malformed_record_is_dropped_not_fatal() {
        let clock = ManualClock::new(0);
        let mut file = SaveFile::capture(&make_settlement(&clock)).unwrap();
        file.records.push(serde_json::json!({"plotId": 7}));
        file.checksum = file.body_checksum().unwrap();

        let mut restored = Settlement::with_defaults(Arc::new(clock.clone()));
        let report = file.restore_into(&mut restored).unwrap();
        assert_eq!(report.dropped, 1);
        assert_eq!(report.loaded, 2);
    }

    // ── Training ───────────────────────────────────────────────────

    fn with_barracks(clock: &ManualClock) -> Settlement {
        let mut s = Settlement::with_defaults(Arc::new(clock.clone()));
        let records = vec![
            serde_json::json!({"plotId": "townhall", "buildingId": "townhall", "level": 5}),
            serde_json::json!({"plotId": "plot_a", "buildingId": "farm", "level": 5}),
            serde_json::json!({"plotId": "plot_b", "buildingId": "barracks", "level": 5}),
        ];
        let plenty: ResourceVector = Resource::ALL.iter().map(|r| (*r, 5_000.0)).collect();
        s.hydrate_values(&records, Some(&plenty)).unwrap();
        s
    }

    #[test]
    fn training_survives_save_and_restore() {
        let clock = ManualClock::new(0);
        let mut original = with_barracks(&clock);
        original.start_training(0, "infantry_T1", 1).unwrap();
        original.start_training(1, "archer_T2", 2).unwrap();
        clock.advance(8_000);
        original.tick_now();
        assert_eq!(original.troop_count("infantry_T1"), 1);

        let json = SaveFile::capture(&original).unwrap().encode().unwrap();
        let file = SaveFile::decode(&json).unwrap();
        assert_eq!(file.training.active_jobs(), 1);

        let mut restored = Settlement::with_defaults(Arc::new(clock.clone()));
        let report = file.restore_into(&mut restored).unwrap();
        assert_eq!(report.dropped, 0);
        assert_eq!(restored.state(), original.state());

        // archer_T2 takes 22 s per unit
        clock.set(44_000);
        restored.tick_now();
        assert_eq!(restored.troop_count("archer_T2"), 2);
        assert_eq!(restored.training().active_jobs(), 0);
    }

    #[test]
    fn training_that_finished_offline_completes_on_restore() {
        let clock = ManualClock::new(0);
        let mut original = with_barracks(&clock);
        original.start_training(0, "cavalry_T1", 4).unwrap();
        let file = SaveFile::capture(&original).unwrap();

        clock.set(3_600_000);
        let mut restored = Settlement::with_defaults(Arc::new(clock.clone()));
        let report = file.restore_into(&mut restored).unwrap();
        assert_eq!(report.completed_on_load, 1);
        assert_eq!(restored.troop_count("cavalry_T1"), 4);
    }

    #[test]
    fn save_without_training_restores_empty_barracks() {
        let clock = ManualClock::new(0);
        let mut file = SaveFile::capture(&make_settlement(&clock)).unwrap();
        let mut value = serde_json::to_value(&file).unwrap();
        value.as_object_mut().unwrap().remove("training");
        file = serde_json::from_value(value).unwrap();
        assert_eq!(file.training, TrainingState::default());
    }

    #[test]
    fn missing_file_is_io_error() {
        let path = temp_dir("missing").join("nope.json");
        assert!(matches!(read_save_file(&path), Err(SaveError::Io(_))));
    }
}
