//! Session: one settlement bound to its save file, driven by the frame loop.
//!
//! Each frame the host calls `advance(now)`:
//!   1. `settlement.tick(now)`: resolve finished jobs
//!   2. `settlement.accumulate(dt)`: production since the last frame
//!   3. save if the autosave interval has elapsed
//!
//! Concurrency: `SharedSession` puts the whole settlement behind one
//! Mutex, so a gate check and its mutation are always atomic together.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use settlement_core::commands::Command;
use settlement_core::error::CommandError;
use settlement_core::events::{CommandOutcome, JobCompletion};
use settlement_core::hashing::canonical_hash;
use settlement_core::persistence::LoadReport;
use settlement_core::Settlement;

use crate::save_file::{read_save_file, write_save_file, SaveError, SaveFile};

pub struct Session {
    settlement: Settlement,
    save_path: PathBuf,
    autosave_interval_ms: u64,
    last_save_at: u64,
    last_advance_at: u64,
}

impl Session {
    /// Bind `settlement` to `save_path`, loading the save if one exists.
    ///
    /// Jobs that finished while the game was closed are resolved by the
    /// load. Production is not credited for the time away.
    pub fn open(
        mut settlement: Settlement,
        save_path: &Path,
        autosave_interval_ms: u64,
    ) -> Result<(Self, Option<LoadReport>), SaveError> {
        let report = if save_path.exists() {
            let file = read_save_file(save_path)?;
            let report = file.restore_into(&mut settlement)?;
            info!(path = %save_path.display(), saved_at = file.saved_at, "save loaded");
            Some(report)
        } else {
            info!(path = %save_path.display(), "no save found, starting fresh");
            None
        };
        let now = settlement.now();
        let session = Self {
            settlement,
            save_path: save_path.to_path_buf(),
            autosave_interval_ms,
            last_save_at: now,
            last_advance_at: now,
        };
        Ok((session, report))
    }

    /// One frame at `now`. Returns the jobs that completed.
    pub fn advance(&mut self, now: u64) -> Result<Vec<JobCompletion>, SaveError> {
        let completed = self.settlement.tick(now);
        let dt_ms = now.saturating_sub(self.last_advance_at);
        self.settlement.accumulate(dt_ms as f64 / 1_000.0);
        self.last_advance_at = self.last_advance_at.max(now);

        if self.autosave_interval_ms > 0
            && now.saturating_sub(self.last_save_at) >= self.autosave_interval_ms
        {
            debug!(now, "autosave");
            self.save()?;
        }
        Ok(completed)
    }

    /// Run a command against the settlement. Saving is left to autosave.
    pub fn apply(&mut self, command: &Command) -> Result<CommandOutcome, CommandError> {
        self.settlement.apply(command)
    }

    /// Write the save file now.
    pub fn save(&mut self) -> Result<(), SaveError> {
        let file = SaveFile::capture(&self.settlement)?;
        write_save_file(&self.save_path, &file)?;
        self.last_save_at = file.saved_at;
        info!(path = %self.save_path.display(), records = file.records.len(), "saved");
        Ok(())
    }

    pub fn settlement(&self) -> &Settlement {
        &self.settlement
    }

    pub fn settlement_mut(&mut self) -> &mut Settlement {
        &mut self.settlement
    }

    pub fn save_path(&self) -> &Path {
        &self.save_path
    }

    pub fn current_hash(&self) -> String {
        canonical_hash(self.settlement.state())
    }
}

// ---------------------------------------------------------------------------
// Thread-safe wrapper
// ---------------------------------------------------------------------------

pub struct SharedSession {
    inner: Mutex<Session>,
}

impl SharedSession {
    pub fn new(session: Session) -> Self {
        Self {
            inner: Mutex::new(session),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a command under lock.
    pub fn apply(&self, command: &Command) -> Result<CommandOutcome, CommandError> {
        self.lock().apply(command)
    }

    /// Advance under lock.
    pub fn advance(&self, now: u64) -> Result<Vec<JobCompletion>, SaveError> {
        self.lock().advance(now)
    }

    pub fn save(&self) -> Result<(), SaveError> {
        self.lock().save()
    }

    /// Run `f` with exclusive access to the session.
    pub fn with<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn current_hash(&self) -> String {
        self.lock().current_hash()
    }
}
