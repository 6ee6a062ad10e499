#![forbid(unsafe_code)]

//! Settlement runtime.
//!
//! Wraps the settlement kernel with save files, the per-frame session
//! loop, runtime configuration and drift detection.
//!
//! No game rules live here. Gates, transitions and invariants are all
//! delegated to `settlement_core`.

pub mod config;
pub mod save_file;
pub mod session;
pub mod drift;
