//! Integration tests for settlement_runtime.
//!
//! All tests use temporary directories for isolation.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use settlement_core::commands::Command;
use settlement_core::{
    CommandError, ManualClock, Rejection, Resource, ResourceVector, Settlement,
};
use settlement_runtime::drift::compare_states;
use settlement_runtime::save_file::SaveError;
use settlement_runtime::session::{Session, SharedSession};

/// Create a temp directory for a test.
fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir()
        .join("settlement_runtime_tests")
        .join(name);
    if dir.exists() {
        fs::remove_dir_all(&dir).ok();
    }
    fs::create_dir_all(&dir).expect("Failed to create temp dir");
    dir
}

fn stocked(clock: &ManualClock) -> Settlement {
    let mut s = Settlement::with_defaults(Arc::new(clock.clone()));
    s.credit(&Resource::ALL.iter().map(|r| (*r, 5_000.0)).collect::<ResourceVector>());
    s
}

fn place(plot: &str, building: &str) -> Command {
    Command::Place {
        plot_id: plot.to_string(),
        building_id: building.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────
// Test 1: fresh_session_saves_and_reloads
// ─────────────────────────────────────────────────────────────

#[test]
fn fresh_session_saves_and_reloads() {
    let dir = temp_dir("save_and_reload");
    let path = dir.join("save.json");
    let clock = ManualClock::new(1_000);

    let hash_before = {
        let (mut session, report) = Session::open(stocked(&clock), &path, 0).expect("open");
        assert!(report.is_none(), "no save yet");
        session.apply(&place("plot_a", "farm")).expect("place farm");
        session.save().expect("save");
        session.current_hash()
    };
    assert!(path.exists());

    let (session, report) =
        Session::open(Settlement::with_defaults(Arc::new(clock.clone())), &path, 0).expect("reopen");
    let report = report.expect("save was loaded");
    assert_eq!(report.loaded, 2);
    assert_eq!(report.dropped, 0);
    assert_eq!(report.completed_on_load, 0);
    assert_eq!(session.current_hash(), hash_before);
}

// ─────────────────────────────────────────────────────────────
// Test 2: job_finished_while_closed_completes_on_load
// ─────────────────────────────────────────────────────────────

#[test]
fn job_finished_while_closed_completes_on_load() {
    let dir = temp_dir("offline_completion");
    let path = dir.join("save.json");
    let clock = ManualClock::new(1_000);

    let saved_resources = {
        let (mut session, _) = Session::open(stocked(&clock), &path, 0).expect("open");
        session.apply(&place("plot_a", "farm")).expect("place farm");
        session.save().expect("save");
        session.settlement().resources().balances().clone()
    };

    // Farm construction takes 15 s; come back an hour later.
    clock.advance(3_600_000);

    let (session, report) =
        Session::open(Settlement::with_defaults(Arc::new(clock.clone())), &path, 0).expect("reopen");
    assert_eq!(report.expect("loaded").completed_on_load, 1);

    let farm = session.settlement().get_instance("plot_a").expect("farm");
    assert!(!farm.is_busy());
    assert_eq!(farm.level, 1);
    // Time away does not produce anything.
    assert_eq!(session.settlement().resources().balances(), &saved_resources);
}

// ─────────────────────────────────────────────────────────────
// Test 3: autosave_waits_for_interval
// ─────────────────────────────────────────────────────────────

#[test]
fn autosave_waits_for_interval() {
    let dir = temp_dir("autosave");
    let path = dir.join("save.json");
    let clock = ManualClock::new(0);

    let (mut session, _) = Session::open(stocked(&clock), &path, 10_000).expect("open");
    session.advance(5_000).expect("advance");
    assert!(!path.exists(), "too early to autosave");

    clock.set(10_000);
    session.advance(10_000).expect("advance");
    assert!(path.exists(), "autosave after interval");
}

// ─────────────────────────────────────────────────────────────
// Test 4: advance_credits_production_between_frames
// ─────────────────────────────────────────────────────────────

#[test]
fn advance_credits_production_between_frames() {
    let dir = temp_dir("frame_production");
    let clock = ManualClock::new(0);

    let mut settlement = stocked(&clock);
    settlement.set_timers_enabled(false);
    let (mut session, _) = Session::open(settlement, &dir.join("save.json"), 0).expect("open");
    session.apply(&place("plot_a", "farm")).expect("place farm");

    let food_before = session.settlement().resources().balance(Resource::Food);
    let rate = session
        .settlement()
        .get_production_per_second()
        .amount(Resource::Food);
    assert!(rate > 0.0);

    clock.set(10_000);
    session.advance(10_000).expect("advance");
    let food_after = session.settlement().resources().balance(Resource::Food);
    assert!((food_after - food_before - rate * 10.0).abs() < 1e-9);
}

// ─────────────────────────────────────────────────────────────
// Test 5: shared_session_respects_queue_across_threads
// ─────────────────────────────────────────────────────────────

#[test]
fn shared_session_respects_queue_across_threads() {
    let dir = temp_dir("shared_session");
    let clock = ManualClock::new(0);
    let (session, _) = Session::open(stocked(&clock), &dir.join("save.json"), 0).expect("open");
    let limit = session.settlement().config().queue_limit;
    let shared = Arc::new(SharedSession::new(session));

    let handles: Vec<_> = ["plot_a", "plot_b", "plot_c", "plot_d"]
        .into_iter()
        .map(|plot| {
            let shared = Arc::clone(&shared);
            thread::spawn(move || shared.apply(&place(plot, "farm")))
        })
        .collect();
    let results: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("thread panicked"))
        .collect();

    let accepted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(accepted, limit);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(matches!(
            err,
            CommandError::Rejected(Rejection::QueueFull { .. })
        ));
    }
    assert_eq!(
        shared.with(|s| s.settlement().get_queue_info().active),
        limit
    );
}

// ─────────────────────────────────────────────────────────────
// Test 6: tampered_save_is_refused
// ─────────────────────────────────────────────────────────────

#[test]
fn tampered_save_is_refused() {
    let dir = temp_dir("tampered");
    let path = dir.join("save.json");
    let clock = ManualClock::new(0);

    {
        let (mut session, _) = Session::open(stocked(&clock), &path, 0).expect("open");
        session.save().expect("save");
    }
    let json = fs::read_to_string(&path).expect("read");
    fs::write(&path, json.replace("5000", "9000")).expect("write");

    let result = Session::open(Settlement::with_defaults(Arc::new(clock.clone())), &path, 0);
    assert!(matches!(result, Err(SaveError::ChecksumMismatch { .. })));
}

// ─────────────────────────────────────────────────────────────
// Test 7: reload_has_no_drift
// ─────────────────────────────────────────────────────────────

#[test]
fn reload_has_no_drift() {
    let dir = temp_dir("no_drift");
    let path = dir.join("save.json");
    let clock = ManualClock::new(0);

    let (mut session, _) = Session::open(stocked(&clock), &path, 0).expect("open");
    let script: Vec<Command> = serde_json::from_str(
        r#"[
            {"command": "place", "plot_id": "plot_a", "building_id": "farm"},
            {"command": "upgrade", "plot_id": "townhall"}
        ]"#,
    )
    .expect("parse script");
    for cmd in &script {
        session.apply(cmd).expect("command accepted");
    }
    clock.advance(20_000);
    session.advance(20_000).expect("advance");
    session.save().expect("save");

    let (reloaded, _) =
        Session::open(Settlement::with_defaults(Arc::new(clock.clone())), &path, 0).expect("reopen");
    let report = compare_states(session.settlement().state(), reloaded.settlement().state());
    assert!(report.is_identical(), "drift after reload: {report:?}");
}
