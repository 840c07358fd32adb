#![forbid(unsafe_code)]

use std::fs;

use glyco_kernel_contracts::axis::Axis;
use glyco_kernel_contracts::episode::EpisodeId;
use glyco_kernel_contracts::learning_state::{
    StoredEvidence, StoredLearningState, LEARNING_STATE_VERSION,
};
use glyco_kernel_contracts::tick::SettingsFingerprint;
use glyco_kernel_contracts::MonotonicTimeMs;
use glyco_storage::{FileLearningSlot, LearningStore, RestoreOutcome};

fn ev(t: u64, episode: u64, axis: Axis, outcome: &str, weight: f64) -> StoredEvidence {
    StoredEvidence {
        at_millis: MonotonicTimeMs(t),
        episode_id: EpisodeId(episode),
        axis,
        outcome: outcome.to_string(),
        strength: 0.7,
        weight,
        is_night: false,
    }
}

fn state(saved_at: u64) -> StoredLearningState {
    StoredLearningState {
        version: LEARNING_STATE_VERSION.to_string(),
        saved_at_millis: MonotonicTimeMs(saved_at),
        evidence: vec![
            ev(1_000, 1, Axis::Timing, "LATE", 0.56),
            ev(2_000, 1, Axis::Height, "TOO_HIGH", 0.42),
            ev(3_000, 2, Axis::Persistence, "TOO_SHORT", 0.3),
        ],
        settings: SettingsFingerprint {
            profile: Some("default".to_string()),
            meal_detect_speed: Some("normal".to_string()),
            correction_style: None,
        },
    }
}

#[test]
fn at_learning_store_db_01_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("learning.json");

    let mut store = LearningStore::file(&path);
    store.save(&state(5_000)).unwrap();
    assert!(path.exists());
    assert!(!path.with_extension("tmp").exists());

    let reopened = LearningStore::file(&path);
    assert_eq!(
        reopened.restore().unwrap(),
        RestoreOutcome::Restored(state(5_000))
    );
}

#[test]
fn at_learning_store_db_02_missing_file_is_absent() {
    let dir = tempfile::tempdir().unwrap();
    let store = LearningStore::file(dir.path().join("never_written.json"));
    assert_eq!(store.restore().unwrap(), RestoreOutcome::Absent);
}

#[test]
fn at_learning_store_db_03_garbage_file_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("learning.json");
    fs::write(&path, b"not json at all").unwrap();

    let store = LearningStore::file(&path);
    assert!(matches!(
        store.restore().unwrap(),
        RestoreOutcome::Corrupt { .. }
    ));
}

#[test]
fn at_learning_store_db_04_tampered_state_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("learning.json");
    let mut store = LearningStore::file(&path);
    store.save(&state(5_000)).unwrap();

    let raw = fs::read_to_string(&path).unwrap();
    let tampered = raw.replace("TOO_HIGH", "TOO_LOW");
    assert_ne!(raw, tampered);
    fs::write(&path, tampered).unwrap();

    assert!(matches!(
        store.restore().unwrap(),
        RestoreOutcome::Corrupt { .. }
    ));
}

#[test]
fn at_learning_store_db_05_version_bump_discards_old_blob() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("learning.json");

    let mut old = LearningStore::with_version(Box::new(FileLearningSlot::new(&path)), "v0");
    let mut s = state(5_000);
    s.version = "v0".to_string();
    old.save(&s).unwrap();

    let current = LearningStore::file(&path);
    assert_eq!(
        current.restore().unwrap(),
        RestoreOutcome::VersionMismatch {
            found: "v0".to_string()
        }
    );
}

#[test]
fn at_learning_store_db_06_clear_removes_blob() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("learning.json");
    let mut store = LearningStore::file(&path);
    store.save(&state(5_000)).unwrap();
    fs::write(path.with_extension("tmp"), b"stale").unwrap();

    store.clear().unwrap();
    assert!(!path.exists());
    assert!(!path.with_extension("tmp").exists());
    assert_eq!(store.restore().unwrap(), RestoreOutcome::Absent);
    store.clear().unwrap();
}

#[test]
fn at_learning_store_db_07_latest_save_wins() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("learning.json");
    let mut store = LearningStore::file(&path);
    store.save(&state(5_000)).unwrap();

    let mut newer = state(9_000);
    newer.evidence.truncate(1);
    store.save(&newer).unwrap();

    assert_eq!(store.restore().unwrap(), RestoreOutcome::Restored(newer));
}
