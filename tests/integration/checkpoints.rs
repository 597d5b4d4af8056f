//! Checkpoint and memory ledger integration tests.
//!
//! These tests exercise the `StateManager` against real files in a
//! temporary directory.

use chrono::{Duration as ChronoDuration, Utc};
use std::path::Path;
use tokio_test::{assert_err, assert_ok};

use wavefront::{Error, StateManager, WaveState};

use crate::fixtures::state_manager;

fn sample_state() -> WaveState {
    let mut state = WaveState::new(3);
    state.completed_tasks = vec!["a".into(), "b".into()];
    state.failed_tasks = vec!["c".into()];
    state
}

async fn rewrite_json(path: &Path, edit: impl FnOnce(&mut serde_json::Value)) {
    let bytes = tokio::fs::read(path).await.unwrap();
    let mut value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    edit(&mut value);
    tokio::fs::write(path, serde_json::to_vec_pretty(&value).unwrap())
        .await
        .unwrap();
}

fn checkpoint_file(manager: &StateManager, name: &str) -> std::path::PathBuf {
    manager.checkpoints_dir().join(format!("{}.json", name))
}

/// Test: Round trip
/// Given a saved checkpoint
/// When loaded by name
/// Then the same state comes back
#[tokio::test]
async fn test_save_and_load_round_trip() {
    let (_dir, mut manager) = state_manager(7, 1024 * 1024);
    let state = sample_state();

    manager.save_checkpoint("wave-3", &state).await.unwrap();
    let loaded = manager.load_checkpoint("wave-3").await.unwrap();

    assert_eq!(loaded, Some(state));
    assert_eq!(manager.list_checkpoints().await.unwrap(), vec!["wave-3"]);
}

/// Test: Missing checkpoint
/// Given no checkpoint of that name
/// When loaded
/// Then the result is None rather than an error
#[tokio::test]
async fn test_missing_checkpoint_is_none() {
    let (_dir, manager) = state_manager(7, 1024);
    assert_eq!(manager.load_checkpoint("nothing").await.unwrap(), None);
    assert!(manager.list_checkpoints().await.unwrap().is_empty());
}

/// Test: Corruption detection
/// Given a checkpoint whose stored state was edited on disk
/// When loaded
/// Then the checksum mismatch is reported
#[tokio::test]
async fn test_tampered_checkpoint_rejected() {
    let (_dir, mut manager) = state_manager(7, 1024 * 1024);
    manager.save_checkpoint("wave-3", &sample_state()).await.unwrap();

    rewrite_json(&checkpoint_file(&manager, "wave-3"), |value| {
        value["completedTasks"] = serde_json::json!(["a", "b", "c"]);
    })
    .await;

    let result = manager.load_checkpoint("wave-3").await;
    assert!(matches!(result, Err(Error::ChecksumMismatch { name, .. }) if name == "wave-3"));
}

/// Test: Invalid names
/// Given names that would escape the checkpoint directory
/// When saved
/// Then they are rejected before touching the filesystem
#[tokio::test]
async fn test_invalid_names_rejected() {
    let (_dir, mut manager) = state_manager(7, 1024);
    for name in ["", ".", "..", "../escape", "a/b", "a\\b"] {
        let result = manager.save_checkpoint(name, &sample_state()).await;
        assert!(
            matches!(result, Err(Error::InvalidCheckpointName(_))),
            "name {:?} should be rejected",
            name
        );
    }
}

/// Test: Retention
/// Given one checkpoint saved two days ago and one saved now
/// When state is compacted with a one-day retention
/// Then only the old checkpoint is removed
#[tokio::test]
async fn test_compact_state_removes_expired() {
    let (_dir, mut manager) = state_manager(1, 1024 * 1024);
    manager.save_checkpoint("old", &sample_state()).await.unwrap();
    manager.save_checkpoint("fresh", &sample_state()).await.unwrap();

    let two_days_ago = Utc::now() - ChronoDuration::days(2);
    rewrite_json(&checkpoint_file(&manager, "old"), |value| {
        value["savedAt"] = serde_json::json!(two_days_ago);
    })
    .await;

    let removed = manager.compact_state().await.unwrap();
    assert_eq!(removed, vec!["old"]);
    assert_eq!(manager.list_checkpoints().await.unwrap(), vec!["fresh"]);
    assert!(manager.load_checkpoint("fresh").await.unwrap().is_some());
}

/// Test: Retention then defragmentation
/// Given charged checkpoints where one has expired
/// When compact_state is followed by compact_memory
/// Then exactly the expired checkpoint's charge is reclaimed
#[tokio::test]
async fn test_compact_state_then_memory_reclaims_expired_bytes() {
    let (_dir, mut manager) = state_manager(1, 1024 * 1024);
    assert_ok!(manager.grow_memory(100_000));
    manager.save_checkpoint("old", &sample_state()).await.unwrap();
    manager.save_checkpoint("fresh", &sample_state()).await.unwrap();

    let old_path = checkpoint_file(&manager, "old");
    let fresh_path = checkpoint_file(&manager, "fresh");
    let old_bytes = std::fs::metadata(&old_path).unwrap().len();
    let fresh_bytes = std::fs::metadata(&fresh_path).unwrap().len();
    assert_eq!(manager.memory_usage().used_bytes, old_bytes + fresh_bytes);

    let two_days_ago = Utc::now() - ChronoDuration::days(2);
    rewrite_json(&old_path, |value| {
        value["savedAt"] = serde_json::json!(two_days_ago);
    })
    .await;

    assert_eq!(manager.compact_state().await.unwrap(), vec!["old"]);
    // Removal alone does not return the bytes.
    assert_eq!(manager.memory_usage().used_bytes, old_bytes + fresh_bytes);

    assert_eq!(manager.compact_memory(), old_bytes);
    let usage = manager.memory_usage();
    assert_eq!(usage.used_bytes, fresh_bytes);
    assert_eq!(usage.allocated_bytes, 100_000 - old_bytes);
    assert_eq!(usage.fragmentation_percent, 0.0);
}

/// Test: Delete
/// Given a saved checkpoint
/// When deleted twice
/// Then the first delete reports removal and the second does not
#[tokio::test]
async fn test_delete_checkpoint() {
    let (_dir, mut manager) = state_manager(7, 1024 * 1024);
    manager.save_checkpoint("gone", &sample_state()).await.unwrap();

    assert!(manager.delete_checkpoint("gone").await.unwrap());
    assert!(!manager.delete_checkpoint("gone").await.unwrap());
    assert_eq!(manager.load_checkpoint("gone").await.unwrap(), None);
}

/// Test: Growth boundary
/// Given a ledger with a 1000 byte budget
/// When grown to exactly the budget and then by one more byte
/// Then the first succeeds and the second fails leaving usage unchanged
#[tokio::test]
async fn test_grow_memory_boundary() {
    let (_dir, mut manager) = state_manager(7, 1000);

    assert_ok!(manager.grow_memory(1000));
    let before = manager.memory_usage();

    let err = assert_err!(manager.grow_memory(1));
    assert!(matches!(err, Error::MemoryLimitExceeded { .. }));
    assert_eq!(manager.memory_usage(), before);
    assert_eq!(before.allocated_bytes, 1000);
}

/// Test: Pressure threshold
/// Given allocations at 80% and 81% of the budget
/// When usage is read
/// Then pressure is reported only above 80%
#[tokio::test]
async fn test_pressure_threshold() {
    let (_dir, mut manager) = state_manager(7, 1000);

    manager.grow_memory(800).unwrap();
    let usage = manager.memory_usage();
    assert!(!usage.is_under_pressure);
    assert!((usage.utilization_percent - 80.0).abs() < f64::EPSILON);

    manager.grow_memory(10).unwrap();
    assert!(manager.memory_usage().is_under_pressure);
}

/// Test: Shrink
/// Given an allocation smaller than the requested shrink
/// When shrunk
/// Then the call fails and a valid shrink afterwards succeeds
#[tokio::test]
async fn test_shrink_memory() {
    let (_dir, mut manager) = state_manager(7, 1000);
    manager.grow_memory(100).unwrap();

    assert!(matches!(
        manager.shrink_memory(200),
        Err(Error::InsufficientAllocation { .. })
    ));
    manager.shrink_memory(40).unwrap();
    assert_eq!(manager.memory_usage().allocated_bytes, 60);
}
