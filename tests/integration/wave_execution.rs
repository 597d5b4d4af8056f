//! Wave execution integration tests.
//!
//! These tests run task lists through `WaveOrchestrator::execute_wave`
//! with a scripted executor and check ordering, dependency handling,
//! halting, and resource admission.

use std::time::Duration;

use wavefront::{Error, Task, WaveOptions, WaveOrchestrator};

use crate::fixtures::{independent_tasks, ScriptedExecutor, TestHarness};

/// Test: Wave partitioning
/// Given N tasks and a wave size k >= 1
/// When split into waves
/// Then there are ceil(N/k) waves, all full except possibly the last
#[test]
fn test_split_produces_expected_chunks() {
    let tasks = independent_tasks(&["a", "b", "c", "d", "e"]);

    let waves = WaveOrchestrator::split_into_waves(&tasks, 2).unwrap();
    let sizes: Vec<usize> = waves.iter().map(|w| w.len()).collect();
    assert_eq!(sizes, vec![2, 2, 1]);

    let waves = WaveOrchestrator::split_into_waves(&tasks, 5).unwrap();
    assert_eq!(waves.len(), 1);

    let waves = WaveOrchestrator::split_into_waves(&tasks, 10).unwrap();
    assert_eq!(waves.len(), 1);
    assert_eq!(waves[0].len(), 5);

    assert!(matches!(
        WaveOrchestrator::split_into_waves(&tasks, 0),
        Err(Error::InvalidWaveSize(0))
    ));
}

/// Test: Totals invariant and submission order
/// Given a mix of succeeding and failing tasks across several waves
/// When executed with continue_on_error
/// Then totals add up and results follow submission order
#[tokio::test]
async fn test_totals_and_order_across_waves() {
    let harness = TestHarness::new(2, ScriptedExecutor::new().failing(["b", "e"]));
    let tasks = independent_tasks(&["a", "b", "c", "d", "e"]);

    let result = harness
        .orchestrator
        .execute_wave(&tasks, WaveOptions::default().continue_on_error(true))
        .await
        .unwrap();

    assert_eq!(result.total_success + result.total_failure, result.tasks.len());
    assert_eq!(result.total_success, 3);
    assert_eq!(result.total_failure, 2);
    assert_eq!(result.waves.len(), 3);

    let ids: Vec<&str> = result.tasks.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c", "d", "e"]);

    let b = result.result_for("b").unwrap();
    assert_eq!(b.error.as_deref(), Some("provider refused: b"));
    assert_eq!(b.provider_used.as_deref(), Some("mock"));

    let a = result.result_for("a").unwrap();
    assert_eq!(a.response, Some(serde_json::json!({"prompt": "a"})));
}

/// Test: Halt on first failure
/// Given [ok, fail, ok]
/// When executed without continue_on_error
/// Then only two results are returned and the third task never runs
#[tokio::test]
async fn test_halt_versus_continue() {
    let tasks = independent_tasks(&["one", "two", "three"]);

    let halting = TestHarness::new(3, ScriptedExecutor::new().failing(["two"]));
    let result = halting
        .orchestrator
        .execute_wave(&tasks, WaveOptions::default())
        .await
        .unwrap();
    assert_eq!(result.tasks.len(), 2);
    assert_eq!(halting.executor.calls(), vec!["one", "two"]);

    let continuing = TestHarness::new(3, ScriptedExecutor::new().failing(["two"]));
    let result = continuing
        .orchestrator
        .execute_wave(&tasks, WaveOptions::default().continue_on_error(true))
        .await
        .unwrap();
    assert_eq!(result.tasks.len(), 3);
    assert_eq!(result.total_success, 2);
}

/// Test: Halting skips later waves
/// Given a failure in the first wave
/// When executed without continue_on_error
/// Then no later wave is started
#[tokio::test]
async fn test_halt_skips_later_waves() {
    let harness = TestHarness::new(2, ScriptedExecutor::new().failing(["a"]));
    let tasks = independent_tasks(&["a", "b", "c", "d"]);

    let result = harness
        .orchestrator
        .execute_wave(&tasks, WaveOptions::default())
        .await
        .unwrap();

    assert_eq!(result.waves.len(), 1);
    assert_eq!(result.tasks.len(), 1);
    assert_eq!(harness.executor.calls(), vec!["a"]);
}

/// Test: Dependency cascade
/// Given c depends on b and b fails
/// When executed with continue_on_error
/// Then c fails with "Dependencies not satisfied" and never reaches the executor
#[tokio::test]
async fn test_failed_dependency_cascades() {
    let harness = TestHarness::new(1, ScriptedExecutor::new().failing(["b"]));
    let tasks = vec![
        Task::new("a", "a"),
        Task::new("b", "b").depends_on(["a"]),
        Task::new("c", "c").depends_on(["b"]),
        Task::new("d", "d").depends_on(["c"]),
    ];

    let result = harness
        .orchestrator
        .execute_wave(&tasks, WaveOptions::default().continue_on_error(true))
        .await
        .unwrap();

    assert!(result.result_for("a").unwrap().success);
    for id in ["c", "d"] {
        let failed = result.result_for(id).unwrap();
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("Dependencies not satisfied"));
    }
    assert_eq!(harness.executor.calls(), vec!["a", "b"]);
}

/// Test: Cross-wave dependencies
/// Given a task in wave 2 that depends on a task in wave 1
/// When wave 1 succeeded
/// Then the dependent task runs
#[tokio::test]
async fn test_dependency_on_earlier_wave() {
    let harness = TestHarness::new(1, ScriptedExecutor::new());
    let tasks = vec![Task::new("setup", "setup"), Task::new("build", "build").depends_on(["setup"])];

    let result = harness
        .orchestrator
        .execute_wave(&tasks, WaveOptions::default())
        .await
        .unwrap();

    assert!(result.all_succeeded());
    assert_eq!(result.waves.len(), 2);
    assert_eq!(harness.executor.calls(), vec!["setup", "build"]);
}

/// Test: Unknown dependency
/// Given a task depending on an ID that is not in the list
/// When executed
/// Then it fails without being executed
#[tokio::test]
async fn test_unknown_dependency_fails() {
    let harness = TestHarness::new(2, ScriptedExecutor::new());
    let tasks = vec![Task::new("a", "a").depends_on(["ghost"]), Task::new("b", "b")];

    let result = harness
        .orchestrator
        .execute_wave(&tasks, WaveOptions::default().continue_on_error(true))
        .await
        .unwrap();

    assert!(!result.result_for("a").unwrap().success);
    assert!(result.result_for("b").unwrap().success);
    assert_eq!(harness.executor.calls(), vec!["b"]);
}

/// Test: Bounded concurrency
/// Given a ceiling of 2 and slow tasks
/// When executed with continue_on_error
/// Then no more than 2 executor calls overlap
#[tokio::test]
async fn test_concurrency_bounded_by_wave_size() {
    let harness = TestHarness::new(
        2,
        ScriptedExecutor::new().with_delay(Duration::from_millis(30)),
    );
    let tasks = independent_tasks(&["a", "b", "c", "d", "e"]);

    let result = harness
        .orchestrator
        .execute_wave(&tasks, WaveOptions::default().continue_on_error(true))
        .await
        .unwrap();

    assert!(result.all_succeeded());
    assert_eq!(harness.executor.peak_in_flight(), 2);
    assert_eq!(
        harness.orchestrator.resources().read().await.active_agent_count(),
        0
    );
}

/// Test: Oversized explicit wave
/// Given a ceiling of 2 and an explicit wave size of 5
/// When executed with continue_on_error
/// Then the surplus waits for a slot instead of being denied
#[tokio::test]
async fn test_explicit_wave_larger_than_ceiling_queues() {
    let harness = TestHarness::new(
        2,
        ScriptedExecutor::new().with_delay(Duration::from_millis(30)),
    );
    let tasks = independent_tasks(&["a", "b", "c", "d", "e"]);

    let result = harness
        .orchestrator
        .execute_wave(
            &tasks,
            WaveOptions::default().with_wave_size(5).continue_on_error(true),
        )
        .await
        .unwrap();

    assert_eq!(result.waves.len(), 1);
    assert!(result.all_succeeded());
    assert_eq!(harness.executor.calls().len(), 5);
    assert_eq!(harness.executor.peak_in_flight(), 2);
}

/// Test: Admission denial
/// Given a monitor that refuses new workers
/// When executed with continue_on_error
/// Then every task fails with "Resource limit exceeded" and nothing runs
#[tokio::test]
async fn test_admission_denied() {
    let harness = TestHarness::new(2, ScriptedExecutor::new());
    harness.monitor.set_can_spawn(false);
    let tasks = independent_tasks(&["a", "b", "c"]);

    let result = harness
        .orchestrator
        .execute_wave(&tasks, WaveOptions::default().continue_on_error(true))
        .await
        .unwrap();

    assert_eq!(result.total_failure, 3);
    assert!(result
        .tasks
        .iter()
        .all(|t| t.error.as_deref() == Some("Resource limit exceeded")));
    assert!(harness.executor.calls().is_empty());
}

/// Test: Memory-aware wave size
/// Given 75% of the memory budget allocated and a ceiling of 4
/// When the wave size is derived with memory considered
/// Then it shrinks to 1 and each task runs in its own wave
#[tokio::test]
async fn test_memory_pressure_shrinks_waves() {
    let harness = TestHarness::with_memory(4, 1000, ScriptedExecutor::new());
    harness
        .orchestrator
        .state()
        .write()
        .await
        .grow_memory(750)
        .unwrap();

    assert_eq!(harness.orchestrator.calculate_wave_size(false).await, 4);
    assert_eq!(harness.orchestrator.calculate_wave_size(true).await, 1);

    let tasks = independent_tasks(&["a", "b", "c"]);
    let result = harness
        .orchestrator
        .execute_wave(&tasks, WaveOptions::default().consider_memory(true))
        .await
        .unwrap();
    assert_eq!(result.waves.len(), 3);
}

/// Test: Validation failure
/// Given a blank prompt
/// When executed
/// Then the task fails validation and the executor is not called
#[tokio::test]
async fn test_blank_prompt_rejected() {
    let harness = TestHarness::new(2, ScriptedExecutor::new());
    let tasks = vec![Task::new("blank", "   "), Task::new("fine", "fine")];

    let result = harness
        .orchestrator
        .execute_wave(&tasks, WaveOptions::default().continue_on_error(true))
        .await
        .unwrap();

    let blank = result.result_for("blank").unwrap();
    assert_eq!(
        blank.error.as_deref(),
        Some("Validation failed: prompt is empty")
    );
    assert_eq!(harness.executor.calls(), vec!["fine"]);
}

/// Test: Checkpoint after a run
/// Given a finished execution
/// When checkpointed and reloaded
/// Then completed and failed IDs survive
#[tokio::test]
async fn test_checkpoint_after_run() {
    let harness = TestHarness::new(2, ScriptedExecutor::new().failing(["b"]));
    let tasks = independent_tasks(&["a", "b", "c"]);
    let result = harness
        .orchestrator
        .execute_wave(&tasks, WaveOptions::default().continue_on_error(true))
        .await
        .unwrap();

    harness.orchestrator.checkpoint("run-1", &result).await.unwrap();

    let state = harness.orchestrator.state().read().await;
    let loaded = state.load_checkpoint("run-1").await.unwrap().unwrap();
    assert_eq!(loaded.wave_number, 2);
    assert_eq!(loaded.completed_tasks, vec!["a", "c"]);
    assert_eq!(loaded.failed_tasks, vec!["b"]);
}
