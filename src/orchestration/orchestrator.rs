//! Wave orchestrator.
//!
//! Splits a task list into waves sized from the resource configuration,
//! releases each wave's tasks in dependency order, and aggregates the
//! outcomes. Per-task failures are data in the returned [`WaveResult`];
//! only misuse of the call itself is an `Err`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore};

use crate::core::dag::WaveGraph;
use crate::core::task::{Task, TaskFailure, TaskResult, WaveResult, WaveSummary};
use crate::error::{Error, Result};
use crate::orchestration::collaborators::{
    JsonResponseParser, LengthPromptValidator, PromptValidator, ResponseParser, TaskExecutor,
};
use crate::orchestration::dispatch::{dispatch_task, Collaborators};
use crate::resources::ResourceManager;
use crate::state::{StateManager, WaveState};
use crate::{wlog, wlog_debug, wlog_warn};

/// Options for one [`WaveOrchestrator::execute_wave`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaveOptions {
    /// Tasks per wave. Defaults to [`WaveOrchestrator::calculate_wave_size`].
    pub wave_size: Option<usize>,
    /// Keep going after a task fails instead of halting.
    pub continue_on_error: bool,
    /// Let memory pressure shrink the default wave size.
    pub consider_memory: bool,
}

impl WaveOptions {
    pub fn with_wave_size(mut self, wave_size: usize) -> Self {
        self.wave_size = Some(wave_size);
        self
    }

    pub fn continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    pub fn consider_memory(mut self, consider_memory: bool) -> Self {
        self.consider_memory = consider_memory;
        self
    }
}

/// Results of one wave, keyed by position in the submitted task list.
struct WaveOutcome {
    results: Vec<(usize, TaskResult)>,
    halted: bool,
}

/// Drives waves of tasks through admission, execution and recording.
///
/// The resource and state managers are shared handles so the composition
/// root can inspect or reuse them between calls.
///
/// # Example
///
/// ```ignore
/// let orchestrator = WaveOrchestrator::new(resources, state, executor);
/// let result = orchestrator
///     .execute_wave(&tasks, WaveOptions::default().continue_on_error(true))
///     .await?;
/// assert_eq!(result.total_success + result.total_failure, result.tasks.len());
/// ```
pub struct WaveOrchestrator {
    resources: Arc<RwLock<ResourceManager>>,
    state: Arc<RwLock<StateManager>>,
    collaborators: Collaborators,
}

impl WaveOrchestrator {
    /// Create an orchestrator with the default prompt validator and parser.
    pub fn new(
        resources: Arc<RwLock<ResourceManager>>,
        state: Arc<RwLock<StateManager>>,
        executor: Arc<dyn TaskExecutor>,
    ) -> Self {
        Self {
            resources,
            state,
            collaborators: Collaborators {
                validator: Arc::new(LengthPromptValidator::default()),
                executor,
                parser: Arc::new(JsonResponseParser::new()),
            },
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn PromptValidator>) -> Self {
        self.collaborators.validator = validator;
        self
    }

    pub fn with_parser(mut self, parser: Arc<dyn ResponseParser>) -> Self {
        self.collaborators.parser = parser;
        self
    }

    pub fn resources(&self) -> &Arc<RwLock<ResourceManager>> {
        &self.resources
    }

    pub fn state(&self) -> &Arc<RwLock<StateManager>> {
        &self.state
    }

    /// Tasks per wave: the configured ceiling, optionally scaled down by
    /// memory utilization. Always within `1..=max_concurrent` (1 when the
    /// ceiling itself is 0).
    pub async fn calculate_wave_size(&self, consider_memory: bool) -> usize {
        let max = self.resources.read().await.max_concurrent().max(1);
        if !consider_memory {
            return max;
        }

        let usage = self.state.read().await.memory_usage();
        let free_fraction = ((100.0 - usage.utilization_percent) / 100.0).clamp(0.0, 1.0);
        let scaled = (max as f64 * free_fraction).ceil() as usize;
        let size = scaled.clamp(1, max);
        wlog_debug!(
            "calculate_wave_size: utilization={:.1}% -> {} of {}",
            usage.utilization_percent,
            size,
            max
        );
        size
    }

    /// Partition `tasks` into consecutive chunks of `wave_size`; the last
    /// chunk holds the remainder.
    ///
    /// # Errors
    /// `InvalidWaveSize` when `wave_size` is 0.
    pub fn split_into_waves(tasks: &[Task], wave_size: usize) -> Result<Vec<&[Task]>> {
        if wave_size < 1 {
            return Err(Error::InvalidWaveSize(wave_size));
        }
        Ok(tasks.chunks(wave_size).collect())
    }

    /// Run `tasks` wave by wave.
    ///
    /// A task is attempted only after every dependency produced a
    /// successful result earlier in this call; otherwise it fails with
    /// "Dependencies not satisfied" without touching the executor. With
    /// `continue_on_error` off, the first failure stops all further
    /// dispatch and unattempted tasks are left out of the result.
    ///
    /// # Errors
    /// `InvalidWaveSize` for an explicit wave size of 0, and
    /// `DuplicateTaskId` when two tasks share an ID.
    pub async fn execute_wave(&self, tasks: &[Task], options: WaveOptions) -> Result<WaveResult> {
        let mut seen = HashSet::with_capacity(tasks.len());
        for task in tasks {
            if !seen.insert(task.id.as_str()) {
                return Err(Error::DuplicateTaskId(task.id.clone()));
            }
        }

        let wave_size = match options.wave_size {
            Some(size) => size,
            None => self.calculate_wave_size(options.consider_memory).await,
        };
        let waves = Self::split_into_waves(tasks, wave_size)?;
        wlog!(
            "execute_wave: {} tasks in {} waves of up to {} (continue_on_error={})",
            tasks.len(),
            waves.len(),
            wave_size,
            options.continue_on_error
        );

        let mut outcomes: HashMap<String, bool> = HashMap::with_capacity(tasks.len());
        let mut resolved: Vec<(usize, TaskResult)> = Vec::with_capacity(tasks.len());
        let mut summaries = Vec::with_capacity(waves.len());

        for (index, wave) in waves.into_iter().enumerate() {
            let offset = index * wave_size;
            let outcome = if options.continue_on_error {
                self.run_wave_concurrent(wave, &mut outcomes).await
            } else {
                self.run_wave_halting(wave, &mut outcomes).await
            };

            let success_count = outcome.results.iter().filter(|(_, r)| r.success).count();
            let summary = WaveSummary {
                wave_number: index + 1,
                task_count: outcome.results.len(),
                success_count,
                failure_count: outcome.results.len() - success_count,
            };
            wlog!(
                "wave {}: {} tasks, {} succeeded, {} failed",
                summary.wave_number,
                summary.task_count,
                summary.success_count,
                summary.failure_count
            );
            summaries.push(summary);
            resolved.extend(
                outcome
                    .results
                    .into_iter()
                    .map(|(pos, result)| (offset + pos, result)),
            );

            if outcome.halted {
                wlog_warn!("execute_wave: halting after failure in wave {}", index + 1);
                break;
            }
        }

        resolved.sort_by_key(|(pos, _)| *pos);
        let results = resolved.into_iter().map(|(_, result)| result).collect();
        Ok(WaveResult::from_parts(results, summaries))
    }

    /// Save a snapshot of `result` as checkpoint `name`.
    pub async fn checkpoint(&self, name: &str, result: &WaveResult) -> Result<()> {
        let state = WaveState::from_wave_result(result);
        self.state.write().await.save_checkpoint(name, &state).await
    }

    fn dependencies_satisfied(task: &Task, outcomes: &HashMap<String, bool>) -> bool {
        task.dependencies
            .iter()
            .all(|dep| outcomes.get(dep).copied().unwrap_or(false))
    }

    async fn resolve_task(&self, task: &Task, outcomes: &HashMap<String, bool>) -> TaskResult {
        if !Self::dependencies_satisfied(task, outcomes) {
            wlog_debug!("task {}: dependencies not satisfied", task.id);
            return TaskResult::failed(task.id.clone(), TaskFailure::DependenciesNotSatisfied);
        }
        dispatch_task(task, &self.resources, &self.collaborators).await
    }

    /// One task at a time, lowest ready position first; stop at the first failure.
    async fn run_wave_halting(
        &self,
        wave: &[Task],
        outcomes: &mut HashMap<String, bool>,
    ) -> WaveOutcome {
        let graph = WaveGraph::build(wave);
        let mut done = HashSet::with_capacity(wave.len());
        let mut results = Vec::with_capacity(wave.len());

        while let Some(&pos) = graph.ready_positions(&done).first() {
            let task = &wave[pos];
            let result = self.resolve_task(task, outcomes).await;
            let success = result.success;
            outcomes.insert(task.id.clone(), success);
            done.insert(pos);
            results.push((pos, result));
            if !success {
                return WaveOutcome {
                    results,
                    halted: true,
                };
            }
        }

        // Whatever is left is caught in a dependency cycle.
        if let Some(&pos) = graph.stuck_positions(&done).first() {
            let task = &wave[pos];
            outcomes.insert(task.id.clone(), false);
            results.push((
                pos,
                TaskResult::failed(task.id.clone(), TaskFailure::DependenciesNotSatisfied),
            ));
            return WaveOutcome {
                results,
                halted: true,
            };
        }

        WaveOutcome {
            results,
            halted: false,
        }
    }

    /// Every ready task of a round dispatched together; rounds repeat until
    /// nothing is ready.
    ///
    /// At most `max_concurrent` dispatches are in flight, so a wave larger
    /// than the ceiling queues its surplus instead of being denied admission.
    async fn run_wave_concurrent(
        &self,
        wave: &[Task],
        outcomes: &mut HashMap<String, bool>,
    ) -> WaveOutcome {
        let graph = WaveGraph::build(wave);
        let limit = self.resources.read().await.max_concurrent().max(1);
        let permits = Arc::new(Semaphore::new(limit));
        let mut done = HashSet::with_capacity(wave.len());
        let mut results = Vec::with_capacity(wave.len());

        loop {
            let ready = graph.ready_positions(&done);
            if ready.is_empty() {
                break;
            }

            let snapshot = &*outcomes;
            let round = futures::future::join_all(ready.into_iter().map(|pos| {
                let permits = Arc::clone(&permits);
                async move {
                    let _permit = permits.acquire().await.ok();
                    (pos, self.resolve_task(&wave[pos], snapshot).await)
                }
            }))
            .await;

            for (pos, result) in round {
                outcomes.insert(wave[pos].id.clone(), result.success);
                done.insert(pos);
                results.push((pos, result));
            }
        }

        for pos in graph.stuck_positions(&done) {
            let task = &wave[pos];
            outcomes.insert(task.id.clone(), false);
            results.push((
                pos,
                TaskResult::failed(task.id.clone(), TaskFailure::DependenciesNotSatisfied),
            ));
        }

        WaveOutcome {
            results,
            halted: false,
        }
    }
}
