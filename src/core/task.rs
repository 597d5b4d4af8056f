//! Task data model for wave execution.
//!
//! Tasks are immutable inputs; every attempt produces exactly one
//! [`TaskResult`], and a whole `execute_wave` call is summarised by a
//! [`WaveResult`].

use serde::{Deserialize, Serialize};

/// Identifier of a task, unique within one execution.
pub type TaskId = String;

/// A unit of work submitted to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub prompt: String,
    /// IDs of tasks in the same execution that must succeed first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<TaskId>,
}

impl Task {
    pub fn new(id: impl Into<TaskId>, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            dependencies: Vec::new(),
        }
    }

    /// Builder-style dependency declaration.
    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskId>,
    {
        self.dependencies.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn has_dependencies(&self) -> bool {
        !self.dependencies.is_empty()
    }
}

/// Why a task did not succeed.
///
/// Rendered into [`TaskResult::error`]; these are expected outcomes,
/// never hard errors of the orchestrator itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskFailure {
    /// The prompt validator rejected the prompt.
    Validation(String),
    /// Admission control denied a worker slot.
    ResourceLimit,
    /// A dependency failed, was never attempted, or is unknown.
    DependenciesNotSatisfied,
    /// The executor reported failure.
    Executor(String),
    /// The executor succeeded but its reply could not be parsed.
    Parse(String),
}

impl std::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskFailure::Validation(reason) => write!(f, "Validation failed: {}", reason),
            TaskFailure::ResourceLimit => write!(f, "Resource limit exceeded"),
            TaskFailure::DependenciesNotSatisfied => write!(f, "Dependencies not satisfied"),
            TaskFailure::Executor(message) => write!(f, "{}", message),
            TaskFailure::Parse(message) => write!(f, "Response parse failed: {}", message),
        }
    }
}

/// Outcome of one task attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub id: TaskId,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_used: Option<String>,
}

impl TaskResult {
    pub fn succeeded(
        id: impl Into<TaskId>,
        response: serde_json::Value,
        provider_used: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            success: true,
            response: Some(response),
            error: None,
            provider_used,
        }
    }

    pub fn failed(id: impl Into<TaskId>, failure: TaskFailure) -> Self {
        Self {
            id: id.into(),
            success: false,
            response: None,
            error: Some(failure.to_string()),
            provider_used: None,
        }
    }

    /// Attach the provider that served the attempt.
    pub fn with_provider(mut self, provider_used: Option<String>) -> Self {
        self.provider_used = provider_used;
        self
    }
}

/// Per-wave counts, produced once every task of the wave is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaveSummary {
    /// 1-based position of the wave within its execution.
    pub wave_number: usize,
    pub task_count: usize,
    pub success_count: usize,
    pub failure_count: usize,
}

/// Aggregate result of one `execute_wave` call.
///
/// `tasks` is in submission order and
/// `total_success + total_failure == tasks.len()` always holds.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaveResult {
    pub tasks: Vec<TaskResult>,
    pub waves: Vec<WaveSummary>,
    pub total_success: usize,
    pub total_failure: usize,
}

impl WaveResult {
    /// Build the aggregate from resolved results and wave summaries.
    pub fn from_parts(tasks: Vec<TaskResult>, waves: Vec<WaveSummary>) -> Self {
        let total_success = tasks.iter().filter(|r| r.success).count();
        let total_failure = tasks.len() - total_success;
        Self {
            tasks,
            waves,
            total_success,
            total_failure,
        }
    }

    pub fn result_for(&self, id: &str) -> Option<&TaskResult> {
        self.tasks.iter().find(|r| r.id == id)
    }

    pub fn all_succeeded(&self) -> bool {
        self.total_failure == 0
    }
}
