//! Per-task dispatch pipeline.
//!
//! admit -> validate -> execute -> parse -> record. Each stage either
//! passes its output on or ends the task with a [`TaskFailure`]. The
//! worker slot taken at admission is always released before the result
//! is returned.

use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::core::task::{Task, TaskFailure, TaskResult};
use crate::orchestration::collaborators::{PromptValidator, ResponseParser, TaskExecutor};
use crate::resources::ResourceManager;
use crate::{wlog_debug, wlog_trace};

/// The injected collaborators a dispatch needs.
#[derive(Clone)]
pub(crate) struct Collaborators {
    pub validator: Arc<dyn PromptValidator>,
    pub executor: Arc<dyn TaskExecutor>,
    pub parser: Arc<dyn ResponseParser>,
}

/// Take a worker slot for `task`, or `None` if admission is denied.
///
/// The monitor is read with no lock held. The ceiling is checked again
/// under the write lock at registration, so concurrent dispatches cannot
/// both claim the last slot.
async fn admit(task: &Task, resources: &RwLock<ResourceManager>) -> Option<String> {
    let gate = {
        let manager = resources.read().await;
        if !manager.has_capacity() {
            return None;
        }
        manager.monitor_gate()
    };
    if !gate.allows().await {
        return None;
    }

    let agent_id = format!("{}-{}", task.id, Uuid::new_v4());
    if resources.write().await.try_register_agent(agent_id.clone()) {
        Some(agent_id)
    } else {
        None
    }
}

fn validate(task: &Task, validator: &dyn PromptValidator) -> Result<(), TaskFailure> {
    let outcome = validator.validate(&task.prompt);
    if outcome.valid {
        Ok(())
    } else {
        Err(TaskFailure::Validation(
            outcome.reason.unwrap_or_else(|| "prompt rejected".to_string()),
        ))
    }
}

/// Run validate, execute and parse for an admitted task.
///
/// `provider_used` is filled in as soon as the executor reports it, so
/// failures after execution still carry it.
async fn run_stages(
    task: &Task,
    collaborators: &Collaborators,
    provider_used: &mut Option<String>,
) -> Result<serde_json::Value, TaskFailure> {
    validate(task, collaborators.validator.as_ref())?;

    let response = collaborators.executor.execute(&task.prompt).await;
    *provider_used = response.provider_used.clone();
    if !response.success {
        return Err(TaskFailure::Executor(response.error.unwrap_or_else(|| {
            "executor reported failure without a message".to_string()
        })));
    }

    let raw = response.response.unwrap_or_default();
    wlog_trace!("dispatch: task {} raw response: {}", task.id, raw);
    collaborators
        .parser
        .parse(&raw)
        .map_err(|e| TaskFailure::Parse(e.to_string()))
}

/// Dispatch one dependency-cleared task and record its outcome.
pub(crate) async fn dispatch_task(
    task: &Task,
    resources: &Arc<RwLock<ResourceManager>>,
    collaborators: &Collaborators,
) -> TaskResult {
    let Some(agent_id) = admit(task, resources).await else {
        wlog_debug!("dispatch: task {} denied admission", task.id);
        return TaskResult::failed(task.id.clone(), TaskFailure::ResourceLimit);
    };
    wlog_debug!("dispatch: task {} running as {}", task.id, agent_id);

    let mut provider_used = None;
    let outcome = run_stages(task, collaborators, &mut provider_used).await;

    resources.write().await.unregister_agent(&agent_id);

    match outcome {
        Ok(response) => {
            wlog_debug!("dispatch: task {} succeeded", task.id);
            TaskResult::succeeded(task.id.clone(), response, provider_used)
        }
        Err(failure) => {
            wlog_debug!("dispatch: task {} failed: {}", task.id, failure);
            TaskResult::failed(task.id.clone(), failure).with_provider(provider_used)
        }
    }
}
