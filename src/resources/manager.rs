//! Admission control for concurrent workers.
//!
//! The `ResourceManager` combines a static ceiling on active workers with
//! the live verdict of an injected [`ResourceMonitor`].

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::resources::monitor::ResourceMonitor;
use crate::util::with_deadline;
use crate::{wlog_debug, wlog_trace, wlog_warn};

/// Default ceiling on concurrently active workers.
pub const DEFAULT_MAX_CONCURRENT: usize = 4;

/// Default time allowed for one monitor reading.
pub const DEFAULT_MONITOR_TIMEOUT_MS: u64 = 2_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceManagerConfig {
    /// Maximum number of workers allowed to run at once.
    pub max_concurrent: usize,
    /// Deadline for a monitor reading before admission is denied.
    pub monitor_timeout_ms: u64,
}

impl Default for ResourceManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            monitor_timeout_ms: DEFAULT_MONITOR_TIMEOUT_MS,
        }
    }
}

impl ResourceManagerConfig {
    pub fn with_max_concurrent(max_concurrent: usize) -> Self {
        Self {
            max_concurrent,
            ..Default::default()
        }
    }

    pub fn monitor_timeout(&self) -> Duration {
        Duration::from_millis(self.monitor_timeout_ms)
    }
}

/// Tracks active workers and decides whether another may start.
///
/// The active set is not capped by itself: callers must ask
/// [`can_spawn_agent`](Self::can_spawn_agent) before registering.
///
/// # Example
///
/// ```ignore
/// let monitor = Arc::new(StaticResourceMonitor::new(true));
/// let mut manager = ResourceManager::new(ResourceManagerConfig::default(), monitor);
///
/// if manager.can_spawn_agent().await {
///     manager.register_agent("agent-1");
/// }
/// ```
pub struct ResourceManager {
    config: ResourceManagerConfig,
    monitor: Arc<dyn ResourceMonitor>,
    active: HashSet<String>,
}

impl ResourceManager {
    pub fn new(config: ResourceManagerConfig, monitor: Arc<dyn ResourceMonitor>) -> Self {
        Self {
            config,
            monitor,
            active: HashSet::new(),
        }
    }

    pub fn config(&self) -> &ResourceManagerConfig {
        &self.config
    }

    pub fn max_concurrent(&self) -> usize {
        self.config.max_concurrent
    }

    /// Add a worker to the active set.
    pub fn register_agent(&mut self, id: impl Into<String>) {
        let id = id.into();
        wlog_debug!("ResourceManager: register agent={}", id);
        self.active.insert(id);
    }

    /// Remove a worker from the active set. Unknown IDs are ignored.
    pub fn unregister_agent(&mut self, id: &str) {
        if self.active.remove(id) {
            wlog_debug!("ResourceManager: unregister agent={}", id);
        }
    }

    /// Whether the active set is below the ceiling.
    pub fn has_capacity(&self) -> bool {
        if self.active.len() >= self.config.max_concurrent {
            wlog_debug!(
                "ResourceManager: at capacity ({}/{})",
                self.active.len(),
                self.config.max_concurrent
            );
            return false;
        }
        true
    }

    /// Decide whether a new worker may start right now.
    ///
    /// Denies without consulting the monitor when the ceiling is reached.
    /// A monitor that errors or misses its deadline also yields `false`.
    pub async fn can_spawn_agent(&self) -> bool {
        self.has_capacity() && self.monitor_gate().allows().await
    }

    /// Detached handle on the monitor, usable after the manager's lock is released.
    pub fn monitor_gate(&self) -> MonitorGate {
        MonitorGate {
            monitor: Arc::clone(&self.monitor),
            deadline: self.config.monitor_timeout(),
        }
    }

    /// Register `id` only if the ceiling still has room. Returns whether it did.
    pub fn try_register_agent(&mut self, id: impl Into<String>) -> bool {
        if !self.has_capacity() {
            return false;
        }
        self.register_agent(id);
        true
    }

    /// Ask the monitor to record its current readings as baseline.
    pub async fn set_baseline(&self) -> Result<()> {
        with_deadline(self.config.monitor_timeout(), self.monitor.set_baseline()).await
    }

    pub fn active_agent_count(&self) -> usize {
        self.active.len()
    }

    /// Active worker IDs, sorted.
    pub fn active_agents(&self) -> Vec<String> {
        let mut agents: Vec<String> = self.active.iter().cloned().collect();
        agents.sort();
        agents
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.active.contains(id)
    }
}

impl std::fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceManager")
            .field("config", &self.config)
            .field("active", &self.active.len())
            .finish()
    }
}

/// The monitor plus its deadline, detached from a [`ResourceManager`].
#[derive(Clone)]
pub struct MonitorGate {
    monitor: Arc<dyn ResourceMonitor>,
    deadline: Duration,
}

impl MonitorGate {
    /// Take one reading. An error or a missed deadline yields `false`.
    pub async fn allows(&self) -> bool {
        match with_deadline(self.deadline, self.monitor.get_current_metrics()).await {
            Ok(metrics) => {
                wlog_trace!("ResourceManager: metrics {:?}", metrics);
                if !metrics.can_spawn_agent {
                    wlog_warn!(
                        "ResourceManager: monitor denied spawn (cpu={:.1}%, pressure={:?}, processes={})",
                        metrics.kernel_task_cpu,
                        metrics.memory_pressure,
                        metrics.process_count
                    );
                }
                metrics.can_spawn_agent
            }
            Err(e) => {
                wlog_warn!("ResourceManager: monitor unavailable, denying spawn: {}", e);
                false
            }
        }
    }
}
