//! The system resource monitor seam.
//!
//! How metrics are measured is up to the implementation; the resource
//! manager only consumes the precomputed `can_spawn_agent` verdict.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::Result;

/// Coarse memory pressure as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryPressure {
    #[default]
    Normal,
    Warning,
    Critical,
}

/// A snapshot of live system telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetrics {
    /// CPU share consumed by the kernel task, in percent.
    pub kernel_task_cpu: f64,
    pub memory_pressure: MemoryPressure,
    pub process_count: u32,
    /// Verdict precomputed by the monitor from its own thresholds.
    pub can_spawn_agent: bool,
    pub timestamp: DateTime<Utc>,
}

impl ResourceMetrics {
    /// Metrics describing an idle host.
    pub fn healthy() -> Self {
        Self {
            kernel_task_cpu: 0.0,
            memory_pressure: MemoryPressure::Normal,
            process_count: 0,
            can_spawn_agent: true,
            timestamp: Utc::now(),
        }
    }
}

/// Source of live resource telemetry.
///
/// Implementations must not block indefinitely; callers bound every call
/// with a deadline and treat errors as "do not spawn".
#[async_trait]
pub trait ResourceMonitor: Send + Sync {
    async fn get_current_metrics(&self) -> Result<ResourceMetrics>;

    /// Record the current readings as the baseline for later comparisons.
    async fn set_baseline(&self) -> Result<()>;
}

/// A monitor that reports fixed metrics with a switchable spawn verdict.
#[derive(Debug)]
pub struct StaticResourceMonitor {
    can_spawn: AtomicBool,
    process_count: u32,
    baseline_calls: AtomicUsize,
    metric_calls: AtomicUsize,
}

impl StaticResourceMonitor {
    pub fn new(can_spawn: bool) -> Self {
        Self {
            can_spawn: AtomicBool::new(can_spawn),
            process_count: 0,
            baseline_calls: AtomicUsize::new(0),
            metric_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_process_count(mut self, process_count: u32) -> Self {
        self.process_count = process_count;
        self
    }

    pub fn set_can_spawn(&self, can_spawn: bool) {
        self.can_spawn.store(can_spawn, Ordering::SeqCst);
    }

    /// How many times metrics were requested.
    pub fn metric_calls(&self) -> usize {
        self.metric_calls.load(Ordering::SeqCst)
    }

    pub fn baseline_calls(&self) -> usize {
        self.baseline_calls.load(Ordering::SeqCst)
    }
}

impl Default for StaticResourceMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl ResourceMonitor for StaticResourceMonitor {
    async fn get_current_metrics(&self) -> Result<ResourceMetrics> {
        self.metric_calls.fetch_add(1, Ordering::SeqCst);
        let can_spawn = self.can_spawn.load(Ordering::SeqCst);
        Ok(ResourceMetrics {
            process_count: self.process_count,
            can_spawn_agent: can_spawn,
            memory_pressure: if can_spawn {
                MemoryPressure::Normal
            } else {
                MemoryPressure::Critical
            },
            ..ResourceMetrics::healthy()
        })
    }

    async fn set_baseline(&self) -> Result<()> {
        self.baseline_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
