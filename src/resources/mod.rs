//! Resource-aware admission control.
//!
//! The `ResourceManager` gates worker starts against a static ceiling and
//! the verdict of an injected `ResourceMonitor`.

mod manager;
mod monitor;

pub use manager::{
    MonitorGate, ResourceManager, ResourceManagerConfig, DEFAULT_MAX_CONCURRENT,
    DEFAULT_MONITOR_TIMEOUT_MS,
};
pub use monitor::{MemoryPressure, ResourceMetrics, ResourceMonitor, StaticResourceMonitor};
