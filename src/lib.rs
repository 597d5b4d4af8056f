//! Wavefront: dependency-aware wave orchestration for agent tasks.
//!
//! Tasks are split into waves sized by the resource configuration, each
//! task is admitted by the [`ResourceManager`], and outcomes are collected
//! into a [`WaveResult`]. The [`StateManager`] persists checksummed
//! checkpoints and keeps a logical memory ledger; [`recovery`] provides
//! bounded retry with exponential backoff.

pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod orchestration;
pub mod recovery;
pub mod resources;
pub mod state;
pub mod util;

pub use crate::core::{Task, TaskFailure, TaskId, TaskResult, WaveResult, WaveSummary};
pub use config::Config;
pub use error::{Error, Result};
pub use orchestration::{
    ExecutorResponse, PromptValidator, ResponseParser, TaskExecutor, WaveOptions,
    WaveOrchestrator,
};
pub use recovery::{retry_with_backoff, ErrorRecovery, RetryPolicy};
pub use resources::{ResourceManager, ResourceManagerConfig, ResourceMetrics, ResourceMonitor};
pub use state::{MemoryUsage, StateManager, StateManagerConfig, WaveState};
