//! Core domain models for wave execution.
//!
//! Tasks, their per-attempt results, wave summaries, and the intra-wave
//! dependency graph used to order dispatch.

pub mod dag;
pub mod task;

pub use dag::WaveGraph;
pub use task::{Task, TaskFailure, TaskId, TaskResult, WaveResult, WaveSummary};
