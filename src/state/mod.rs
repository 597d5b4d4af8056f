//! Durable execution state and the simulated memory budget.
//!
//! Checkpoints are JSON files guarded by a SHA-256 checksum; the memory
//! ledger is an in-process model used to size waves under pressure.

mod checkpoint;
mod manager;
mod memory;

pub use checkpoint::{compute_checksum, validate_checkpoint_name, CheckpointMetadata, WaveState};
pub use manager::{
    StateManager, StateManagerConfig, DEFAULT_MAX_MEMORY_BYTES, DEFAULT_RETENTION_DAYS,
};
pub use memory::{MemoryLedger, MemoryUsage, PRESSURE_THRESHOLD_PERCENT};
