//! Checkpoint payloads and their tamper-evident envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::task::{TaskId, WaveResult};
use crate::error::{Error, Result};

/// Execution progress as persisted by callers between waves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaveState {
    pub wave_number: usize,
    pub completed_tasks: Vec<TaskId>,
    pub failed_tasks: Vec<TaskId>,
    pub timestamp: DateTime<Utc>,
}

impl WaveState {
    pub fn new(wave_number: usize) -> Self {
        Self {
            wave_number,
            completed_tasks: Vec::new(),
            failed_tasks: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Snapshot a finished execution: the last wave number plus every
    /// succeeded and failed task ID in submission order.
    pub fn from_wave_result(result: &WaveResult) -> Self {
        let (completed, failed): (Vec<_>, Vec<_>) =
            result.tasks.iter().partition(|task| task.success);
        Self {
            wave_number: result.waves.last().map(|w| w.wave_number).unwrap_or(0),
            completed_tasks: completed.into_iter().map(|t| t.id.clone()).collect(),
            failed_tasks: failed.into_iter().map(|t| t.id.clone()).collect(),
            timestamp: Utc::now(),
        }
    }
}

/// On-disk form of a checkpoint: the state plus save time and checksum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointMetadata {
    #[serde(flatten)]
    pub state: WaveState,
    pub saved_at: DateTime<Utc>,
    pub checksum: String,
}

impl CheckpointMetadata {
    /// Wrap `state` with a fresh checksum.
    pub fn seal(state: WaveState, saved_at: DateTime<Utc>) -> Result<Self> {
        let checksum = compute_checksum(&state)?;
        Ok(Self {
            state,
            saved_at,
            checksum,
        })
    }

    /// Recompute the checksum and compare it to the stored one.
    pub fn verify(&self, name: &str) -> Result<()> {
        let actual = compute_checksum(&self.state)?;
        if actual != self.checksum {
            return Err(Error::ChecksumMismatch {
                name: name.to_string(),
                expected: self.checksum.clone(),
                actual,
            });
        }
        Ok(())
    }
}

/// Lowercase hex SHA-256 of the canonical JSON form of `state`.
pub fn compute_checksum(state: &WaveState) -> Result<String> {
    let bytes = serde_json::to_vec(state)?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

/// Reject names that could escape the checkpoint directory.
pub fn validate_checkpoint_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(Error::InvalidCheckpointName(name.to_string()));
    }
    Ok(())
}
