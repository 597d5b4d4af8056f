//! StateManager - durable checkpoints plus the simulated memory budget.

use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::config::Config;
use crate::error::Result;
use crate::state::checkpoint::{validate_checkpoint_name, CheckpointMetadata, WaveState};
use crate::state::memory::{MemoryLedger, MemoryUsage};
use crate::{wlog_debug, wlog_warn};

/// Default age after which checkpoints are garbage collected.
pub const DEFAULT_RETENTION_DAYS: u32 = 7;

/// Default simulated memory budget (256 MiB).
pub const DEFAULT_MAX_MEMORY_BYTES: u64 = 256 * 1024 * 1024;

const CHECKPOINT_EXTENSION: &str = "json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateManagerConfig {
    /// Directory holding one `{name}.json` file per checkpoint.
    pub checkpoints_dir: PathBuf,
    /// Checkpoints saved longer ago than this are removed by `compact_state`.
    pub checkpoint_retention_days: u32,
    /// Budget of the simulated memory ledger.
    pub max_memory_bytes: u64,
}

impl Default for StateManagerConfig {
    fn default() -> Self {
        Self {
            checkpoints_dir: Config::default_checkpoints_dir(),
            checkpoint_retention_days: DEFAULT_RETENTION_DAYS,
            max_memory_bytes: DEFAULT_MAX_MEMORY_BYTES,
        }
    }
}

impl StateManagerConfig {
    pub fn in_dir(checkpoints_dir: impl Into<PathBuf>) -> Self {
        Self {
            checkpoints_dir: checkpoints_dir.into(),
            ..Default::default()
        }
    }
}

/// Checkpoint store and memory ledger behind one handle.
///
/// Checkpoints are written atomically (temp file + rename) and verified
/// against their SHA-256 checksum on load. The ledger is purely in-memory.
pub struct StateManager {
    config: StateManagerConfig,
    ledger: MemoryLedger,
}

impl StateManager {
    pub fn new(config: StateManagerConfig) -> Self {
        wlog_debug!(
            "StateManager::new dir={} retention_days={} max_memory={}",
            config.checkpoints_dir.display(),
            config.checkpoint_retention_days,
            config.max_memory_bytes
        );
        let ledger = MemoryLedger::new(config.max_memory_bytes);
        Self { config, ledger }
    }

    pub fn config(&self) -> &StateManagerConfig {
        &self.config
    }

    pub fn checkpoints_dir(&self) -> &Path {
        &self.config.checkpoints_dir
    }

    fn checkpoint_path(&self, name: &str) -> PathBuf {
        self.config
            .checkpoints_dir
            .join(format!("{}.{}", name, CHECKPOINT_EXTENSION))
    }

    // ========== Checkpoints ==========

    /// Persist `state` under `name`, replacing any earlier checkpoint of that name.
    ///
    /// # Errors
    /// `InvalidCheckpointName` for empty names or names with path separators;
    /// I/O and serialization errors otherwise.
    pub async fn save_checkpoint(&mut self, name: &str, state: &WaveState) -> Result<()> {
        validate_checkpoint_name(name)?;

        let metadata = CheckpointMetadata::seal(state.clone(), Utc::now())?;
        let bytes = serde_json::to_vec_pretty(&metadata)?;

        fs::create_dir_all(&self.config.checkpoints_dir).await?;
        let path = self.checkpoint_path(name);
        let tmp = self.config.checkpoints_dir.join(format!(".{}.tmp", name));
        if let Err(e) = write_then_rename(&tmp, &path, &bytes).await {
            if let Err(cleanup) = fs::remove_file(&tmp).await {
                if cleanup.kind() != ErrorKind::NotFound {
                    wlog_warn!(
                        "StateManager: could not remove {}: {}",
                        tmp.display(),
                        cleanup
                    );
                }
            }
            return Err(e);
        }

        let charged = self.ledger.charge(name, bytes.len() as u64);
        wlog_debug!(
            "StateManager: saved checkpoint {} ({} bytes, {} charged) checksum={}",
            name,
            bytes.len(),
            charged,
            metadata.checksum
        );
        Ok(())
    }

    /// Load and verify the checkpoint called `name`.
    ///
    /// Returns `Ok(None)` when no such checkpoint exists.
    ///
    /// # Errors
    /// `ChecksumMismatch` if the stored payload does not match its checksum.
    pub async fn load_checkpoint(&self, name: &str) -> Result<Option<WaveState>> {
        validate_checkpoint_name(name)?;

        let bytes = match fs::read(self.checkpoint_path(name)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                wlog_debug!("StateManager: no checkpoint named {}", name);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let metadata: CheckpointMetadata = serde_json::from_slice(&bytes)?;
        if let Err(e) = metadata.verify(name) {
            wlog_warn!("StateManager: rejecting corrupt checkpoint {}: {}", name, e);
            return Err(e);
        }
        wlog_debug!(
            "StateManager: loaded checkpoint {} (wave {}, saved {})",
            name,
            metadata.state.wave_number,
            metadata.saved_at
        );
        Ok(Some(metadata.state))
    }

    /// Remove the checkpoint called `name`. Returns whether a file was removed.
    pub async fn delete_checkpoint(&mut self, name: &str) -> Result<bool> {
        validate_checkpoint_name(name)?;
        match fs::remove_file(self.checkpoint_path(name)).await {
            Ok(()) => {
                self.ledger.release(name);
                wlog_debug!("StateManager: deleted checkpoint {}", name);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Checkpoint names, sorted. A missing directory yields an empty list.
    pub async fn list_checkpoints(&self) -> Result<Vec<String>> {
        let mut entries = match fs::read_dir(&self.config.checkpoints_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(CHECKPOINT_EXTENSION) {
                continue;
            }
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Delete every checkpoint saved longer ago than the retention window.
    ///
    /// Returns the names removed. Files that cannot be parsed are left in
    /// place and logged.
    pub async fn compact_state(&mut self) -> Result<Vec<String>> {
        let cutoff =
            Utc::now() - ChronoDuration::days(i64::from(self.config.checkpoint_retention_days));
        let mut removed = Vec::new();

        for name in self.list_checkpoints().await? {
            let path = self.checkpoint_path(&name);
            let metadata = match fs::read(&path).await {
                Ok(bytes) => serde_json::from_slice::<CheckpointMetadata>(&bytes),
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let metadata = match metadata {
                Ok(metadata) => metadata,
                Err(e) => {
                    wlog_warn!("StateManager: skipping unreadable checkpoint {}: {}", name, e);
                    continue;
                }
            };

            if metadata.saved_at < cutoff {
                match fs::remove_file(&path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                self.ledger.release(&name);
                wlog_debug!(
                    "StateManager: expired checkpoint {} (saved {})",
                    name,
                    metadata.saved_at
                );
                removed.push(name);
            }
        }

        Ok(removed)
    }

    // ========== Memory ledger ==========

    pub fn grow_memory(&mut self, bytes: u64) -> Result<()> {
        self.ledger.grow(bytes).inspect_err(|e| {
            wlog_warn!("StateManager: grow_memory({}) failed: {}", bytes, e);
        })
    }

    pub fn shrink_memory(&mut self, bytes: u64) -> Result<()> {
        self.ledger.shrink(bytes).inspect_err(|e| {
            wlog_warn!("StateManager: shrink_memory({}) failed: {}", bytes, e);
        })
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        self.ledger.usage()
    }

    /// Defragment the ledger and reclaim bytes of removed checkpoints.
    ///
    /// Meant to run right after [`compact_state`](Self::compact_state).
    /// Returns the number of bytes reclaimed.
    pub fn compact_memory(&mut self) -> u64 {
        let reclaimed = self.ledger.compact();
        wlog_debug!("StateManager: compacted memory, reclaimed {} bytes", reclaimed);
        reclaimed
    }
}

async fn write_then_rename(tmp: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(tmp, bytes).await?;
    fs::rename(tmp, path).await?;
    Ok(())
}

impl std::fmt::Debug for StateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateManager")
            .field("config", &self.config)
            .field("memory", &self.ledger.usage())
            .finish()
    }
}
