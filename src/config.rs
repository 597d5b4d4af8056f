use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::recovery::RetryPolicy;
use crate::resources::ResourceManagerConfig;
use crate::state::StateManagerConfig;
use crate::{wlog_debug, Error, Result};

/// Top-level configuration, stored as TOML at `~/.wavefront/wavefront.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub debug: bool,
    pub log_file: Option<String>,
    #[serde(default)]
    pub resources: ResourceManagerConfig,
    #[serde(default)]
    pub state: StateManagerConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Config {
    pub fn wavefront_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".wavefront"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::wavefront_dir()?.join("wavefront.toml"))
    }

    /// Directory holding checkpoints when none is configured.
    pub fn default_checkpoints_dir() -> PathBuf {
        Self::wavefront_dir()
            .map(|dir| dir.join("checkpoints"))
            .unwrap_or_else(|_| PathBuf::from(".wavefront/checkpoints"))
    }

    /// Log file path, falling back to `~/.wavefront/wavefront.log`.
    pub fn effective_log_file(&self) -> Result<PathBuf> {
        match &self.log_file {
            Some(path) => Ok(expand_tilde(path)),
            None => Ok(Self::wavefront_dir()?.join("wavefront.log")),
        }
    }

    /// Load from the default location. A missing file yields defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        wlog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            wlog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let mut config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        config.state.checkpoints_dir = expand_tilde(&config.state.checkpoints_dir.to_string_lossy());
        wlog_debug!(
            "Config loaded: max_concurrent={}, checkpoints_dir={}, retention_days={}",
            config.resources.max_concurrent,
            config.state.checkpoints_dir.display(),
            config.state.checkpoint_retention_days
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                wlog_debug!("Creating config directory: {}", parent.display());
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        wlog_debug!("Config saved to {}", path.display());
        Ok(())
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
