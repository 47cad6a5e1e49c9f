//! Configuration for the playback core
//!
//! Loaded from a TOML file; every field has a serde default so a partial
//! (or absent) file yields a usable configuration.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Playback core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Base URL of the catalog backend that exchanges storage paths for
    /// signed download URLs
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Path of the persisted playback snapshot (single well-known key)
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,

    /// Progress-tick period in milliseconds while observed and playing
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Background snapshot-write period in seconds while playing
    #[serde(default = "default_persist_interval_secs")]
    pub persist_interval_secs: u64,
}

fn default_api_base() -> String {
    "http://127.0.0.1:5780".to_string()
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from(".cache/fable/player-state.json")
}

fn default_tick_interval_ms() -> u64 {
    100
}

fn default_persist_interval_secs() -> u64 {
    5
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            snapshot_path: default_snapshot_path(),
            tick_interval_ms: default_tick_interval_ms(),
            persist_interval_secs: default_persist_interval_secs(),
        }
    }
}

impl PlayerConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("cannot parse {}: {}", path.display(), e)))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn persist_interval(&self) -> Duration {
        Duration::from_secs(self.persist_interval_secs.max(1))
    }
}
