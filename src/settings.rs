// src/settings.rs
//
// Engine settings, persisted as JSON in the user's config directory.
// Every field has a serde default so older or partial files keep loading.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::buffer_store::BufferCaps;
use crate::io::{BreakerConfig, LineEnding, LinkConfig};
use crate::memory::OptimizerConfig;
use crate::render::DisplayOptions;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write settings to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize settings: {0}")]
    Serialize(#[source] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EngineSettings {
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub buffer: BufferCaps,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub display: DisplayOptions,
    #[serde(default)]
    pub line_ending: LineEnding,
    #[serde(default = "default_write_queue_capacity")]
    pub write_queue_capacity: usize,
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64, // 0 = disabled
    /// Keep records from the previous session when connecting again.
    #[serde(default)]
    pub keep_buffer_across_sessions: bool,
    /// Last link opened, offered again on the next start.
    #[serde(default)]
    pub last_link: Option<LinkConfig>,
}

fn default_write_queue_capacity() -> usize {
    32
}
fn default_join_timeout_ms() -> u64 {
    3_000
}
fn default_health_check_interval_ms() -> u64 {
    2_000
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            breaker: BreakerConfig::default(),
            buffer: BufferCaps::default(),
            optimizer: OptimizerConfig::default(),
            display: DisplayOptions::default(),
            line_ending: LineEnding::default(),
            write_queue_capacity: default_write_queue_capacity(),
            join_timeout_ms: default_join_timeout_ms(),
            health_check_interval_ms: default_health_check_interval_ms(),
            keep_buffer_across_sessions: false,
            last_link: None,
        }
    }
}

impl EngineSettings {
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn health_check_interval(&self) -> Option<Duration> {
        match self.health_check_interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

/// `<config dir>/linkterm/settings.json`, if the platform has a config dir.
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("linkterm").join("settings.json"))
}

/// Load settings from `path`. A missing file yields (and writes) the defaults.
pub fn load_settings(path: &Path) -> Result<EngineSettings, SettingsError> {
    if path.exists() {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    } else {
        // First run: persist defaults so the user has a file to edit
        let settings = EngineSettings::default();
        save_settings(path, &settings)?;
        Ok(settings)
    }
}

pub fn save_settings(path: &Path, settings: &EngineSettings) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| SettingsError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let content = serde_json::to_string_pretty(settings).map_err(SettingsError::Serialize)?;

    std::fs::write(path, content).map_err(|source| SettingsError::Write {
        path: path.to_path_buf(),
        source,
    })
}
