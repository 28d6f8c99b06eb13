use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

use super::coordinator::{CoordinatorConfig, DEFAULT_EVALUATION_WINDOW};
use super::error::Result;
use super::registry::DEFAULT_ALERT_CAPACITY;
use super::state::DEFAULT_ROLL_CAPACITY;

/// Application settings. Every field has a default, so a partial
/// `settings.json` is fine.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Where `conditions.json` lives
    pub data_dir: PathBuf,
    /// JSON-lines file the page extractor appends snapshots to
    pub feed_path: PathBuf,
    /// Owner id → delivery target map
    pub targets_path: PathBuf,
    pub poll_interval_seconds: u64,
    pub reconnect_backoff_seconds: u64,
    pub roll_capacity: usize,
    pub alert_capacity: usize,
    /// Rolls handed to condition evaluation (capped at `roll_capacity`)
    pub evaluation_window: usize,
    pub transport_timeout_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            feed_path: PathBuf::from("data/feed.jsonl"),
            targets_path: PathBuf::from("data/targets.json"),
            poll_interval_seconds: 15,
            reconnect_backoff_seconds: 30,
            roll_capacity: DEFAULT_ROLL_CAPACITY,
            alert_capacity: DEFAULT_ALERT_CAPACITY,
            evaluation_window: DEFAULT_EVALUATION_WINDOW,
            transport_timeout_seconds: 10,
        }
    }
}

impl Settings {
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            poll_interval: Duration::from_secs(self.poll_interval_seconds.max(1)),
            reconnect_backoff: Duration::from_secs(self.reconnect_backoff_seconds.max(1)),
            evaluation_window: self.evaluation_window.min(self.roll_capacity),
        }
    }

    pub fn transport_timeout(&self) -> Duration {
        Duration::from_secs(self.transport_timeout_seconds.max(1))
    }

    /// Resolve relative paths against `base` (the config directory).
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        for path in [&mut self.data_dir, &mut self.feed_path, &mut self.targets_path] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
        self
    }
}

pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        Self {
            config_path: config_dir.as_ref().join("settings.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    fn read(&self) -> Result<Settings> {
        let content = fs::read_to_string(&self.config_path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Missing or unreadable settings fall back to defaults.
    pub fn load(&self) -> Settings {
        if !self.config_path.exists() {
            return Settings::default();
        }
        self.read().unwrap_or_else(|e| {
            warn!("Ignoring unreadable settings {:?}: {}", self.config_path, e);
            Settings::default()
        })
    }

    pub fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(settings)?;
        fs::write(&self.config_path, content)?;
        Ok(())
    }
}
