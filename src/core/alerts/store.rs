//! Durable storage for the condition list.
//!
//! The whole list is one JSON document, rewritten on every change:
//!
//! ```json
//! { "version": 1, "conditions": [ { "id": "1a2b3c4d", ... } ] }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

use super::model::{Condition, ConditionKind};
use crate::core::error::{Result, WatchError};
use crate::core::model::Category;

pub const SCHEMA_VERSION: u32 = 1;

const FILE_NAME: &str = "conditions.json";

#[derive(Deserialize)]
struct VersionHeader {
    version: u32,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConditionFile {
    version: u32,
    conditions: Vec<StoredCondition>,
}

/// On-disk shape of a condition. Timestamps stay strings so one bad value
/// does not reject the whole file.
#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct StoredCondition {
    id: String,
    owner_id: String,
    category: Category,
    kind: ConditionKind,
    window_size: u32,
    threshold: u32,
    cooldown_minutes: u32,
    #[serde(default)]
    last_fired_at: Option<String>,
    enabled: bool,
}

impl From<&Condition> for StoredCondition {
    fn from(c: &Condition) -> Self {
        Self {
            id: c.id.clone(),
            owner_id: c.owner_id.clone(),
            category: c.category,
            kind: c.kind,
            window_size: c.window_size,
            threshold: c.threshold,
            cooldown_minutes: c.cooldown_minutes,
            last_fired_at: c.last_fired_at.map(|t| t.to_rfc3339()),
            enabled: c.enabled,
        }
    }
}

impl StoredCondition {
    fn into_condition(self) -> Condition {
        let last_fired_at = self.last_fired_at.and_then(|raw| {
            match DateTime::parse_from_rfc3339(&raw) {
                Ok(t) => Some(t.with_timezone(&Utc)),
                Err(e) => {
                    warn!(
                        "Condition {} has unparsable last_fired_at {:?} ({}), treating as never fired",
                        self.id, raw, e
                    );
                    None
                }
            }
        });

        Condition {
            id: self.id,
            owner_id: self.owner_id,
            category: self.category,
            kind: self.kind,
            window_size: self.window_size,
            threshold: self.threshold,
            cooldown_minutes: self.cooldown_minutes,
            last_fired_at,
            enabled: self.enabled,
        }
    }
}

/// Reads and rewrites `conditions.json` in the data directory.
pub struct ConditionStore {
    path: PathBuf,
}

impl ConditionStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored conditions. A missing file is an empty list.
    pub fn load(&self) -> Result<Vec<Condition>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path)?;
        let header: VersionHeader = serde_json::from_str(&content)?;
        if header.version != SCHEMA_VERSION {
            return Err(WatchError::UnsupportedVersion(header.version));
        }

        let file: ConditionFile = serde_json::from_str(&content)?;
        Ok(file
            .conditions
            .into_iter()
            .map(StoredCondition::into_condition)
            .collect())
    }

    /// Replace the stored list with `conditions`.
    pub fn save(&self, conditions: &[Condition]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = ConditionFile {
            version: SCHEMA_VERSION,
            conditions: conditions.iter().map(StoredCondition::from).collect(),
        };
        let content = serde_json::to_string_pretty(&file)?;

        // Write-then-rename so a crash never leaves a half-written file
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Move an unreadable file out of the way so the next save cannot clobber it.
    pub fn quarantine(&self) -> Result<PathBuf> {
        let target = self.path.with_extension("json.corrupt");
        fs::rename(&self.path, &target)?;
        Ok(target)
    }
}
