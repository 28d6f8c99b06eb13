// Condition and alert model types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::error::{Result, WatchError};
use crate::core::model::Category;

/// Which statistic a condition watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    /// Fewer than `threshold` matches among the last `window_size` rolls
    CountBelow,
    /// No match at all among the last `window_size` rolls
    AbsentStreak,
    /// The last `window_size` rolls all match
    Consecutive,
}

impl ConditionKind {
    pub fn all() -> &'static [ConditionKind] {
        &[Self::CountBelow, Self::AbsentStreak, Self::Consecutive]
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::CountBelow => "count_below",
            Self::AbsentStreak => "absent_streak",
            Self::Consecutive => "consecutive",
        }
    }

    fn uses_threshold(&self) -> bool {
        matches!(self, Self::CountBelow)
    }
}

impl FromStr for ConditionKind {
    type Err = WatchError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::all()
            .iter()
            .find(|kind| kind.code() == s.trim())
            .copied()
            .ok_or_else(|| WatchError::UnknownKind(s.to_string()))
    }
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Owner request to create a condition. Validated by [`NewCondition::build`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCondition {
    pub owner_id: String,
    pub category: Category,
    pub kind: ConditionKind,
    pub window_size: u32,
    #[serde(default)]
    pub threshold: u32,
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: u32,
}

fn default_cooldown_minutes() -> u32 {
    10
}

impl NewCondition {
    pub fn new(owner_id: impl Into<String>, category: Category, kind: ConditionKind, window_size: u32) -> Self {
        Self {
            owner_id: owner_id.into(),
            category,
            kind,
            window_size,
            threshold: 0,
            cooldown_minutes: default_cooldown_minutes(),
        }
    }

    pub fn threshold(mut self, threshold: u32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn cooldown_minutes(mut self, minutes: u32) -> Self {
        self.cooldown_minutes = minutes;
        self
    }

    /// Validates the request and assigns a fresh id.
    pub fn build(self) -> Result<Condition> {
        if self.owner_id.trim().is_empty() {
            return Err(WatchError::InvalidCondition("owner id is empty".to_string()));
        }
        if self.window_size == 0 {
            return Err(WatchError::InvalidCondition("window size must be at least 1".to_string()));
        }
        if self.cooldown_minutes == 0 {
            return Err(WatchError::InvalidCondition("cooldown must be at least 1 minute".to_string()));
        }
        if self.kind.uses_threshold() && self.threshold == 0 {
            return Err(WatchError::InvalidCondition("threshold must be at least 1".to_string()));
        }

        Ok(Condition {
            id: new_id(),
            owner_id: self.owner_id,
            category: self.category,
            kind: self.kind,
            window_size: self.window_size,
            threshold: if self.kind.uses_threshold() { self.threshold } else { 0 },
            cooldown_minutes: self.cooldown_minutes,
            last_fired_at: None,
            enabled: true,
        })
    }
}

/// A user-declared rule over the recent roll history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub id: String,
    pub owner_id: String,
    pub category: Category,
    pub kind: ConditionKind,
    pub window_size: u32,
    pub threshold: u32,
    pub cooldown_minutes: u32,
    pub last_fired_at: Option<DateTime<Utc>>,
    pub enabled: bool,
}

impl Condition {
    /// Human-readable rule, snapshotted into every alert it produces.
    pub fn description(&self) -> String {
        let color = self.category.display_name();
        match self.kind {
            ConditionKind::CountBelow => format!(
                "{} count < {} in last {} rolls",
                color, self.threshold, self.window_size
            ),
            ConditionKind::AbsentStreak => {
                format!("{} absent for {} consecutive rolls", color, self.window_size)
            }
            ConditionKind::Consecutive => {
                format!("{} appears {}x in a row", color, self.window_size)
            }
        }
    }
}

/// Record of a condition firing. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub condition_id: String,
    pub owner_id: String,
    pub description: String,
    pub fired_at: DateTime<Utc>,
    pub delivered: bool,
    pub error_message: Option<String>,
}

impl Alert {
    pub fn new(condition: &Condition, fired_at: DateTime<Utc>, delivered: bool, error_message: Option<String>) -> Self {
        Self {
            id: new_id(),
            condition_id: condition.id.clone(),
            owner_id: condition.owner_id.clone(),
            description: condition.description(),
            fired_at,
            delivered,
            error_message,
        }
    }
}

fn new_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}
