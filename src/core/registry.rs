//! Owner-scoped conditions and the alert log.
//!
//! Every mutation runs under one lock and rewrites the condition file
//! before returning. Alerts are memory-only.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use log::{error, info, warn};

use super::alerts::model::{Alert, Condition};
use super::alerts::store::ConditionStore;

/// Default number of alerts kept in memory.
pub const DEFAULT_ALERT_CAPACITY: usize = 500;

/// Alerts returned by a listing when the caller gives no limit.
pub const DEFAULT_ALERT_LIST_LIMIT: usize = 50;

struct RegistryInner {
    conditions: Vec<Condition>,
    alerts: VecDeque<Alert>,
}

pub struct Registry {
    inner: Mutex<RegistryInner>,
    store: Option<ConditionStore>,
    alert_capacity: usize,
}

impl Registry {
    /// Registry without durable storage.
    pub fn in_memory(alert_capacity: usize) -> Self {
        Self::with_conditions(Vec::new(), None, alert_capacity)
    }

    /// Registry backed by `store`, starting from whatever it holds.
    ///
    /// An unreadable file is logged and set aside; the registry then starts empty.
    pub fn open(store: ConditionStore, alert_capacity: usize) -> Self {
        let conditions = match store.load() {
            Ok(conditions) => {
                info!("Loaded {} conditions from {:?}", conditions.len(), store.path());
                conditions
            }
            Err(e) => {
                error!("Failed to load conditions from {:?}: {}", store.path(), e);
                match store.quarantine() {
                    Ok(moved) => warn!("Moved unreadable condition file to {:?}", moved),
                    Err(e) => warn!("Could not move unreadable condition file aside: {}", e),
                }
                Vec::new()
            }
        };
        Self::with_conditions(conditions, Some(store), alert_capacity)
    }

    fn with_conditions(conditions: Vec<Condition>, store: Option<ConditionStore>, alert_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                conditions,
                alerts: VecDeque::new(),
            }),
            store,
            alert_capacity: alert_capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write the condition list. Called with the lock held so writes never interleave.
    fn persist(&self, conditions: &[Condition]) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(conditions) {
                error!("Failed to save conditions to {:?}: {}", store.path(), e);
            }
        }
    }

    pub fn add_condition(&self, condition: Condition) {
        let mut inner = self.lock();
        info!("Added condition {} for {}: {}", condition.id, condition.owner_id, condition.description());
        inner.conditions.push(condition);
        self.persist(&inner.conditions);
    }

    /// Delete `id` if it belongs to `owner_id`. Anything else is a no-op.
    pub fn remove_condition(&self, id: &str, owner_id: &str) -> bool {
        let mut inner = self.lock();
        let before = inner.conditions.len();
        inner
            .conditions
            .retain(|c| !(c.id == id && c.owner_id == owner_id));
        let removed = inner.conditions.len() != before;
        if removed {
            self.persist(&inner.conditions);
        }
        removed
    }

    /// Enable or disable `id` if it belongs to `owner_id`.
    pub fn set_enabled(&self, id: &str, owner_id: &str, enabled: bool) -> bool {
        let mut inner = self.lock();
        let Some(condition) = inner
            .conditions
            .iter_mut()
            .find(|c| c.id == id && c.owner_id == owner_id)
        else {
            return false;
        };
        condition.enabled = enabled;
        self.persist(&inner.conditions);
        true
    }

    /// Conditions of one owner, or all of them for `None`.
    pub fn list_conditions(&self, owner_id: Option<&str>) -> Vec<Condition> {
        let inner = self.lock();
        inner
            .conditions
            .iter()
            .filter(|c| owner_id.map_or(true, |owner| c.owner_id == owner))
            .cloned()
            .collect()
    }

    /// Record a firing. `last_fired_at` never moves backwards.
    pub fn mark_fired(&self, id: &str, now: DateTime<Utc>) -> bool {
        let mut inner = self.lock();
        let Some(condition) = inner.conditions.iter_mut().find(|c| c.id == id) else {
            return false;
        };
        condition.last_fired_at = Some(match condition.last_fired_at {
            Some(previous) if previous > now => previous,
            _ => now,
        });
        self.persist(&inner.conditions);
        true
    }

    pub fn add_alert(&self, alert: Alert) {
        let mut inner = self.lock();
        inner.alerts.push_back(alert);
        while inner.alerts.len() > self.alert_capacity {
            inner.alerts.pop_front();
        }
    }

    /// Most recent `limit` alerts (oldest first), optionally for one owner.
    pub fn list_alerts(&self, owner_id: Option<&str>, limit: usize) -> Vec<Alert> {
        let inner = self.lock();
        let matching: Vec<&Alert> = inner
            .alerts
            .iter()
            .filter(|a| owner_id.map_or(true, |owner| a.owner_id == owner))
            .collect();
        let skip = matching.len().saturating_sub(limit);
        matching.into_iter().skip(skip).cloned().collect()
    }
}
