//! Alert delivery.
//!
//! The dispatcher resolves an owner to a delivery target, renders the
//! message and hands it to a [`Transport`]. Whatever happens, the result
//! is an [`Alert`]; delivery problems never escape as errors.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{error, info, warn};

use super::alerts::model::{Alert, Condition};
use super::error::Result;
use super::model::{Category, Distribution, Roll};

/// Number of recent rolls summarised in a notification.
pub const SUMMARY_WINDOW: usize = 100;

/// Looks up where an owner wants alerts delivered.
pub trait TargetResolver: Send + Sync {
    /// `None` means the owner has no delivery target configured.
    fn resolve_target(&self, owner_id: &str) -> Option<String>;
}

/// Outcome of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: bool,
    pub error: Option<String>,
}

impl Delivery {
    pub fn sent() -> Self {
        Self {
            delivered: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            delivered: false,
            error: Some(error.into()),
        }
    }
}

/// Outbound message channel (email, chat DM, ...).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, target: &str, message: &str) -> Delivery;
}

/// Owner → target map read from a JSON object file, e.g.
/// `{"alice@example.com": "123456789"}`.
///
/// The file is re-read on every lookup so edits apply without a restart.
pub struct TargetDirectory {
    path: PathBuf,
}

impl TargetDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl TargetResolver for TargetDirectory {
    fn resolve_target(&self, owner_id: &str) -> Option<String> {
        let targets = match self.load() {
            Ok(targets) => targets,
            Err(e) => {
                error!("Failed to read delivery targets from {:?}: {}", self.path, e);
                return None;
            }
        };
        targets
            .get(owner_id.trim())
            .map(|target| target.trim().to_string())
            .filter(|target| !target.is_empty())
    }
}

/// Transport that only writes the message to the log.
pub struct LogTransport;

#[async_trait]
impl Transport for LogTransport {
    async fn send(&self, target: &str, message: &str) -> Delivery {
        info!("Notification for {}:\n{}", target, message);
        Delivery::sent()
    }
}

/// Bounds another transport's `send` so a hung delivery cannot stall polling.
pub struct TimeoutTransport<T> {
    inner: T,
    timeout: Duration,
}

impl<T: Transport> TimeoutTransport<T> {
    pub fn new(inner: T, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl<T: Transport> Transport for TimeoutTransport<T> {
    async fn send(&self, target: &str, message: &str) -> Delivery {
        match tokio::time::timeout(self.timeout, self.inner.send(target, message)).await {
            Ok(delivery) => delivery,
            Err(_) => Delivery::failed(format!(
                "delivery timed out after {}s",
                self.timeout.as_secs_f64()
            )),
        }
    }
}

/// Subject plus category distribution of the last `SUMMARY_WINDOW` rolls.
pub fn render_message(condition: &Condition, window: &[Roll]) -> String {
    let recent = &window[window.len().saturating_sub(SUMMARY_WINDOW)..];
    let dist = Distribution::from_rolls(recent);

    let mut message = format!("Alert: {}\n\n", condition.description());
    message.push_str(&format!("Current distribution (last {} rolls)\n", dist.total()));
    for category in Category::all() {
        message.push_str(&format!(
            "  {} ({}): {}\n",
            category.display_name(),
            category.code(),
            dist.count(*category)
        ));
    }
    message.push_str(&format!(
        "\nCooldown: {} min before the next alert for this condition.",
        condition.cooldown_minutes
    ));
    message
}

pub struct Dispatcher {
    resolver: Arc<dyn TargetResolver>,
    transport: Arc<dyn Transport>,
}

impl Dispatcher {
    pub fn new(resolver: Arc<dyn TargetResolver>, transport: Arc<dyn Transport>) -> Self {
        Self {
            resolver,
            transport,
        }
    }

    /// Deliver a notification for `condition` and describe the attempt as an Alert.
    pub async fn dispatch(
        &self,
        condition: &Condition,
        owner_id: &str,
        window: &[Roll],
        fired_at: DateTime<Utc>,
    ) -> Alert {
        let Some(target) = self.resolver.resolve_target(owner_id) else {
            warn!("No delivery target for {}, skipping notification", owner_id);
            return Alert::new(
                condition,
                fired_at,
                false,
                Some(format!("No delivery target configured for {owner_id}")),
            );
        };

        let message = render_message(condition, window);
        let delivery = self.transport.send(&target, &message).await;
        if delivery.delivered {
            info!("Alert sent to {}: {}", target, condition.description());
        } else {
            error!(
                "Failed to deliver alert to {}: {}",
                target,
                delivery.error.as_deref().unwrap_or("unknown error")
            );
        }

        let error = match (delivery.delivered, delivery.error) {
            (false, None) => Some("transport reported failure".to_string()),
            (_, error) => error,
        };
        Alert::new(condition, fired_at, delivery.delivered, error)
    }
}
