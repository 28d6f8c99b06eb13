use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use tokio::sync::watch;

use super::alerts::engine::firing_conditions;
use super::alerts::model::Alert;
use super::error::{Result, WatchError};
use super::notify::Dispatcher;
use super::registry::Registry;
use super::source::RollSource;
use super::state::{RollStore, WatchState};
use super::watcher::RollWatcher;

/// Rolls handed to condition evaluation unless configured otherwise.
pub const DEFAULT_EVALUATION_WINDOW: usize = 100;

#[derive(Debug, Clone, Copy)]
pub struct CoordinatorConfig {
    pub poll_interval: Duration,
    pub reconnect_backoff: Duration,
    /// Rolls handed to condition evaluation
    pub evaluation_window: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(15),
            reconnect_backoff: Duration::from_secs(30),
            evaluation_window: DEFAULT_EVALUATION_WINDOW,
        }
    }
}

#[derive(Debug, Default)]
pub struct TickOutput {
    /// Rolls newly accepted into the store
    pub accepted: usize,
    pub alerts: Vec<Alert>,
}

enum SessionEnd {
    Shutdown,
    Lost(WatchError),
}

/// The ingestion loop: polls the source, feeds the store, fires conditions.
pub struct Coordinator {
    source: Box<dyn RollSource>,
    store: Arc<RollStore>,
    registry: Arc<Registry>,
    dispatcher: Dispatcher,
    config: CoordinatorConfig,
}

impl Coordinator {
    pub fn new(
        source: Box<dyn RollSource>,
        store: Arc<RollStore>,
        registry: Arc<Registry>,
        dispatcher: Dispatcher,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            source,
            store,
            registry,
            dispatcher,
            config,
        }
    }

    /// One poll: read candidates, append, evaluate if anything was accepted.
    pub async fn tick(&self, watcher: &mut RollWatcher) -> Result<TickOutput> {
        let seeding = !self.store.is_seeded();
        let Some(candidates) = watcher.read_rolls(self.store.high_water_mark()).await? else {
            return Ok(TickOutput::default());
        };

        let accepted = self.store.append(candidates);
        if accepted.is_empty() {
            return Ok(TickOutput::default());
        }

        if seeding {
            info!("Seeded {} historical rolls", accepted.len());
        } else {
            info!(
                "Added {} new rolls (latest index: {})",
                accepted.len(),
                self.store.latest_index()
            );
        }

        let alerts = self.evaluate_conditions(Utc::now()).await;
        Ok(TickOutput {
            accepted: accepted.len(),
            alerts,
        })
    }

    /// Fire every eligible condition against the current window.
    ///
    /// A condition is marked fired whether or not delivery worked, so a
    /// failed notification still waits out its cooldown.
    pub async fn evaluate_conditions(&self, now: DateTime<Utc>) -> Vec<Alert> {
        let window = self.store.query(self.config.evaluation_window);
        let conditions = self.registry.list_conditions(None);

        let mut alerts = Vec::new();
        for condition in firing_conditions(&conditions, &window, now) {
            info!(
                "Condition triggered: {} (owner: {})",
                condition.description(),
                condition.owner_id
            );
            let alert = self
                .dispatcher
                .dispatch(&condition, &condition.owner_id, &window, now)
                .await;
            self.registry.mark_fired(&condition.id, now);
            self.registry.add_alert(alert.clone());
            alerts.push(alert);
        }
        alerts
    }

    /// Runs until `shutdown` flips to true (or its sender is dropped).
    ///
    /// Connect failures and lost sessions go to `Error`, wait out the backoff
    /// and reconnect; errors inside a tick are logged and polling continues.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if shutdown_requested(&shutdown) {
                break;
            }

            info!("Connecting to roll source");
            self.store.set_status(WatchState::Starting, None);

            let connected = self.source.connect().await;
            let failure = match connected {
                Ok(session) => {
                    self.store.set_status(WatchState::Running, None);
                    let mut watcher = RollWatcher::new(session);
                    let end = self.poll_session(&mut watcher, &mut shutdown).await;
                    watcher.close().await;
                    match end {
                        SessionEnd::Shutdown => break,
                        SessionEnd::Lost(e) => e,
                    }
                }
                Err(e) => e,
            };

            error!(
                "Roll source failed, restarting in {}s: {}",
                self.config.reconnect_backoff.as_secs(),
                failure
            );
            self.store
                .set_status(WatchState::Error, Some(failure.to_string()));

            if wait_or_shutdown(&mut shutdown, self.config.reconnect_backoff).await {
                break;
            }
        }

        info!("Roll watcher stopped");
        self.store.set_status(WatchState::Stopped, None);
    }

    async fn poll_session(
        &self,
        watcher: &mut RollWatcher,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        loop {
            match self.tick(watcher).await {
                Ok(_) => {}
                Err(WatchError::SourceUnavailable(reason)) => {
                    return SessionEnd::Lost(WatchError::SourceUnavailable(reason));
                }
                Err(e) => warn!("Error during poll: {}", e),
            }

            if wait_or_shutdown(shutdown, self.config.poll_interval).await {
                return SessionEnd::Shutdown;
            }
        }
    }
}

/// Sleeps for `period`; returns true if shutdown was requested meanwhile.
async fn wait_or_shutdown(shutdown: &mut watch::Receiver<bool>, period: Duration) -> bool {
    if shutdown_requested(shutdown) {
        return true;
    }
    let closed = tokio::select! {
        _ = tokio::time::sleep(period) => false,
        changed = shutdown.changed() => changed.is_err(),
    };
    closed || shutdown_requested(shutdown)
}

fn shutdown_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}
