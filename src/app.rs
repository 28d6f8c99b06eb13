use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use env_logger::Builder;
use log::{error, info, LevelFilter};
use tokio::sync::watch;

use crate::core::{
    alerts::model::{Alert, Condition, NewCondition},
    alerts::store::ConditionStore,
    config::{ConfigManager, Settings},
    coordinator::Coordinator,
    error::Result,
    model::{Distribution, Roll},
    notify::{Dispatcher, LogTransport, TargetDirectory, TimeoutTransport},
    registry::{Registry, DEFAULT_ALERT_LIST_LIMIT},
    source::FeedSource,
    state::{RollStore, ScraperStatus},
};

#[derive(Parser, Debug)]
#[command(name = "roll-watcher")]
#[command(about = "Watches the roll history and alerts owners when their conditions hold", long_about = None)]
pub struct Cli {
    /// Directory holding settings.json; relative paths inside it resolve against it
    #[arg(env = "ROLL_WATCHER_CONFIG_DIR", default_value = ".")]
    pub config_dir: PathBuf,
}

/// Handle given to request handlers. One per process, built in [`AppState::new`].
#[derive(Clone)]
pub struct AppState {
    store: Arc<RollStore>,
    registry: Arc<Registry>,
}

impl AppState {
    pub fn new(settings: &Settings) -> Self {
        let store = Arc::new(RollStore::new(settings.roll_capacity));
        let registry = Arc::new(Registry::open(
            ConditionStore::new(&settings.data_dir),
            settings.alert_capacity,
        ));
        Self { store, registry }
    }

    pub fn add_condition(&self, request: NewCondition) -> Result<Condition> {
        let condition = request.build()?;
        self.registry.add_condition(condition.clone());
        Ok(condition)
    }

    pub fn remove_condition(&self, id: &str, owner_id: &str) -> bool {
        self.registry.remove_condition(id, owner_id)
    }

    pub fn set_condition_enabled(&self, id: &str, owner_id: &str, enabled: bool) -> bool {
        self.registry.set_enabled(id, owner_id, enabled)
    }

    pub fn conditions(&self, owner_id: &str) -> Vec<Condition> {
        self.registry.list_conditions(Some(owner_id))
    }

    /// Most recent alerts of `owner_id`, at most `limit` (default 50).
    pub fn alerts(&self, owner_id: &str, limit: Option<usize>) -> Vec<Alert> {
        self.registry
            .list_alerts(Some(owner_id), limit.unwrap_or(DEFAULT_ALERT_LIST_LIMIT))
    }

    pub fn recent_rolls(&self, n: usize) -> Vec<Roll> {
        self.store.query(n)
    }

    pub fn distribution(&self, n: usize) -> Distribution {
        self.store.distribution(n)
    }

    pub fn status(&self) -> ScraperStatus {
        self.store.status()
    }
}

fn init_logging() {
    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("roll_watcher", LevelFilter::Debug)
        .parse_default_env()
        .format(|buf, record| {
            let ts = chrono::Local::now().format("%H:%M:%S%.3f");
            writeln!(
                buf,
                "[{} {:<5} {}] {}",
                ts,
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr)
        .init();
}

/// Build the coordinator for `settings` around an existing state handle.
pub fn build_coordinator(settings: &Settings, state: &AppState) -> Coordinator {
    let resolver = Arc::new(TargetDirectory::new(&settings.targets_path));
    let transport = Arc::new(TimeoutTransport::new(LogTransport, settings.transport_timeout()));
    Coordinator::new(
        Box::new(FeedSource::new(&settings.feed_path)),
        state.store.clone(),
        state.registry.clone(),
        Dispatcher::new(resolver, transport),
        settings.coordinator_config(),
    )
}

pub async fn run() {
    let cli = Cli::parse();
    init_logging();

    let config_manager = ConfigManager::new(&cli.config_dir);
    let settings = config_manager.load().resolve_paths(&cli.config_dir);
    info!("Starting roll watcher, config {:?}", config_manager.path());
    info!("Watching feed {:?}", settings.feed_path);

    let state = AppState::new(&settings);
    let coordinator = build_coordinator(&settings, &state);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let watcher_handle = tokio::spawn(coordinator.run(shutdown_rx));

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down");
    let _ = shutdown_tx.send(true);

    if let Err(e) = watcher_handle.await {
        error!("Roll watcher task failed: {}", e);
    }
    let status = state.status();
    info!("Shutdown complete (watcher {:?})", status.state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alerts::model::ConditionKind;
    use clap::CommandFactory;
    use crate::core::model::Category;
    use crate::core::state::WatchState;
    use std::fs;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::tempdir;

    fn settings_in(dir: &Path) -> Settings {
        Settings {
            poll_interval_seconds: 1,
            reconnect_backoff_seconds: 1,
            ..Settings::default()
        }
        .resolve_paths(dir)
    }

    #[test]
    fn test_condition_requests_are_owner_scoped() {
        let dir = tempdir().unwrap();
        let state = AppState::new(&settings_in(dir.path()));

        let cond = state
            .add_condition(NewCondition::new("alice", Category::A, ConditionKind::Consecutive, 5))
            .unwrap();
        assert!(state
            .add_condition(NewCondition::new("alice", Category::A, ConditionKind::Consecutive, 0))
            .is_err());

        assert_eq!(state.conditions("alice").len(), 1);
        assert!(state.conditions("bob").is_empty());
        assert!(!state.remove_condition(&cond.id, "bob"));
        assert!(!state.set_condition_enabled(&cond.id, "bob", false));
        assert!(state.set_condition_enabled(&cond.id, "alice", false));
        assert!(state.remove_condition(&cond.id, "alice"));
    }

    #[test]
    fn test_cli_config_dir() {
        Cli::command().debug_assert();
        let cli = Cli::try_parse_from(["roll-watcher", "/etc/roll-watcher"]).unwrap();
        assert_eq!(cli.config_dir, PathBuf::from("/etc/roll-watcher"));
        assert!(Cli::try_parse_from(["roll-watcher", "a", "b"]).is_err());
    }

    #[test]
    fn test_alert_listing_defaults_to_fifty() {
        let dir = tempdir().unwrap();
        let state = AppState::new(&settings_in(dir.path()));
        let cond = state
            .add_condition(NewCondition::new("alice", Category::B, ConditionKind::Consecutive, 3))
            .unwrap();
        let now = chrono::Utc::now();
        for i in 0..60 {
            state
                .registry
                .add_alert(Alert::new(&cond, now + chrono::Duration::seconds(i), true, None));
        }

        let latest = state.alerts("alice", None);
        assert_eq!(latest.len(), DEFAULT_ALERT_LIST_LIMIT);
        assert_eq!(latest[49].fired_at, now + chrono::Duration::seconds(59));
        assert_eq!(state.alerts("alice", Some(5)).len(), 5);
        assert!(state.alerts("bob", None).is_empty());
    }

    #[tokio::test]
    async fn test_end_to_end_feed_to_alert() {
        let dir = tempdir().unwrap();
        let settings = settings_in(dir.path());
        fs::create_dir_all(&settings.data_dir).unwrap();
        fs::write(&settings.targets_path, r#"{"alice": "dm-1"}"#).unwrap();

        let rolls: Vec<String> = (1..=20)
            .map(|i| format!(r#"{{"index":{},"coin":"ct"}}"#, i))
            .collect();
        fs::write(
            &settings.feed_path,
            format!("{{\"rolls\":[{}],\"index\":20}}\n", rolls.join(",")),
        )
        .unwrap();

        let state = AppState::new(&settings);
        state
            .add_condition(NewCondition::new("alice", Category::C, ConditionKind::AbsentStreak, 20))
            .unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(build_coordinator(&settings, &state).run(shutdown_rx));

        let watching = state.clone();
        tokio::time::timeout(Duration::from_secs(5), async move {
            while watching.alerts("alice", None).is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("no alert fired");

        let alerts = state.alerts("alice", None);
        assert!(alerts[0].delivered);
        assert_eq!(alerts[0].description, "Green absent for 20 consecutive rolls");
        assert_eq!(state.recent_rolls(100).len(), 20);
        assert_eq!(state.distribution(100).count(Category::A), 20);
        assert_eq!(state.status().state, WatchState::Running);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        assert_eq!(state.status().state, WatchState::Stopped);

        // The firing survived in the condition file
        let reloaded = ConditionStore::new(&settings.data_dir).load().unwrap();
        assert!(reloaded[0].last_fired_at.is_some());
    }
}
