use log::{debug, warn};

use super::error::{Result, WatchError};
use super::model::{RawSnapshot, Roll};
use super::source::RollSession;

/// Wraps one source session and turns its snapshots into candidate rolls.
pub struct RollWatcher {
    session: Box<dyn RollSession>,
}

impl RollWatcher {
    pub fn new(session: Box<dyn RollSession>) -> Self {
        Self { session }
    }

    /// Polls the session for candidates newer than `latest_index`.
    ///
    /// `Ok(None)` means nothing to do this tick: the source is not ready, or
    /// its own index shows no new rolls. `latest_index` is `None` before the
    /// store has been seeded.
    pub async fn read_rolls(&mut self, latest_index: Option<u64>) -> Result<Option<Vec<Roll>>> {
        let Some(snapshot) = self.session.poll().await? else {
            warn!("Source not ready yet");
            return Ok(None);
        };

        if let Some(latest) = latest_index {
            if snapshot.index <= latest {
                debug!("No new rolls (source index {}, latest {})", snapshot.index, latest);
                return Ok(None);
            }
        }

        to_rolls(&snapshot).map(Some)
    }

    pub async fn close(&mut self) {
        self.session.close().await;
    }
}

/// Validates every roll of a snapshot. One bad roll rejects the snapshot.
pub fn to_rolls(snapshot: &RawSnapshot) -> Result<Vec<Roll>> {
    snapshot
        .rolls
        .iter()
        .map(|raw| {
            raw.coin
                .parse()
                .map(|category| Roll::new(raw.index, category))
                .map_err(|e| WatchError::MalformedRoll(format!("roll {}: {}", raw.index, e)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{Category, RawRoll};
    use async_trait::async_trait;
    use std::collections::VecDeque;

    struct QueuedSession(VecDeque<Option<RawSnapshot>>);

    #[async_trait]
    impl RollSession for QueuedSession {
        async fn poll(&mut self) -> Result<Option<RawSnapshot>> {
            Ok(self.0.pop_front().flatten())
        }
    }

    fn snapshot(index: u64, coins: &[(u64, &str)]) -> RawSnapshot {
        RawSnapshot {
            rolls: coins
                .iter()
                .map(|(i, c)| RawRoll {
                    index: *i,
                    coin: c.to_string(),
                })
                .collect(),
            index,
        }
    }

    #[tokio::test]
    async fn test_watcher_lifecycle() {
        let session = QueuedSession(VecDeque::from(vec![
            None,
            Some(snapshot(2, &[(1, "ct"), (2, "bonus")])),
            Some(snapshot(2, &[(1, "ct"), (2, "bonus")])),
        ]));
        let mut watcher = RollWatcher::new(Box::new(session));

        // 1. Source not ready
        assert!(watcher.read_rolls(None).await.unwrap().is_none());

        // 2. Seed batch
        let rolls = watcher.read_rolls(None).await.unwrap().unwrap();
        assert_eq!(rolls.len(), 2);
        assert_eq!(rolls[1].category, Category::C);

        // 3. Source index unchanged
        assert!(watcher.read_rolls(Some(2)).await.unwrap().is_none());
    }

    #[test]
    fn test_unknown_coin_rejects_snapshot() {
        let bad = snapshot(3, &[(1, "ct"), (2, "dice"), (3, "t")]);
        assert!(matches!(to_rolls(&bad), Err(WatchError::MalformedRoll(_))));
    }
}
