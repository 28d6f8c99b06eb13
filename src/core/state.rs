use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use super::model::{Distribution, Roll};

/// Default number of rolls kept in memory.
pub const DEFAULT_ROLL_CAPACITY: usize = 200;

/// Lifecycle of the ingestion loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchState {
    #[default]
    Stopped,
    Starting,
    Running,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScraperStatus {
    pub state: WatchState,
    pub last_error: Option<String>,
}

struct FeedInner {
    rolls: VecDeque<Roll>,
    /// Highest index ever accepted. `None` until the first batch seeds the store.
    last_index: Option<u64>,
    status: ScraperStatus,
}

/// Bounded, index-ordered roll history plus the ingestion status cell.
///
/// Both live behind one lock; conditions and alerts use a separate one
/// (see `Registry`).
pub struct RollStore {
    inner: Mutex<FeedInner>,
    capacity: usize,
}

impl RollStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(FeedInner {
                rolls: VecDeque::with_capacity(capacity),
                last_index: None,
                status: ScraperStatus::default(),
            }),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FeedInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Accepts every candidate whose index is above the high-water mark, in
    /// ascending index order, and returns the accepted rolls.
    ///
    /// The very first batch seeds the store: with no high-water mark yet,
    /// any index (including 0) is accepted. Duplicates inside a batch are
    /// dropped either way.
    pub fn append(&self, mut candidates: Vec<Roll>) -> Vec<Roll> {
        candidates.sort_by_key(|roll| roll.index);

        let mut inner = self.lock();
        let mut accepted = Vec::new();
        for roll in candidates {
            if inner.last_index.is_some_and(|last| roll.index <= last) {
                continue;
            }
            inner.last_index = Some(roll.index);
            inner.rolls.push_back(roll.clone());
            accepted.push(roll);
        }

        while inner.rolls.len() > self.capacity {
            inner.rolls.pop_front();
        }

        accepted
    }

    /// Last `n` rolls in arrival order. `n` is clamped to what is stored.
    pub fn query(&self, n: usize) -> Vec<Roll> {
        let inner = self.lock();
        let skip = inner.rolls.len().saturating_sub(n);
        inner.rolls.iter().skip(skip).cloned().collect()
    }

    pub fn distribution(&self, n: usize) -> Distribution {
        Distribution::from_rolls(&self.query(n))
    }

    /// Highest accepted index, or 0 before anything was seeded.
    pub fn latest_index(&self) -> u64 {
        self.lock().last_index.unwrap_or(0)
    }

    /// Dedup mark for the next `append`; `None` until the first batch.
    pub fn high_water_mark(&self) -> Option<u64> {
        self.lock().last_index
    }

    pub fn is_seeded(&self) -> bool {
        self.high_water_mark().is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().rolls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().rolls.is_empty()
    }

    pub fn status(&self) -> ScraperStatus {
        self.lock().status.clone()
    }

    /// Only the ingestion loop writes the status.
    pub(crate) fn set_status(&self, state: WatchState, error: Option<String>) {
        let mut inner = self.lock();
        inner.status = ScraperStatus {
            state,
            last_error: error,
        };
    }
}

impl Default for RollStore {
    fn default() -> Self {
        Self::new(DEFAULT_ROLL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Category;
    use std::sync::Arc;
    use std::thread;

    fn rolls(range: std::ops::RangeInclusive<u64>) -> Vec<Roll> {
        range.map(|i| Roll::new(i, Category::A)).collect()
    }

    fn indices(rolls: &[Roll]) -> Vec<u64> {
        rolls.iter().map(|r| r.index).collect()
    }

    #[test]
    fn test_first_batch_seeds_store() {
        let store = RollStore::default();
        assert!(!store.is_seeded());

        let accepted = store.append(rolls(0..=9));
        assert_eq!(accepted.len(), 10);
        assert_eq!(store.latest_index(), 9);
        assert!(store.is_seeded());
    }

    #[test]
    fn test_redelivery_is_idempotent() {
        let store = RollStore::default();
        store.append(rolls(1..=10));

        let accepted = store.append(rolls(1..=10));
        assert!(accepted.is_empty());
        assert_eq!(store.len(), 10);

        let accepted = store.append(rolls(5..=12));
        assert_eq!(indices(&accepted), vec![11, 12]);
    }

    #[test]
    fn test_out_of_order_candidates_are_sorted_and_deduped() {
        let store = RollStore::default();
        store.append(rolls(1..=3));

        let batch = vec![
            Roll::new(6, Category::B),
            Roll::new(4, Category::A),
            Roll::new(6, Category::C),
            Roll::new(2, Category::A),
            Roll::new(5, Category::B),
        ];
        let accepted = store.append(batch);
        assert_eq!(indices(&accepted), vec![4, 5, 6]);

        let all = store.query(usize::MAX);
        assert!(all.windows(2).all(|w| w[0].index < w[1].index));
    }

    #[test]
    fn test_capacity_keeps_most_recent() {
        let store = RollStore::default();
        for i in 1..=250 {
            store.append(vec![Roll::new(i, Category::A)]);
        }
        assert_eq!(store.len(), 200);

        for n in [1, 50, 200] {
            let window = store.query(n);
            assert_eq!(window.len(), n);
            assert_eq!(window.last().unwrap().index, 250);
            assert_eq!(window.first().unwrap().index, 251 - n as u64);
        }
        assert_eq!(store.query(1000).first().unwrap().index, 51);
    }

    #[test]
    fn test_query_clamps_to_available() {
        let store = RollStore::default();
        assert!(store.query(10).is_empty());
        store.append(rolls(1..=3));
        assert_eq!(indices(&store.query(10)), vec![1, 2, 3]);
    }

    #[test]
    fn test_status_roundtrip() {
        let store = RollStore::default();
        assert_eq!(store.status().state, WatchState::Stopped);

        store.set_status(WatchState::Error, Some("connection refused".to_string()));
        let status = store.status();
        assert_eq!(status.state, WatchState::Error);
        assert_eq!(status.last_error.as_deref(), Some("connection refused"));

        store.set_status(WatchState::Running, None);
        assert!(store.status().last_error.is_none());
    }

    #[test]
    fn test_concurrent_appends_keep_order() {
        let store = Arc::new(RollStore::new(500));

        let writers: Vec<_> = (1..=4u64)
            .map(|writer| {
                let store = store.clone();
                thread::spawn(move || {
                    // Every batch starts at 1, like a page that always shows its full history
                    for step in 1..=10u64 {
                        store.append(rolls(1..=writer * step * 5));
                        let seen = store.query(usize::MAX);
                        assert!(seen.windows(2).all(|w| w[0].index < w[1].index));
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        assert_eq!(store.latest_index(), 200);
        assert_eq!(indices(&store.query(usize::MAX)), (1..=200).collect::<Vec<_>>());
    }
}
