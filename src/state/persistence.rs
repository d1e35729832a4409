//! Mirror of the timer into durable local storage
//!
//! The in-memory [`TimerState`] is the system of record. This module only
//! writes the fields recovery needs under fixed keys, and reads them back
//! as an all-optional [`PersistedSnapshot`].

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{mode::TimerMode, timer_state::TimerState};
use crate::storage::KeyValueStore;

/// Keys of the timer mirror
pub mod keys {
    pub const END_TIME: &str = "pomodoroEndTime";
    pub const MODE: &str = "pomodoroMode";
    pub const IS_RUNNING: &str = "pomodoroIsRunning";
    pub const START_TIME: &str = "pomodoroStartTime";
    pub const TIME_LEFT: &str = "pomodoroTimeLeft";
    pub const PAUSED_AT: &str = "pomodoroPausedAt";
    /// The daily counter, written by the store itself
    pub const COUNTER: &str = "pomodoro-timer-store";
}

/// Timer fields as read back from storage. Unparseable values are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedSnapshot {
    pub mode: Option<TimerMode>,
    pub is_running: bool,
    pub end_timestamp: Option<i64>,
    pub start_timestamp: Option<i64>,
    pub time_left: Option<u32>,
    pub paused_at: Option<u32>,
}

/// Daily counter record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterRecord {
    pub completed_count: u32,
    pub last_session_date: Option<NaiveDate>,
}

/// Writes and reads the timer mirror in a [`KeyValueStore`]
#[derive(Clone)]
pub struct PersistenceBridge {
    store: Arc<dyn KeyValueStore>,
}

impl PersistenceBridge {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Mirror `state` into storage
    ///
    /// Running timers record their expected end so recovery can rebuild the
    /// countdown. Stopped timers drop the running markers and keep the
    /// paused snapshot only while one exists.
    pub fn mirror(&self, state: &TimerState) {
        let mut changes = vec![
            (keys::MODE, Some(state.mode.as_str().to_string())),
            (keys::TIME_LEFT, Some(state.remaining_seconds.to_string())),
        ];

        match (state.end_timestamp(), state.start_timestamp) {
            (Some(end), Some(start)) => changes.extend([
                (keys::IS_RUNNING, Some("true".to_string())),
                (keys::END_TIME, Some(end.to_string())),
                (keys::START_TIME, Some(start.to_string())),
                (keys::PAUSED_AT, None),
            ]),
            _ => changes.extend([
                (keys::IS_RUNNING, Some("false".to_string())),
                (keys::END_TIME, None),
                (keys::START_TIME, None),
                (keys::PAUSED_AT, state.paused_remaining.map(|p| p.to_string())),
            ]),
        }

        if let Err(e) = self.store.apply(&changes) {
            warn!("Failed to persist timer mirror: {:#}", e);
        }
    }

    /// Read the mirror back
    pub fn load(&self) -> PersistedSnapshot {
        PersistedSnapshot {
            mode: self.parsed(keys::MODE),
            is_running: self.store.get(keys::IS_RUNNING).as_deref() == Some("true"),
            end_timestamp: self.parsed(keys::END_TIME),
            start_timestamp: self.parsed(keys::START_TIME),
            time_left: self.parsed(keys::TIME_LEFT),
            paused_at: self.parsed(keys::PAUSED_AT),
        }
    }

    pub fn save_counter(&self, state: &TimerState) {
        let record = CounterRecord {
            completed_count: state.completed_count,
            last_session_date: state.last_session_date,
        };
        match serde_json::to_string(&record) {
            Ok(json) => self.set(keys::COUNTER, &json),
            Err(e) => warn!("Failed to serialize counter record: {}", e),
        }
    }

    pub fn load_counter(&self) -> CounterRecord {
        let Some(raw) = self.store.get(keys::COUNTER) else {
            return CounterRecord::default();
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            debug!("Discarding malformed counter record: {}", e);
            CounterRecord::default()
        })
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        let raw = self.store.get(key)?;
        let value = raw.trim().parse().ok();
        if value.is_none() {
            debug!("Discarding malformed value for {}: {:?}", key, raw);
        }
        value
    }

    fn set(&self, key: &str, value: &str) {
        if let Err(e) = self.store.set(key, value) {
            warn!("Failed to persist {}: {:#}", key, e);
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const T0: i64 = 1_760_000_000_000;

    fn bridge() -> (Arc<MemoryStore>, PersistenceBridge) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), PersistenceBridge::new(store))
    }

    #[test]
    fn running_state_writes_end_time() {
        let (store, bridge) = bridge();
        let mut state = TimerState::new();
        state.start(T0);
        store.set(keys::PAUSED_AT, "12").unwrap();

        bridge.mirror(&state);

        assert_eq!(store.get(keys::IS_RUNNING).as_deref(), Some("true"));
        assert_eq!(store.get(keys::END_TIME), Some((T0 + 1_500_000).to_string()));
        assert_eq!(store.get(keys::START_TIME), Some(T0.to_string()));
        assert_eq!(store.get(keys::MODE).as_deref(), Some("work"));
        assert!(store.get(keys::PAUSED_AT).is_none());
    }

    /// Counts how the bridge reaches the store
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        batches: AtomicUsize,
        single_writes: AtomicUsize,
    }

    impl KeyValueStore for CountingStore {
        fn get(&self, key: &str) -> Option<String> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
            self.single_writes.fetch_add(1, Ordering::SeqCst);
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> anyhow::Result<()> {
            self.single_writes.fetch_add(1, Ordering::SeqCst);
            self.inner.remove(key)
        }

        fn apply(&self, changes: &[(&str, Option<String>)]) -> anyhow::Result<()> {
            self.batches.fetch_add(1, Ordering::SeqCst);
            self.inner.apply(changes)
        }
    }

    #[test]
    fn mirror_is_a_single_batch() {
        let store = Arc::new(CountingStore::default());
        let bridge = PersistenceBridge::new(store.clone());
        let mut state = TimerState::new();
        state.start(T0);
        bridge.mirror(&state);
        state.pause(T0 + 10_000);
        bridge.mirror(&state);

        assert_eq!(store.batches.load(Ordering::SeqCst), 2);
        assert_eq!(store.single_writes.load(Ordering::SeqCst), 0);
        assert_eq!(store.get(keys::PAUSED_AT).as_deref(), Some("1490"));
    }

    #[test]
    fn paused_state_clears_running_markers() {
        let (store, bridge) = bridge();
        let mut state = TimerState::new();
        state.start(T0);
        bridge.mirror(&state);
        state.pause(T0 + 10_000);
        bridge.mirror(&state);

        assert_eq!(store.get(keys::IS_RUNNING).as_deref(), Some("false"));
        assert_eq!(store.get(keys::PAUSED_AT).as_deref(), Some("1490"));
        assert_eq!(store.get(keys::TIME_LEFT).as_deref(), Some("1490"));
        assert!(store.get(keys::END_TIME).is_none());
        assert!(store.get(keys::START_TIME).is_none());
    }

    #[test]
    fn reset_state_has_no_paused_snapshot() {
        let (store, bridge) = bridge();
        let mut state = TimerState::new();
        state.start(T0);
        state.pause(T0 + 1_000);
        bridge.mirror(&state);
        state.reset();
        bridge.mirror(&state);

        assert!(store.get(keys::PAUSED_AT).is_none());
        assert_eq!(store.get(keys::TIME_LEFT).as_deref(), Some("1500"));
    }

    #[test]
    fn load_treats_garbage_as_absent() {
        let (store, bridge) = bridge();
        store.set(keys::MODE, "siesta").unwrap();
        store.set(keys::IS_RUNNING, "yes").unwrap();
        store.set(keys::END_TIME, "soon").unwrap();
        store.set(keys::TIME_LEFT, "-5").unwrap();
        store.set(keys::PAUSED_AT, "200").unwrap();

        let snapshot = bridge.load();
        assert_eq!(
            snapshot,
            PersistedSnapshot {
                paused_at: Some(200),
                ..PersistedSnapshot::default()
            }
        );
    }

    #[test]
    fn counter_round_trips_and_tolerates_garbage() {
        let (store, bridge) = bridge();
        let mut state = TimerState::new();
        state.increment_completed(NaiveDate::from_ymd_opt(2026, 10, 14).unwrap());
        bridge.save_counter(&state);

        let record = bridge.load_counter();
        assert_eq!(record.completed_count, 1);
        assert_eq!(record.last_session_date, state.last_session_date);

        store.set(keys::COUNTER, "[1,2").unwrap();
        assert_eq!(bridge.load_counter(), CounterRecord::default());
    }
}
