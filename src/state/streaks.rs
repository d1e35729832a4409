//! Guest streak ledger: completed work sessions per calendar day

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::storage::KeyValueStore;

/// Storage key of the ledger
pub const GUEST_DATA_KEY: &str = "pomodoro-guest-data";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Streak {
    pub date: NaiveDate,
    pub sessions: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakLedger {
    #[serde(default)]
    pub streaks: Vec<Streak>,
}

impl StreakLedger {
    /// Read the ledger, treating a malformed value as empty
    pub fn load(store: &dyn KeyValueStore) -> Self {
        let Some(raw) = store.get(GUEST_DATA_KEY) else {
            return Self::default();
        };
        match serde_json::from_str::<Self>(&raw) {
            Ok(mut ledger) => {
                ledger.streaks.sort_by_key(|s| s.date);
                ledger
            }
            Err(e) => {
                debug!("Discarding malformed streak ledger: {}", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, store: &dyn KeyValueStore) {
        let result = serde_json::to_string(self)
            .map_err(anyhow::Error::from)
            .and_then(|json| store.set(GUEST_DATA_KEY, &json));
        if let Err(e) = result {
            warn!("Failed to save streak ledger: {:#}", e);
        }
    }

    /// Set the session count for `date`, replacing any earlier entry
    pub fn record(&mut self, date: NaiveDate, sessions: u32) {
        match self.streaks.binary_search_by_key(&date, |s| s.date) {
            Ok(idx) => self.streaks[idx].sessions = sessions,
            Err(idx) => self.streaks.insert(idx, Streak { date, sessions }),
        }
    }

    pub fn get(&self, date: NaiveDate) -> Option<Streak> {
        self.streaks.iter().copied().find(|s| s.date == date)
    }

    /// Consecutive active days ending today, or yesterday when today has
    /// no sessions yet
    pub fn current_streak(&self, today: NaiveDate) -> u32 {
        let active = |date: NaiveDate| self.get(date).is_some_and(|s| s.sessions > 0);

        let mut cursor = if active(today) {
            today
        } else {
            match today.pred_opt() {
                Some(yesterday) => yesterday,
                None => return 0,
            }
        };

        let mut days = 0;
        while active(cursor) {
            days += 1;
            match cursor.pred_opt() {
                Some(prev) => cursor = prev,
                None => break,
            }
        }
        days
    }
}
