//! What happens when a countdown reaches zero

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{mode::TimerMode, timer_state::TimerState};

/// Work sessions per long break
pub const SESSIONS_PER_LONG_BREAK: u32 = 4;

/// Emitted once per finished countdown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub finished: TimerMode,
    pub next: TimerMode,
    pub completed_count: u32,
    pub date: NaiveDate,
    pub at: DateTime<Utc>,
}

impl CompletionEvent {
    pub fn message(&self) -> &'static str {
        match (self.finished, self.next) {
            (TimerMode::Work, TimerMode::LongBreak) => "Work done! Long break.",
            (TimerMode::Work, _) => "Work done! Short break.",
            _ => "Break over! Time to work.",
        }
    }
}

/// Mode that follows `finished`, given the counter after the increment
pub fn next_mode(finished: TimerMode, completed_count: u32) -> TimerMode {
    match finished {
        TimerMode::Work if completed_count > 0 && completed_count % SESSIONS_PER_LONG_BREAK == 0 => {
            TimerMode::LongBreak
        }
        TimerMode::Work => TimerMode::ShortBreak,
        TimerMode::ShortBreak | TimerMode::LongBreak => TimerMode::Work,
    }
}

/// Finish the current countdown and move to the next mode
///
/// Returns `None` unless the timer is running with nothing left. The event
/// is stamped with `now_ms`.
pub fn complete(state: &mut TimerState, today: NaiveDate, now_ms: i64) -> Option<CompletionEvent> {
    if !state.is_running || state.remaining_seconds > 0 {
        return None;
    }

    let finished = state.mode;
    state.finish();
    if finished == TimerMode::Work {
        state.increment_completed(today);
    }
    let next = next_mode(finished, state.completed_count);
    state.set_mode(next);

    Some(CompletionEvent {
        finished,
        next,
        completed_count: state.completed_count,
        date: today,
        at: DateTime::<Utc>::from_timestamp_millis(now_ms).unwrap_or_default(),
    })
}
