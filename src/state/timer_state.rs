//! Timer state structure and its transitions
//!
//! Every method here is a pure state transition. Time is passed in as
//! milliseconds since the epoch so the same inputs always yield the same
//! state. Persistence, notification and scheduling live in
//! [`AppState`](super::AppState).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::mode::{duration, TimerMode};

/// Pomodoro timer state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub mode: TimerMode,
    pub remaining_seconds: u32,
    pub is_running: bool,
    /// Start of the current run segment, ms since epoch
    pub start_timestamp: Option<i64>,
    /// Remaining seconds captured at the last pause
    pub paused_remaining: Option<u32>,
    pub completed_count: u32,
    pub last_session_date: Option<NaiveDate>,
    /// Remaining seconds when the current run segment started
    #[serde(skip)]
    run_base_seconds: u32,
}

impl TimerState {
    /// Create the first-load state: work mode, full duration, stopped
    pub fn new() -> Self {
        Self {
            mode: TimerMode::Work,
            remaining_seconds: duration(TimerMode::Work),
            is_running: false,
            start_timestamp: None,
            paused_remaining: None,
            completed_count: 0,
            last_session_date: None,
            run_base_seconds: 0,
        }
    }

    /// Switch mode and reload its full duration, stopping the timer
    pub fn set_mode(&mut self, mode: TimerMode) {
        self.mode = mode;
        self.remaining_seconds = duration(mode);
        self.clear_run();
    }

    /// Start or resume the countdown at `now_ms`
    ///
    /// Resumes from the paused snapshot when there is one, otherwise from
    /// the current remaining time. Starting while running changes nothing.
    pub fn start(&mut self, now_ms: i64) {
        if self.is_running {
            return;
        }

        let mut base = self
            .paused_remaining
            .take()
            .map_or(self.remaining_seconds, |paused| paused.min(self.remaining_seconds))
            .min(duration(self.mode));
        if base == 0 {
            base = duration(self.mode);
        }

        self.remaining_seconds = base;
        self.run_base_seconds = base;
        self.start_timestamp = Some(now_ms);
        self.is_running = true;
    }

    /// Pause at `now_ms`, capturing the remaining time. No-op when stopped.
    pub fn pause(&mut self, now_ms: i64) {
        if !self.is_running {
            return;
        }
        self.recompute(now_ms);
        self.paused_remaining = Some(self.remaining_seconds);
        self.is_running = false;
        self.start_timestamp = None;
    }

    /// Restore the full duration of the current mode and stop
    pub fn reset(&mut self) {
        self.remaining_seconds = duration(self.mode);
        self.clear_run();
    }

    /// Count a completed work session on `today`
    ///
    /// The first completion on a new calendar day starts the count at 1.
    pub fn increment_completed(&mut self, today: NaiveDate) {
        if self.last_session_date == Some(today) {
            self.completed_count += 1;
        } else {
            self.completed_count = 1;
        }
        self.last_session_date = Some(today);
    }

    /// Recompute remaining time from the run segment start
    ///
    /// Returns the new remaining seconds. Stopped timers are unchanged.
    pub fn recompute(&mut self, now_ms: i64) -> u32 {
        if let (true, Some(start)) = (self.is_running, self.start_timestamp) {
            let elapsed_secs = (now_ms - start).max(0) / 1000;
            let elapsed_secs = u32::try_from(elapsed_secs).unwrap_or(u32::MAX);
            self.remaining_seconds = self.run_base_seconds.saturating_sub(elapsed_secs);
        }
        self.remaining_seconds
    }

    /// Expected end of the current run, ms since epoch
    pub fn end_timestamp(&self) -> Option<i64> {
        match (self.is_running, self.start_timestamp) {
            (true, Some(start)) => Some(start + i64::from(self.run_base_seconds) * 1000),
            _ => None,
        }
    }

    /// Stop with remaining fixed at zero, used when a session finishes
    pub fn finish(&mut self) {
        self.remaining_seconds = 0;
        self.clear_run();
    }

    /// Put the timer into a running segment that began at `start_ms` with
    /// `base_seconds` left
    pub(crate) fn resume_segment(&mut self, start_ms: i64, base_seconds: u32, now_ms: i64) {
        let base = base_seconds.min(duration(self.mode));
        self.run_base_seconds = base;
        self.start_timestamp = Some(start_ms);
        self.paused_remaining = None;
        self.is_running = true;
        self.remaining_seconds = base;
        self.recompute(now_ms);
    }

    /// Restore a paused snapshot. Values outside `1..=duration` are ignored.
    pub(crate) fn restore_paused(&mut self, remaining: u32) {
        if (1..=duration(self.mode)).contains(&remaining) {
            self.clear_run();
            self.remaining_seconds = remaining;
            self.paused_remaining = Some(remaining);
        }
    }

    /// Restore a bare remaining value. Values outside `1..=duration` are ignored.
    pub(crate) fn restore_remaining(&mut self, remaining: u32) {
        if (1..=duration(self.mode)).contains(&remaining) {
            self.clear_run();
            self.remaining_seconds = remaining;
        }
    }

    fn clear_run(&mut self) {
        self.is_running = false;
        self.start_timestamp = None;
        self.paused_remaining = None;
        self.run_base_seconds = 0;
    }
}

impl Default for TimerState {
    fn default() -> Self {
        Self::new()
    }
}
