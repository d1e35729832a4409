//! Startup recovery of the timer from its persisted mirror

use tracing::{debug, info};

use super::{
    mode::{duration, TimerMode},
    persistence::{CounterRecord, PersistedSnapshot},
    timer_state::TimerState,
};

/// What recovery decided to restore
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovered {
    /// A countdown that was still running when the process went away
    Running { remaining: u32 },
    /// A paused snapshot
    Paused { remaining: u32 },
    /// A bare remaining value without a running or paused marker
    Remaining { remaining: u32 },
    /// Nothing usable, full duration of the mode
    Fresh,
}

impl Recovered {
    pub fn is_running(self) -> bool {
        matches!(self, Recovered::Running { .. })
    }
}

/// Rebuild a [`TimerState`] from the mirror and counter record at `now_ms`
///
/// A running countdown with more than a second left wins over a paused
/// snapshot, which wins over a bare remaining value. Anything malformed or
/// outside `1..=duration(mode)` is skipped, as is a running marker whose
/// recorded start can't belong to its end time.
pub fn recover(
    snapshot: &PersistedSnapshot,
    counter: &CounterRecord,
    now_ms: i64,
) -> (TimerState, Recovered) {
    let mut state = TimerState::new();
    state.completed_count = counter.completed_count;
    state.last_session_date = counter.last_session_date;

    let mode = snapshot.mode.unwrap_or(TimerMode::Work);
    state.set_mode(mode);
    let full = duration(mode);
    let in_range = |value: u32| (1..=full).contains(&value);

    if snapshot.is_running {
        match snapshot.end_timestamp {
            Some(end) if !segment_fits(snapshot.start_timestamp, end, full) => {
                debug!(
                    "Running marker ending at {} doesn't match start {:?}",
                    end, snapshot.start_timestamp
                );
            }
            Some(end) if end > now_ms => {
                let remaining_ms = end - now_ms;
                let remaining = u32::try_from((remaining_ms + 999) / 1000).unwrap_or(u32::MAX);
                if remaining > 1 && remaining <= full {
                    let elapsed = full - remaining;
                    let start = now_ms - i64::from(elapsed) * 1000;
                    state.resume_segment(start, full, now_ms);
                    info!("Recovering running {} timer with {}s remaining", mode, remaining);
                    return (state, Recovered::Running { remaining });
                }
                debug!("Running marker with {}s left is not recoverable", remaining);
            }
            Some(end) => debug!("Running marker expired at {}", end),
            None => debug!("Running marker without an end time"),
        }
    }

    if let Some(paused) = snapshot.paused_at {
        if in_range(paused) {
            state.restore_paused(paused);
            info!("Recovering paused {} timer with {}s remaining", mode, paused);
            return (state, Recovered::Paused { remaining: paused });
        }
        debug!("Discarding paused value {} outside 1..={}", paused, full);
    }

    if let Some(left) = snapshot.time_left {
        if in_range(left) {
            state.restore_remaining(left);
            info!("Recovering {} timer with {}s remaining", mode, left);
            return (state, Recovered::Remaining { remaining: left });
        }
        debug!("Discarding remaining value {} outside 1..={}", left, full);
    }

    (state, Recovered::Fresh)
}

/// A recorded start must precede `end` by at most one full mode duration
fn segment_fits(start: Option<i64>, end: i64, full: u32) -> bool {
    start.map_or(true, |start| start < end && end - start <= i64::from(full) * 1000)
}
