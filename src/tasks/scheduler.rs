//! Visibility-aware countdown scheduler
//!
//! Two tasks drive recomputation while the timer runs. The coarse probe
//! ticks once a second and only works while the client is hidden. The frame
//! loop ticks at display rate while the client is visible and parks on the
//! visibility channel otherwise. Both share one active flag and are always
//! torn down together.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use tokio::{
    runtime::Handle,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, error, warn};

use crate::state::{AppState, TickOutcome};

/// Period of the background probe
pub const COARSE_PROBE_INTERVAL: Duration = Duration::from_secs(1);
/// Period of the foreground loop, one frame at 60 Hz
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

struct Armed {
    active: Arc<AtomicBool>,
    coarse: JoinHandle<()>,
    frame: JoinHandle<()>,
}

/// Owner of the two countdown tasks
#[derive(Default)]
pub struct Scheduler {
    armed: Mutex<Option<Armed>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm both loops for `state`. Returns false when nothing was spawned.
    ///
    /// Already armed loops are left alone, and leftovers of a disarmed pair
    /// are aborted before the new pair is spawned. Outside a tokio runtime
    /// the loops can't be spawned, and ticks have to be driven by the caller.
    pub fn start(&self, state: &Arc<AppState>) -> bool {
        let mut armed = self.armed.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(stale) = armed.as_ref() {
            if stale.active.load(Ordering::SeqCst) {
                return false;
            }
            stale.coarse.abort();
            stale.frame.abort();
        }

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No tokio runtime, countdown loops not armed");
                return false;
            }
        };

        let active = Arc::new(AtomicBool::new(true));
        let coarse = handle.spawn(coarse_probe(Arc::clone(state), Arc::clone(&active)));
        let frame = handle.spawn(frame_loop(Arc::clone(state), Arc::clone(&active)));
        *armed = Some(Armed {
            active,
            coarse,
            frame,
        });
        debug!("Countdown loops armed");
        true
    }

    /// Disarm both loops. Returns false when they weren't armed.
    pub fn stop(&self) -> bool {
        let guard = self.armed.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(armed) if armed.active.swap(false, Ordering::SeqCst) => {
                armed.coarse.abort();
                armed.frame.abort();
                debug!("Countdown loops disarmed");
                true
            }
            _ => false,
        }
    }

    /// Disarm the pair sharing `active`, unless it was already replaced
    fn disarm(&self, active: &Arc<AtomicBool>) {
        let guard = self.armed.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(armed) = guard.as_ref().filter(|a| Arc::ptr_eq(&a.active, active)) {
            if armed.active.swap(false, Ordering::SeqCst) {
                armed.coarse.abort();
                armed.frame.abort();
                debug!("Countdown loops disarmed on a stopped timer");
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|a| a.active.load(Ordering::SeqCst))
    }

    /// True once both tasks have exited, or when none were ever spawned
    pub fn is_idle(&self) -> bool {
        self.armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(true, |a| a.coarse.is_finished() && a.frame.is_finished())
    }
}

/// Recompute once. Returns true when the loop should exit.
///
/// A loop that finds the timer stopped disarms both loops, so the next
/// start arms a fresh pair.
fn drive(state: &AppState, active: &Arc<AtomicBool>, source: &str) -> bool {
    if !active.load(Ordering::SeqCst) {
        return true;
    }
    match state.tick() {
        Ok(TickOutcome::Running(_)) => false,
        Ok(TickOutcome::Completed(event)) => {
            debug!("{} observed completion of {}", source, event.finished);
            state.scheduler().disarm(active);
            true
        }
        Ok(TickOutcome::Idle) => {
            debug!("{} found the timer stopped", source);
            state.scheduler().disarm(active);
            true
        }
        Err(e) => {
            error!("{} failed to recompute timer: {}", source, e);
            false
        }
    }
}

async fn coarse_probe(state: Arc<AppState>, active: Arc<AtomicBool>) {
    let mut probe = interval(COARSE_PROBE_INTERVAL);
    probe.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        probe.tick().await;
        if !active.load(Ordering::SeqCst) {
            break;
        }
        if state.is_visible() {
            continue;
        }
        if drive(&state, &active, "coarse probe") {
            break;
        }
    }
}

async fn frame_loop(state: Arc<AppState>, active: Arc<AtomicBool>) {
    let mut visibility = state.subscribe_visibility();
    let mut frames = interval(FRAME_INTERVAL);
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        if !active.load(Ordering::SeqCst) {
            break;
        }

        let visible = *visibility.borrow_and_update();
        if !visible {
            // Hidden: wait to be re-armed by the next visibility change
            if visibility.changed().await.is_err() {
                break;
            }
            continue;
        }

        tokio::select! {
            _ = frames.tick() => {
                if drive(&state, &active, "frame loop") {
                    break;
                }
            }
            changed = visibility.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}
