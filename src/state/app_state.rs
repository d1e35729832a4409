//! Main application state management

use std::{
    sync::{
        atomic::{AtomicBool, AtomicI64, Ordering},
        Arc, Mutex,
    },
    time::Instant,
};

use chrono::NaiveDate;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use super::{
    mode::TimerMode,
    persistence::PersistenceBridge,
    recovery::{self, Recovered},
    streaks::StreakLedger,
    timer_state::TimerState,
    transition::{self, CompletionEvent},
};
use crate::{services::Notifier, storage::KeyValueStore, tasks::Scheduler, utils::Clock};

/// Hidden periods longer than this force a recomputation when the client
/// becomes visible again
pub const DRIFT_THRESHOLD_MS: i64 = 500;

/// Result of one recomputation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Still counting down
    Running(u32),
    /// The countdown hit zero and the next mode is loaded
    Completed(CompletionEvent),
    /// The timer isn't running
    Idle,
}

/// Session state shared between the HTTP layer and the countdown loops
pub struct AppState {
    timer: Mutex<TimerState>,
    bridge: PersistenceBridge,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    scheduler: Scheduler,
    recovered: AtomicBool,
    /// Whether the client currently shows the timer
    visibility_tx: watch::Sender<bool>,
    last_visible_ms: AtomicI64,
    /// Channel for timer updates
    timer_update_tx: watch::Sender<TimerState>,
    /// Channel for finished countdowns
    completion_tx: broadcast::Sender<CompletionEvent>,
    pub start_time: Instant,
}

impl AppState {
    /// Create the state with first-load defaults. Call [`recover`](Self::recover)
    /// before serving to pick up persisted state.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (visibility_tx, _) = watch::channel(true);
        let (timer_update_tx, _) = watch::channel(TimerState::new());
        let (completion_tx, _) = broadcast::channel(16);
        let now = clock.now_ms();

        Self {
            timer: Mutex::new(TimerState::new()),
            bridge: PersistenceBridge::new(store),
            clock,
            notifier,
            scheduler: Scheduler::new(),
            recovered: AtomicBool::new(false),
            visibility_tx,
            last_visible_ms: AtomicI64::new(now),
            timer_update_tx,
            completion_tx,
            start_time: Instant::now(),
        }
    }

    /// Rebuild the timer from the persisted mirror
    ///
    /// Only the first call does anything; later calls return `None`. A
    /// recovered running timer re-arms the countdown loops right away.
    pub fn recover(self: &Arc<Self>) -> Result<Option<Recovered>, String> {
        if self.recovered.swap(true, Ordering::SeqCst) {
            debug!("Recovery already ran, skipping");
            return Ok(None);
        }

        let snapshot = self.bridge.load();
        let counter = self.bridge.load_counter();
        debug!("Restoring timer from {:?} and {:?}", snapshot, counter);

        let now = self.clock.now_ms();
        let (recovered_state, outcome) = recovery::recover(&snapshot, &counter, now);

        let mut timer = self.lock_timer()?;
        *timer = recovered_state;
        self.bridge.mirror(&timer);
        let new_state = timer.clone();
        drop(timer);

        self.publish(new_state);
        if outcome.is_running() {
            self.scheduler.start(self);
        }
        info!("Timer recovery finished: {:?}", outcome);
        Ok(Some(outcome))
    }

    /// Apply a transition under the lock, then mirror and publish the result
    fn update_timer<F>(&self, action: &str, updater: F) -> Result<TimerState, String>
    where
        F: FnOnce(&mut TimerState, i64),
    {
        let now = self.clock.now_ms();
        let mut timer = self.lock_timer()?;
        updater(&mut *timer, now);
        self.bridge.mirror(&timer);
        let new_state = timer.clone();
        drop(timer);

        debug!(
            "{}: mode={} remaining={}s running={}",
            action, new_state.mode, new_state.remaining_seconds, new_state.is_running
        );
        self.publish(new_state.clone());
        Ok(new_state)
    }

    /// Switch mode, stopping any countdown
    pub fn set_mode(&self, mode: TimerMode) -> Result<TimerState, String> {
        info!("Setting timer mode to: {}", mode);
        self.scheduler.stop();
        self.update_timer("set-mode", |timer, _| timer.set_mode(mode))
    }

    /// Start or resume the countdown and arm the loops
    ///
    /// The loops are armed under the timer lock, so a concurrent pause,
    /// reset or completion can't slip in between the start and the arming.
    pub fn start_timer(self: &Arc<Self>) -> Result<TimerState, String> {
        let now = self.clock.now_ms();
        let mut timer = self.lock_timer()?;
        timer.start(now);
        self.bridge.mirror(&timer);
        if timer.is_running {
            self.scheduler.start(self);
        }
        let new_state = timer.clone();
        drop(timer);

        info!(
            "Timer started: {} with {}s remaining",
            new_state.mode, new_state.remaining_seconds
        );
        self.publish(new_state.clone());
        Ok(new_state)
    }

    pub fn pause_timer(&self) -> Result<TimerState, String> {
        self.scheduler.stop();
        let new_state = self.update_timer("pause", |timer, now| timer.pause(now))?;
        info!("Timer paused with {}s remaining", new_state.remaining_seconds);
        Ok(new_state)
    }

    pub fn reset_timer(&self) -> Result<TimerState, String> {
        self.scheduler.stop();
        let new_state = self.update_timer("reset", |timer, _| timer.reset())?;
        info!("Timer reset to {}s", new_state.remaining_seconds);
        Ok(new_state)
    }

    /// Count a completed work session today and persist the counter
    pub fn increment_completed_pomodoros(&self) -> Result<TimerState, String> {
        let today = self.clock.today();
        let new_state =
            self.update_timer("increment", |timer, _| timer.increment_completed(today))?;
        self.bridge.save_counter(&new_state);
        Ok(new_state)
    }

    /// Recompute remaining time now
    pub fn tick(&self) -> Result<TickOutcome, String> {
        self.recompute(false)
    }

    /// Recompute and rewrite the mirror even when nothing changed
    pub fn force_tick(&self) -> Result<TickOutcome, String> {
        self.recompute(true)
    }

    fn recompute(&self, force: bool) -> Result<TickOutcome, String> {
        let now = self.clock.now_ms();
        let mut timer = self.lock_timer()?;
        if !timer.is_running {
            return Ok(TickOutcome::Idle);
        }

        let before = timer.remaining_seconds;
        let remaining = timer.recompute(now);
        if remaining > 0 {
            let changed = remaining != before;
            if changed || force {
                self.bridge.mirror(&timer);
            }
            let new_state = changed.then(|| timer.clone());
            drop(timer);
            if let Some(new_state) = new_state {
                self.publish(new_state);
            }
            return Ok(TickOutcome::Running(remaining));
        }

        let today = self.clock.today();
        let Some(event) = transition::complete(&mut timer, today, now) else {
            return Ok(TickOutcome::Idle);
        };
        self.bridge.mirror(&timer);
        self.bridge.save_counter(&timer);
        // Disarm before releasing the lock so a racing start re-arms cleanly
        self.scheduler.stop();
        let new_state = timer.clone();
        drop(timer);

        self.finish_completion(&event, new_state);
        Ok(TickOutcome::Completed(event))
    }

    /// Side effects of a finished countdown, run outside the timer lock
    fn finish_completion(&self, event: &CompletionEvent, new_state: TimerState) {
        if let Err(e) = self.notifier.notify(event) {
            warn!("Completion notification failed: {}", e);
        }

        if event.finished == TimerMode::Work {
            let store = self.bridge.store();
            let mut ledger = StreakLedger::load(store.as_ref());
            ledger.record(event.date, event.completed_count);
            ledger.save(store.as_ref());
        }

        info!(
            "{} finished, switching to {} ({} sessions today)",
            event.finished, event.next, event.completed_count
        );
        self.publish(new_state);
        if self.completion_tx.send(event.clone()).is_err() {
            debug!("No completion subscribers");
        }
    }

    /// Record a visibility change reported by the client
    ///
    /// Coming back after more than [`DRIFT_THRESHOLD_MS`] hidden forces a
    /// recomputation instead of waiting for the next frame.
    pub fn set_visibility(&self, visible: bool) -> Result<TimerState, String> {
        let now = self.clock.now_ms();
        let last_visible = self.last_visible_ms.swap(now, Ordering::SeqCst);
        let was_visible = self.visibility_tx.send_replace(visible);

        if visible && !was_visible {
            let hidden_ms = now - last_visible;
            if hidden_ms > DRIFT_THRESHOLD_MS {
                info!(
                    "Client was hidden for {:.1}s, adjusting timer",
                    hidden_ms as f64 / 1000.0
                );
                self.force_tick()?;
            }
        }
        self.get_timer_state()
    }

    pub fn is_visible(&self) -> bool {
        *self.visibility_tx.borrow()
    }

    pub fn subscribe_visibility(&self) -> watch::Receiver<bool> {
        self.visibility_tx.subscribe()
    }

    pub fn subscribe_timer(&self) -> watch::Receiver<TimerState> {
        self.timer_update_tx.subscribe()
    }

    pub fn subscribe_completions(&self) -> broadcast::Receiver<CompletionEvent> {
        self.completion_tx.subscribe()
    }

    /// Get current timer state
    pub fn get_timer_state(&self) -> Result<TimerState, String> {
        self.lock_timer().map(|timer| timer.clone())
    }

    pub fn streaks(&self) -> StreakLedger {
        StreakLedger::load(self.bridge.store().as_ref())
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Stop the loops and flush the mirror one last time
    pub fn shutdown(&self) -> Result<(), String> {
        self.scheduler.stop();
        self.force_tick()?;
        let timer = self.lock_timer()?;
        self.bridge.mirror(&timer);
        self.bridge.save_counter(&timer);
        info!("Timer state flushed");
        Ok(())
    }

    /// Calculate server uptime as a formatted string
    pub fn get_uptime(&self) -> String {
        let secs = self.start_time.elapsed().as_secs();
        let hours = secs / 3600;
        let minutes = (secs % 3600) / 60;
        let seconds = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }

    fn lock_timer(&self) -> Result<std::sync::MutexGuard<'_, TimerState>, String> {
        self.timer
            .lock()
            .map_err(|e| format!("Failed to lock timer state: {}", e))
    }

    fn publish(&self, new_state: TimerState) {
        self.timer_update_tx.send_replace(new_state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        state::persistence::keys,
        storage::MemoryStore,
        utils::ManualClock,
    };
    use std::sync::atomic::AtomicUsize;

    struct RecordingNotifier {
        calls: AtomicUsize,
        fail: bool,
    }

    impl RecordingNotifier {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, _event: &CompletionEvent) -> Result<(), String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err("speaker unplugged".to_string())
            } else {
                Ok(())
            }
        }
    }

    struct Fixture {
        state: Arc<AppState>,
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        notifier: Arc<RecordingNotifier>,
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 14).unwrap()
    }

    fn fixture_with(store: MemoryStore, fail_notify: bool) -> Fixture {
        let store = Arc::new(store);
        let clock = Arc::new(ManualClock::at_noon(today()));
        let notifier = RecordingNotifier::new(fail_notify);
        let state = Arc::new(AppState::new(store.clone(), clock.clone(), notifier.clone()));
        Fixture {
            state,
            store,
            clock,
            notifier,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(MemoryStore::new(), false)
    }

    /// Store holding a paused work timer with `remaining` seconds left
    fn paused_work_store(remaining: u32) -> MemoryStore {
        let store = MemoryStore::new();
        store.set(keys::MODE, "work").unwrap();
        store.set(keys::IS_RUNNING, "false").unwrap();
        store.set(keys::PAUSED_AT, &remaining.to_string()).unwrap();
        store
    }

    #[test]
    fn resume_never_restarts_full_duration() {
        let f = fixture();
        f.state.start_timer().unwrap();
        f.clock.advance_secs(10);
        let paused = f.state.pause_timer().unwrap();
        assert_eq!(paused.remaining_seconds, 1490);

        f.clock.advance_secs(120);
        f.state.start_timer().unwrap();
        f.clock.advance_secs(5);
        assert_eq!(f.state.tick().unwrap(), TickOutcome::Running(1485));
    }

    #[test]
    fn pause_twice_is_idempotent() {
        let f = fixture();
        f.state.start_timer().unwrap();
        f.clock.advance_secs(4);
        let once = f.state.pause_timer().unwrap();
        f.clock.advance_secs(4);
        let twice = f.state.pause_timer().unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn reset_and_mode_change_rewrite_the_mirror() {
        let f = fixture();
        f.state.start_timer().unwrap();
        assert_eq!(f.store.get(keys::IS_RUNNING).as_deref(), Some("true"));

        f.state.set_mode(TimerMode::LongBreak).unwrap();
        assert_eq!(f.store.get(keys::IS_RUNNING).as_deref(), Some("false"));
        assert_eq!(f.store.get(keys::MODE).as_deref(), Some("long-break"));
        assert_eq!(f.store.get(keys::TIME_LEFT).as_deref(), Some("900"));
        assert!(f.store.get(keys::END_TIME).is_none());

        f.state.start_timer().unwrap();
        f.clock.advance_secs(30);
        f.state.tick().unwrap();
        assert_eq!(f.store.get(keys::TIME_LEFT).as_deref(), Some("870"));

        let reset = f.state.reset_timer().unwrap();
        assert_eq!(reset.remaining_seconds, 900);
        assert_eq!(reset.mode, TimerMode::LongBreak);
        assert!(f.store.get(keys::PAUSED_AT).is_none());
    }

    #[test]
    fn foreground_after_background_corrects_drift() {
        let f = fixture_with(paused_work_store(100), false);
        f.state.recover().unwrap();
        f.state.start_timer().unwrap();
        f.state.set_visibility(false).unwrap();

        f.clock.advance_ms(10_000);
        let view = f.state.set_visibility(true).unwrap();
        assert_eq!(view.remaining_seconds, 90);
        assert!(view.is_running);
        assert_eq!(f.state.subscribe_timer().borrow().remaining_seconds, 90);
    }

    #[test]
    fn short_hidden_blips_do_not_force_a_write() {
        let f = fixture();
        f.state.start_timer().unwrap();
        f.state.set_visibility(false).unwrap();
        f.store.remove(keys::END_TIME).unwrap();

        f.clock.advance_ms(300);
        f.state.set_visibility(true).unwrap();
        assert!(f.store.get(keys::END_TIME).is_none());

        f.state.set_visibility(false).unwrap();
        f.clock.advance_ms(800);
        f.state.set_visibility(true).unwrap();
        assert!(f.store.get(keys::END_TIME).is_some());
    }

    #[test]
    fn fourth_work_session_moves_to_long_break() {
        let store = paused_work_store(5);
        store
            .set(
                keys::COUNTER,
                r#"{"completedCount":3,"lastSessionDate":"2026-10-14"}"#,
            )
            .unwrap();
        let f = fixture_with(store, false);
        f.state.recover().unwrap();
        let mut completions = f.state.subscribe_completions();

        f.state.start_timer().unwrap();
        f.clock.advance_secs(5);
        let outcome = f.state.tick().unwrap();

        let TickOutcome::Completed(event) = outcome.clone() else {
            panic!("expected completion, got {:?}", outcome);
        };
        assert_eq!(event.next, TimerMode::LongBreak);
        assert_eq!(event.at.timestamp_millis(), f.clock.now_ms());
        assert_eq!(completions.try_recv().unwrap(), event);

        let timer = f.state.get_timer_state().unwrap();
        assert_eq!(timer.mode, TimerMode::LongBreak);
        assert_eq!(timer.completed_count, 4);
        assert_eq!(timer.remaining_seconds, 900);
        assert!(!timer.is_running);

        assert_eq!(f.store.get(keys::IS_RUNNING).as_deref(), Some("false"));
        assert!(f.store.get(keys::END_TIME).is_none());
        assert!(f.store.get(keys::START_TIME).is_none());
        assert!(f.store.get(keys::PAUSED_AT).is_none());
        assert_eq!(f.notifier.calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.state.streaks().get(today()).map(|s| s.sessions), Some(4));

        // A second tick on the stopped timer does nothing
        assert_eq!(f.state.tick().unwrap(), TickOutcome::Idle);
        assert_eq!(f.notifier.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_notification_does_not_block_the_transition() {
        let f = fixture_with(paused_work_store(2), true);
        f.state.recover().unwrap();
        f.state.start_timer().unwrap();
        f.clock.advance_secs(2);

        assert!(matches!(f.state.tick().unwrap(), TickOutcome::Completed(_)));
        let timer = f.state.get_timer_state().unwrap();
        assert_eq!(timer.mode, TimerMode::ShortBreak);
        assert_eq!(timer.completed_count, 1);
        assert_eq!(f.notifier.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn recovery_runs_once() {
        let f = fixture_with(paused_work_store(200), false);
        assert_eq!(
            f.state.recover().unwrap(),
            Some(Recovered::Paused { remaining: 200 })
        );

        f.store.set(keys::PAUSED_AT, "50").unwrap();
        assert_eq!(f.state.recover().unwrap(), None);
        assert_eq!(f.state.get_timer_state().unwrap().remaining_seconds, 200);
    }

    #[test]
    fn running_timer_survives_a_restart() {
        let f = fixture();
        f.state.start_timer().unwrap();
        f.clock.advance_secs(1500 - 42);
        f.state.tick().unwrap();

        // New process over the same store, a little later
        let clock = Arc::new(ManualClock::new(f.clock.now_ms() + 400));
        let restarted = Arc::new(AppState::new(
            f.store.clone(),
            clock.clone(),
            RecordingNotifier::new(false),
        ));
        assert_eq!(
            restarted.recover().unwrap(),
            Some(Recovered::Running { remaining: 42 })
        );
        let timer = restarted.get_timer_state().unwrap();
        assert!(timer.is_running);
        assert_eq!(timer.remaining_seconds, 42);
    }

    #[test]
    fn increment_persists_counter() {
        let f = fixture();
        f.state.increment_completed_pomodoros().unwrap();
        let state = f.state.increment_completed_pomodoros().unwrap();
        assert_eq!(state.completed_count, 2);
        assert!(f.store.get(keys::COUNTER).unwrap().contains("\"completedCount\":2"));
    }

    #[test]
    fn uptime_is_formatted() {
        let f = fixture();
        assert!(f.state.get_uptime().ends_with('s'));
    }
}
