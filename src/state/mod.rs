//! State management module
//!
//! This module contains the timer state, its persistence mirror, recovery,
//! completion policy and the shared application state tying them together.

pub mod app_state;
pub mod mode;
pub mod persistence;
pub mod recovery;
pub mod streaks;
pub mod timer_state;
pub mod transition;

// Re-export main types
pub use app_state::{AppState, TickOutcome};
pub use mode::{duration, format_mm_ss, TimerMode};
pub use persistence::{PersistedSnapshot, PersistenceBridge};
pub use recovery::Recovered;
pub use streaks::{Streak, StreakLedger};
pub use timer_state::TimerState;
pub use transition::CompletionEvent;
