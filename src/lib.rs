//! Pomo Sync - A local Pomodoro timer service
//!
//! This library provides a drift-corrected Pomodoro countdown that mirrors
//! itself into durable storage, recovers after restarts, and keeps a daily
//! session counter and guest streak ledger.

pub mod api;
pub mod config;
pub mod services;
pub mod state;
pub mod storage;
pub mod tasks;
pub mod utils;

// Re-export commonly used types
pub use api::create_router;
pub use config::Config;
pub use state::AppState;
pub use utils::signals::shutdown_signal;
