//! External collaborators module
//!
//! This module contains the completion notifiers.

pub mod notify;

// Re-export main items
pub use notify::{CommandNotifier, LogNotifier, Notifier};
