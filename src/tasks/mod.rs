//! Background tasks module
//!
//! This module contains the countdown loops that run alongside the HTTP server.

pub mod scheduler;

// Re-export main types
pub use scheduler::Scheduler;
