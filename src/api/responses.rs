//! API request and response structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::{duration, format_mm_ss, Streak, TimerMode, TimerState};

/// Timer as shown to the client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerView {
    #[serde(flatten)]
    pub timer: TimerState,
    pub formatted_time: String,
    pub duration_seconds: u32,
    pub visible: bool,
    pub timestamp: DateTime<Utc>,
}

impl TimerView {
    pub fn new(timer: TimerState, visible: bool) -> Self {
        Self {
            formatted_time: format_mm_ss(timer.remaining_seconds),
            duration_seconds: duration(timer.mode),
            timer,
            visible,
            timestamp: Utc::now(),
        }
    }
}

/// Body of POST /timer/mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeRequest {
    pub mode: TimerMode,
}

/// Body of POST /timer/visibility
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisibilityRequest {
    pub visible: bool,
}

/// Streak ledger with the current run of active days
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreaksResponse {
    pub streaks: Vec<Streak>,
    pub current_streak: u32,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub uptime: String,
}

impl HealthResponse {
    pub fn ok(uptime: String) -> Self {
        Self {
            status: "ok".to_string(),
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime,
        }
    }
}
