//! Timer modes and their fixed durations

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Timer mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimerMode {
    #[default]
    #[serde(alias = "pomodoro")]
    Work,
    #[serde(alias = "shortBreak")]
    ShortBreak,
    #[serde(alias = "longBreak")]
    LongBreak,
}

impl TimerMode {
    pub const ALL: [TimerMode; 3] = [TimerMode::Work, TimerMode::ShortBreak, TimerMode::LongBreak];

    /// Nominal duration of the mode in seconds
    pub const fn duration(self) -> u32 {
        match self {
            TimerMode::Work => 25 * 60,
            TimerMode::ShortBreak => 5 * 60,
            TimerMode::LongBreak => 15 * 60,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimerMode::Work => "work",
            TimerMode::ShortBreak => "short-break",
            TimerMode::LongBreak => "long-break",
        }
    }
}

/// Nominal duration of `mode` in seconds
pub const fn duration(mode: TimerMode) -> u32 {
    mode.duration()
}

impl fmt::Display for TimerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimerMode {
    type Err = String;

    /// Accepts both the kebab-case names and the camelCase names older
    /// data files were written with.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "work" | "pomodoro" => Ok(TimerMode::Work),
            "short-break" | "shortBreak" => Ok(TimerMode::ShortBreak),
            "long-break" | "longBreak" => Ok(TimerMode::LongBreak),
            other => Err(format!("Unknown timer mode: {}", other)),
        }
    }
}

/// Format seconds as "MM:SS"
pub fn format_mm_ss(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
