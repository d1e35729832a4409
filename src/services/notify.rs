//! Completion cues
//!
//! Notifications are best effort. A failing notifier is logged by the caller
//! and never stops the timer from moving on.

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::state::CompletionEvent;

pub trait Notifier: Send + Sync {
    fn notify(&self, event: &CompletionEvent) -> Result<(), String>;
}

/// Logs completions and nothing else
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: &CompletionEvent) -> Result<(), String> {
        info!(
            "{} ({} sessions today, next: {})",
            event.message(),
            event.completed_count,
            event.next
        );
        Ok(())
    }
}

/// Runs a shell command on completion, e.g. an audio player
///
/// The command sees `POMO_FINISHED`, `POMO_NEXT` and `POMO_COUNT` in its
/// environment. It is spawned on the current tokio runtime and not awaited.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    command: String,
}

impl CommandNotifier {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Notifier for CommandNotifier {
    fn notify(&self, event: &CompletionEvent) -> Result<(), String> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| format!("No runtime to run notify command: {}", e))?;

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .env("POMO_FINISHED", event.finished.as_str())
            .env("POMO_NEXT", event.next.as_str())
            .env("POMO_COUNT", event.completed_count.to_string())
            .kill_on_drop(false)
            .spawn()
            .map_err(|e| format!("Failed to spawn notify command: {}", e))?;

        let command = self.command.clone();
        handle.spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => debug!("Notify command finished"),
                Ok(status) => warn!("Notify command `{}` exited with {}", command, status),
                Err(e) => warn!("Failed to wait for notify command `{}`: {}", command, e),
            }
        });

        info!("{} (notify command started)", event.message());
        Ok(())
    }
}
