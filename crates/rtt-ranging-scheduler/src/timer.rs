//! Timeout timer: exactly one pending fire per dispatched request.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::command::Command;

/// Default HAL ranging timeout for non-Aware responders.
pub const HAL_RANGING_TIMEOUT_MS: u64 = 5_000;
/// Timeout used when any responder in the dispatched request is an Aware peer.
pub const HAL_AWARE_RANGING_TIMEOUT_MS: u64 = 10_000;

/// A single armed-or-idle timer. Arming replaces any previous timer; the old task is
/// aborted so a stale fire can never reach the scheduler context.
#[derive(Default)]
pub struct TimeoutTimer {
    handle: Option<JoinHandle<()>>,
}

impl TimeoutTimer {
    pub fn new() -> Self {
        Self { handle: None }
    }

    pub fn arm(&mut self, duration: Duration, cmd_id: u32, sender: UnboundedSender<Command>) {
        self.cancel();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = sender.send(Command::Timeout { cmd_id });
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for TimeoutTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
