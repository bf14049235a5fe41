//! Deferred device restart.

use log::info;

/// Delay between the confirmation screen and the reboot.
pub const RESTART_DELAY_MS: u32 = 5_000;

/// Board hook that actually reboots the chip.
pub trait Restart {
    fn restart(&mut self) -> !;
}

/// Restart deadline polled from the UI loop.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DelayedRestart {
    due_at_ms: Option<u64>,
}

impl DelayedRestart {
    pub const fn new() -> Self {
        Self { due_at_ms: None }
    }

    /// Arms the deadline. A restart that is already scheduled keeps its
    /// first, earlier deadline.
    pub fn schedule(&mut self, now_ms: u64, delay_ms: u32) -> u64 {
        let due = *self
            .due_at_ms
            .get_or_insert(now_ms.saturating_add(u64::from(delay_ms)));
        info!("restart scheduled at {}ms", due);
        due
    }

    pub const fn due_at_ms(&self) -> Option<u64> {
        self.due_at_ms
    }

    pub fn is_due(&self, now_ms: u64) -> bool {
        self.due_at_ms.is_some_and(|due| now_ms >= due)
    }
}
