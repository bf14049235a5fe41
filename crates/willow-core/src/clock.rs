//! Monotonic millisecond time source.

use core::cell::Cell;

pub trait Clock {
    fn now_ms(&self) -> u64;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

/// Hand-driven clock; each read advances it by `step_ms`.
///
/// Lets bounded waits terminate deterministically off-device.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: Cell<u64>,
    step_ms: u64,
}

impl ManualClock {
    pub const fn new(start_ms: u64) -> Self {
        Self {
            now_ms: Cell::new(start_ms),
            step_ms: 0,
        }
    }

    pub const fn with_step(mut self, step_ms: u64) -> Self {
        self.step_ms = step_ms;
        self
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        let now = self.now_ms.get();
        self.now_ms.set(now.saturating_add(self.step_ms));
        now
    }
}
