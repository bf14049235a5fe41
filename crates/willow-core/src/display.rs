//! Status labels and the lock guarding every mutation of them.

use core::ops::DerefMut;

use embassy_sync::{
    blocking_mutex::raw::RawMutex,
    mutex::{Mutex, MutexGuard},
};
use heapless::String as HeaplessString;
use log::debug;

use crate::clock::Clock;

pub const LABEL_BYTES: usize = 64;
pub const CONFIG_UPDATED_TEXT: &str = "Configuration Updated";

/// One of the five stacked status lines on the main screen.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StatusLabel {
    Line1,
    Line2,
    Line3,
    Line4,
    Line5,
}

impl StatusLabel {
    pub const ALL: [Self; 5] = [
        Self::Line1,
        Self::Line2,
        Self::Line3,
        Self::Line4,
        Self::Line5,
    ];

    /// Line used for terminal confirmation messages.
    pub const CONFIRMATION: Self = Self::Line3;

    const fn index(self) -> usize {
        match self {
            Self::Line1 => 0,
            Self::Line2 => 1,
            Self::Line3 => 2,
            Self::Line4 => 3,
            Self::Line5 => 4,
        }
    }
}

/// Label mutation surface exposed while the display lock is held.
pub trait LabelSurface {
    fn set_text(&mut self, label: StatusLabel, text: &str);
    fn set_hidden(&mut self, label: StatusLabel, hidden: bool);
}

/// Exclusive access to the label surface with a bounded wait.
pub trait DisplayAccess {
    type Surface: LabelSurface + ?Sized;
    type Guard<'a>: DerefMut<Target = Self::Surface>
    where
        Self: 'a;

    /// Gives up after `timeout_ms`; never blocks indefinitely.
    fn try_lock_for(&self, timeout_ms: u32) -> Option<Self::Guard<'_>>;
}

/// Replaces the screen with a single confirmation line.
pub fn show_confirmation<S: LabelSurface + ?Sized>(surface: &mut S, text: &str) {
    surface.set_text(StatusLabel::CONFIRMATION, text);
    for label in StatusLabel::ALL {
        if label != StatusLabel::CONFIRMATION {
            surface.set_hidden(label, true);
        }
    }
    surface.set_hidden(StatusLabel::CONFIRMATION, false);
}

#[derive(Clone, Debug, Default)]
struct Line {
    text: HeaplessString<LABEL_BYTES>,
    hidden: bool,
}

impl Line {
    const fn new() -> Self {
        Self {
            text: HeaplessString::new(),
            hidden: false,
        }
    }
}

/// Label contents the renderer draws from.
///
/// `revision` bumps on every change so the UI loop knows when to redraw.
#[derive(Clone, Debug, Default)]
pub struct StatusLabels {
    lines: [Line; 5],
    revision: u32,
}

impl StatusLabels {
    pub const fn new() -> Self {
        Self {
            lines: [Line::new(), Line::new(), Line::new(), Line::new(), Line::new()],
            revision: 0,
        }
    }

    pub fn text(&self, label: StatusLabel) -> &str {
        self.lines[label.index()].text.as_str()
    }

    pub fn is_hidden(&self, label: StatusLabel) -> bool {
        self.lines[label.index()].hidden
    }

    pub const fn revision(&self) -> u32 {
        self.revision
    }

    /// Visible lines in top-to-bottom order.
    pub fn visible(&self) -> impl Iterator<Item = (StatusLabel, &str)> {
        StatusLabel::ALL
            .into_iter()
            .filter(|label| !self.is_hidden(*label))
            .map(|label| (label, self.text(label)))
    }
}

impl LabelSurface for StatusLabels {
    fn set_text(&mut self, label: StatusLabel, text: &str) {
        let line = &mut self.lines[label.index()];
        if line.text.as_str() == text {
            return;
        }
        line.text.clear();
        for ch in text.chars() {
            if line.text.push(ch).is_err() {
                break;
            }
        }
        self.revision = self.revision.wrapping_add(1);
    }

    fn set_hidden(&mut self, label: StatusLabel, hidden: bool) {
        let line = &mut self.lines[label.index()];
        if line.hidden != hidden {
            line.hidden = hidden;
            self.revision = self.revision.wrapping_add(1);
        }
    }
}

/// Mutex-guarded labels shared by the renderer and the orchestrator.
pub struct DisplayLock<M: RawMutex, C: Clock> {
    labels: Mutex<M, StatusLabels>,
    clock: C,
}

impl<M: RawMutex, C: Clock> DisplayLock<M, C> {
    pub const fn new(clock: C) -> Self {
        Self {
            labels: Mutex::new(StatusLabels::new()),
            clock,
        }
    }

    /// Single attempt without waiting.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, M, StatusLabels>> {
        self.labels.try_lock().ok()
    }
}

impl<M: RawMutex, C: Clock> DisplayAccess for DisplayLock<M, C> {
    type Surface = StatusLabels;
    type Guard<'a>
        = MutexGuard<'a, M, StatusLabels>
    where
        Self: 'a;

    /// Spins without yielding, so a holder on the same executor cannot
    /// release the lock meanwhile. Only holders on another core or interrupt
    /// can; otherwise the wait runs to the full timeout.
    fn try_lock_for(&self, timeout_ms: u32) -> Option<Self::Guard<'_>> {
        let deadline = self.clock.now_ms().saturating_add(u64::from(timeout_ms));
        loop {
            if let Ok(guard) = self.labels.try_lock() {
                return Some(guard);
            }
            if self.clock.now_ms() >= deadline {
                debug!("display lock not acquired within {}ms", timeout_ms);
                return None;
            }
            core::hint::spin_loop();
        }
    }
}

#[cfg(test)]
mod tests {
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

    use super::*;
    use crate::clock::ManualClock;

    type Lock = DisplayLock<CriticalSectionRawMutex, ManualClock>;

    #[test]
    fn confirmation_hides_every_other_line() {
        let mut labels = StatusLabels::new();
        labels.set_text(StatusLabel::Line1, "Say \"Hi Willow\"");
        labels.set_text(StatusLabel::Line2, "to start");

        show_confirmation(&mut labels, CONFIG_UPDATED_TEXT);

        let visible: alloc::vec::Vec<_> = labels.visible().collect();
        assert_eq!(visible, [(StatusLabel::Line3, CONFIG_UPDATED_TEXT)]);
    }

    #[test]
    fn unchanged_text_does_not_bump_revision() {
        let mut labels = StatusLabels::new();
        labels.set_text(StatusLabel::Line4, "ready");
        let revision = labels.revision();

        labels.set_text(StatusLabel::Line4, "ready");
        labels.set_hidden(StatusLabel::Line4, false);

        assert_eq!(labels.revision(), revision);
    }

    #[test]
    fn long_text_is_truncated_on_a_char_boundary() {
        let mut labels = StatusLabels::new();
        let long = "é".repeat(LABEL_BYTES);
        labels.set_text(StatusLabel::Line1, &long);

        let stored = labels.text(StatusLabel::Line1);
        assert_eq!(stored.len(), LABEL_BYTES);
        assert!(stored.chars().all(|ch| ch == 'é'));
    }

    #[test]
    fn free_lock_is_acquired_immediately() {
        let lock = Lock::new(ManualClock::new(0));
        let mut guard = lock.try_lock_for(500).unwrap();
        guard.set_text(StatusLabel::Line1, "hello");
        drop(guard);

        assert_eq!(lock.try_lock().unwrap().text(StatusLabel::Line1), "hello");
    }

    #[test]
    fn held_lock_times_out_instead_of_blocking() {
        let lock = Lock::new(ManualClock::new(0).with_step(50));
        let _held = lock.try_lock().unwrap();

        assert!(lock.try_lock_for(500).is_none());
    }

    #[test]
    fn contended_wait_spends_the_whole_budget() {
        let clock = ManualClock::new(0).with_step(50);
        let lock = DisplayLock::<CriticalSectionRawMutex, _>::new(&clock);
        let _held = lock.try_lock().unwrap();

        assert!(lock.try_lock_for(500).is_none());
        assert!(clock.now_ms() >= 500);
    }

    #[test]
    fn zero_timeout_is_a_single_attempt() {
        let lock = Lock::new(ManualClock::new(0));
        let _held = lock.try_lock().unwrap();

        assert!(lock.try_lock_for(0).is_none());
    }
}
