//! Inactivity timer and backlight control.
//!
//! Every touch or button edge resets one deadline. Press also lights the
//! panel immediately; only the deadline passing turns it off again.

use embassy_sync::blocking_mutex::raw::RawMutex;
use log::debug;

use crate::{
    config::{
        ConfigStore,
        keys::{DEFAULT_DISPLAY_TIMEOUT_MS, DISPLAY_TIMEOUT},
    },
    input::InputEvent,
};

/// Display backlight driver.
pub trait Backlight {
    fn set_backlight(&mut self, on: bool);
}

impl<B: Backlight + ?Sized> Backlight for &mut B {
    fn set_backlight(&mut self, on: bool) {
        (**self).set_backlight(on);
    }
}

/// Single one-shot deadline; resetting replaces any pending firing.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct InactivityTimer {
    deadline_ms: Option<u64>,
}

impl InactivityTimer {
    pub const fn new() -> Self {
        Self { deadline_ms: None }
    }

    pub fn reset(&mut self, now_ms: u64, duration_ms: u32) {
        self.deadline_ms = Some(now_ms.saturating_add(u64::from(duration_ms)));
    }

    pub const fn deadline_ms(&self) -> Option<u64> {
        self.deadline_ms
    }

    pub const fn is_armed(&self) -> bool {
        self.deadline_ms.is_some()
    }

    /// Fires at most once per reset.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        match self.deadline_ms {
            Some(deadline) if now_ms >= deadline => {
                self.deadline_ms = None;
                true
            }
            _ => false,
        }
    }
}

/// Collapses input edges into backlight on/off decisions.
pub struct ActivityCoordinator<'a, M: RawMutex, B: Backlight> {
    config: &'a ConfigStore<M>,
    backlight: B,
    timer: InactivityTimer,
}

impl<'a, M: RawMutex, B: Backlight> ActivityCoordinator<'a, M, B> {
    pub const fn new(config: &'a ConfigStore<M>, backlight: B) -> Self {
        Self {
            config,
            backlight,
            timer: InactivityTimer::new(),
        }
    }

    pub fn on_input(&mut self, event: InputEvent, now_ms: u64) {
        match event {
            InputEvent::Press => self.reset(now_ms, true),
            InputEvent::Release => self.reset(now_ms, false),
        }
    }

    /// Cancels any pending firing and reschedules with the current timeout.
    ///
    /// The timeout is read from the store on every call so a new
    /// configuration applies from the next interaction. `wake` turns the
    /// backlight on right away.
    pub fn reset(&mut self, now_ms: u64, wake: bool) {
        let timeout_ms = self
            .config
            .get_millis(DISPLAY_TIMEOUT, DEFAULT_DISPLAY_TIMEOUT_MS);
        self.timer.reset(now_ms, timeout_ms);
        if wake {
            self.backlight.set_backlight(true);
        }
    }

    /// Turns the backlight off once the deadline passes; returns whether it did.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        if !self.timer.poll(now_ms) {
            return false;
        }
        debug!("display timeout reached at {}ms, backlight off", now_ms);
        self.backlight.set_backlight(false);
        true
    }

    pub const fn timer(&self) -> &InactivityTimer {
        &self.timer
    }

    pub const fn backlight(&self) -> &B {
        &self.backlight
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use alloc::vec::Vec;

    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

    use super::*;
    use crate::config::MemoryStorage;

    #[derive(Debug, Default)]
    pub(crate) struct RecordingBacklight {
        pub(crate) calls: Vec<bool>,
    }

    impl RecordingBacklight {
        pub(crate) fn is_on(&self) -> bool {
            self.calls.last().copied().unwrap_or(false)
        }
    }

    impl Backlight for RecordingBacklight {
        fn set_backlight(&mut self, on: bool) {
            self.calls.push(on);
        }
    }

    fn store_with(text: &str) -> ConfigStore<CriticalSectionRawMutex> {
        let store = ConfigStore::new();
        store.load(&mut MemoryStorage::with_contents(text.as_bytes()));
        store
    }

    #[test]
    fn press_lights_panel_and_arms_timer() {
        let store = store_with(r#"{"display_timeout": 5000}"#);
        let mut activity = ActivityCoordinator::new(&store, RecordingBacklight::default());

        activity.on_input(InputEvent::Press, 1_000);

        assert_eq!(activity.backlight().calls, [true]);
        assert_eq!(activity.timer().deadline_ms(), Some(6_000));
    }

    #[test]
    fn release_rearms_without_touching_backlight() {
        let store = store_with(r#"{"display_timeout": 5000}"#);
        let mut activity = ActivityCoordinator::new(&store, RecordingBacklight::default());

        activity.on_input(InputEvent::Release, 2_000);

        assert!(activity.backlight().calls.is_empty());
        assert_eq!(activity.timer().deadline_ms(), Some(7_000));
    }

    #[test]
    fn press_then_release_fires_once_from_last_reset() {
        let store = store_with(r#"{"display_timeout": 5000}"#);
        let mut activity = ActivityCoordinator::new(&store, RecordingBacklight::default());

        activity.on_input(InputEvent::Press, 1_000);
        activity.on_input(InputEvent::Release, 1_400);

        let mut fired_at = Vec::new();
        for now_ms in (1_000..20_000).step_by(100) {
            if activity.poll(now_ms) {
                fired_at.push(now_ms);
            }
        }

        assert_eq!(fired_at, [6_400]);
        assert_eq!(activity.backlight().calls, [true, false]);
        assert!(!activity.timer().is_armed());
    }

    #[test]
    fn expiry_is_the_only_way_off() {
        let store = store_with("{}");
        let mut activity = ActivityCoordinator::new(&store, RecordingBacklight::default());

        activity.on_input(InputEvent::Press, 0);
        activity.on_input(InputEvent::Release, 10);
        activity.on_input(InputEvent::Press, 20);
        assert!(activity.backlight().is_on());
        assert!(!activity.poll(DEFAULT_DISPLAY_TIMEOUT_MS as u64 + 19));
        assert!(activity.backlight().is_on());

        assert!(activity.poll(DEFAULT_DISPLAY_TIMEOUT_MS as u64 + 20));
        assert!(!activity.backlight().is_on());
    }

    #[test]
    fn timeout_is_read_fresh_on_every_reset() {
        let store = store_with(r#"{"display_timeout": 5000}"#);
        let mut activity = ActivityCoordinator::new(&store, RecordingBacklight::default());

        activity.on_input(InputEvent::Press, 0);
        assert_eq!(activity.timer().deadline_ms(), Some(5_000));

        store.load(&mut MemoryStorage::with_contents(
            br#"{"display_timeout": 30000}"#,
        ));
        assert_eq!(activity.timer().deadline_ms(), Some(5_000));

        activity.on_input(InputEvent::Release, 100);
        assert_eq!(activity.timer().deadline_ms(), Some(30_100));
    }

    #[test]
    fn unusable_timeout_falls_back_to_default() {
        let store = store_with(r#"{"display_timeout": "soon"}"#);
        let mut activity = ActivityCoordinator::new(&store, RecordingBacklight::default());

        activity.reset(0, false);

        assert_eq!(
            activity.timer().deadline_ms(),
            Some(u64::from(DEFAULT_DISPLAY_TIMEOUT_MS))
        );
    }

    #[test]
    fn timer_without_reset_never_fires() {
        let mut timer = InactivityTimer::new();
        assert!(!timer.poll(u64::MAX));

        timer.reset(100, 0);
        assert!(timer.poll(100));
        assert!(!timer.poll(200));
    }
}
