use embedded_hal::digital::InputPin;

use willow_core::input::{InputEvent, InputProvider};

#[derive(Debug, Clone, Copy)]
pub struct ButtonConfig {
    active_low: bool,
    debounce_polls: u8,
}

impl Default for ButtonConfig {
    fn default() -> Self {
        Self {
            active_low: true,
            debounce_polls: 3,
        }
    }
}

impl ButtonConfig {
    pub const fn with_active_low(mut self, active_low: bool) -> Self {
        self.active_low = active_low;
        self
    }

    pub const fn with_debounce_polls(mut self, debounce_polls: u8) -> Self {
        self.debounce_polls = debounce_polls;
        self
    }
}

/// Debounced push button reporting both press and release edges.
#[derive(Debug)]
pub struct ButtonInput<SW> {
    sw: SW,
    config: ButtonConfig,
    raw: bool,
    stable: bool,
    stable_count: u8,
}

impl<SW: InputPin> ButtonInput<SW> {
    pub fn new(mut sw: SW, config: ButtonConfig) -> Result<Self, SW::Error> {
        let pressed = pressed_from_level(sw.is_high()?, config.active_low);

        Ok(Self {
            sw,
            config,
            raw: pressed,
            stable: pressed,
            stable_count: 0,
        })
    }
}

impl<SW: InputPin> InputProvider for ButtonInput<SW> {
    type Error = SW::Error;

    fn poll_event(&mut self) -> Result<Option<InputEvent>, Self::Error> {
        let pressed = pressed_from_level(self.sw.is_high()?, self.config.active_low);

        if pressed == self.raw {
            self.stable_count = self.stable_count.saturating_add(1);
        } else {
            self.raw = pressed;
            self.stable_count = 0;
        }

        let debounce_threshold = self.config.debounce_polls.max(1);
        if self.stable_count < debounce_threshold || self.stable == self.raw {
            return Ok(None);
        }

        self.stable = self.raw;
        Ok(Some(if self.stable {
            InputEvent::Press
        } else {
            InputEvent::Release
        }))
    }
}

#[inline]
fn pressed_from_level(high: bool, active_low: bool) -> bool {
    if active_low { !high } else { high }
}
