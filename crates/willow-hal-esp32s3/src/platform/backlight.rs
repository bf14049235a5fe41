use embedded_hal::digital::OutputPin;
use log::warn;

use willow_core::activity::Backlight;

/// Panel backlight on a single GPIO.
#[derive(Debug)]
pub struct GpioBacklight<P> {
    pin: P,
    active_high: bool,
}

impl<P: OutputPin> GpioBacklight<P> {
    pub const fn new(pin: P, active_high: bool) -> Self {
        Self { pin, active_high }
    }
}

impl<P: OutputPin> Backlight for GpioBacklight<P> {
    fn set_backlight(&mut self, on: bool) {
        let result = if on == self.active_high {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        if let Err(err) = result {
            warn!("backlight: failed to switch {}: {:?}", if on { "on" } else { "off" }, err);
        }
    }
}
