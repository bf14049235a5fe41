use log::info;

use willow_core::restart::Restart;

/// Chip-level software reset.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRestart;

impl Restart for SystemRestart {
    fn restart(&mut self) -> ! {
        info!("restarting");
        esp_hal::system::software_reset()
    }
}
