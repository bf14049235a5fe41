pub mod backlight;
pub mod clock;
pub mod display;
pub mod labels;
pub mod panel;
pub mod restart;
