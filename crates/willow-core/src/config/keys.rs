//! Well-known configuration keys and their fallbacks.

pub const DISPLAY_TIMEOUT: &str = "display_timeout";
pub const LOCK_TIMEOUT: &str = "lvgl_lock_timeout";
pub const WIFI_SSID: &str = "wifi_ssid";
pub const WIFI_PSK: &str = "wifi_psk";
pub const HOSTNAME: &str = "hostname";

pub const DEFAULT_DISPLAY_TIMEOUT_MS: u32 = 10_000;
pub const DEFAULT_LOCK_TIMEOUT_MS: u32 = 500;
pub const DEFAULT_HOSTNAME: &str = "willow";
