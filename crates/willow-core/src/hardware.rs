//! Supported board variants.

use core::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum HardwareKind {
    Unsupported = 0,
    Esp32S3Box = 1,
    Esp32S3BoxLite = 2,
    Esp32S3Box3 = 3,
}

impl HardwareKind {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Esp32S3Box,
            2 => Self::Esp32S3BoxLite,
            3 => Self::Esp32S3Box3,
            _ => Self::Unsupported,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Unsupported => "UNSUPPORTED_HARDWARE",
            Self::Esp32S3Box => "ESP32-S3-BOX",
            Self::Esp32S3BoxLite => "ESP32-S3-BOX-LITE",
            Self::Esp32S3Box3 => "ESP32-S3-BOX-3",
        }
    }

    /// Lite and unknown boards have buttons only.
    pub const fn has_touch(self) -> bool {
        matches!(self, Self::Esp32S3Box | Self::Esp32S3Box3)
    }
}

impl fmt::Display for HardwareKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_box_and_box3_have_touch() {
        assert!(HardwareKind::Esp32S3Box.has_touch());
        assert!(HardwareKind::Esp32S3Box3.has_touch());
        assert!(!HardwareKind::Esp32S3BoxLite.has_touch());
        assert!(!HardwareKind::Unsupported.has_touch());
    }

    #[test]
    fn unknown_ids_are_unsupported() {
        assert_eq!(HardwareKind::from_raw(3), HardwareKind::Esp32S3Box3);
        assert_eq!(HardwareKind::from_raw(4), HardwareKind::Unsupported);
        assert_eq!(HardwareKind::from_raw(200).label(), "UNSUPPORTED_HARDWARE");
    }
}
