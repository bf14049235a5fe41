//! 400x240 Sharp memory LCD geometry, wire encoding and framebuffer.

use core::convert::Infallible;

use embedded_graphics::{
    Pixel,
    draw_target::DrawTarget,
    geometry::{OriginDimensions, Size},
    pixelcolor::BinaryColor,
};

pub const WIDTH: usize = 400;
pub const HEIGHT: usize = 240;
pub const LINE_BYTES: usize = WIDTH / 8;
pub const BUFFER_SIZE: usize = LINE_BYTES * HEIGHT;

/// Gate address byte for line 1..=240, bit-reversed as the panel expects.
#[inline]
pub fn encode_line_address(line: u16) -> Option<u8> {
    if !(1..=HEIGHT as u16).contains(&line) {
        return None;
    }

    Some((line as u8).reverse_bits())
}

/// All-clear command: M2 set, plus two dummy bytes.
#[inline]
pub fn build_clear_packet(vcom_high: bool) -> [u8; 3] {
    [0x20 | if vcom_high { 0x40 } else { 0x00 }, 0x00, 0x00]
}

/// 1bpp frame, bit 7 of each byte is the leftmost pixel. A set bit is black.
#[derive(Clone)]
pub struct FrameBuffer {
    bytes: [u8; BUFFER_SIZE],
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuffer {
    pub const fn new() -> Self {
        Self {
            bytes: [0u8; BUFFER_SIZE],
        }
    }

    pub fn bytes(&self) -> &[u8; BUFFER_SIZE] {
        &self.bytes
    }

    pub fn clear(&mut self, on: bool) {
        self.bytes.fill(if on { 0xFF } else { 0x00 });
    }

    pub fn set_pixel(&mut self, x: usize, y: usize, on: bool) -> bool {
        if x >= WIDTH || y >= HEIGHT {
            return false;
        }

        let byte_index = y * LINE_BYTES + (x / 8);
        let bit_mask = 1u8 << (7 - (x % 8));

        if on {
            self.bytes[byte_index] |= bit_mask;
        } else {
            self.bytes[byte_index] &= !bit_mask;
        }

        true
    }

    /// Payload of line 1..=240.
    pub fn line(&self, line: u16) -> Option<&[u8]> {
        if !(1..=HEIGHT as u16).contains(&line) {
            return None;
        }

        let start = (line as usize - 1) * LINE_BYTES;
        Some(&self.bytes[start..start + LINE_BYTES])
    }
}

impl DrawTarget for FrameBuffer {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if point.x < 0 || point.y < 0 {
                continue;
            }

            let _ = self.set_pixel(point.x as usize, point.y as usize, color.is_on());
        }

        Ok(())
    }
}

impl OriginDimensions for FrameBuffer {
    fn size(&self) -> Size {
        Size::new(WIDTH as u32, HEIGHT as u32)
    }
}
