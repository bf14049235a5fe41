use embedded_graphics::{
    Drawable,
    geometry::Point,
    mono_font::{MonoTextStyle, ascii::FONT_10X20},
    pixelcolor::BinaryColor,
    text::{Alignment, Text},
};

use willow_core::display::{StatusLabel, StatusLabels};

use super::panel::{FrameBuffer, WIDTH};

const FIRST_BASELINE_Y: i32 = 32;
const LINE_PITCH_Y: i32 = 44;

/// Draws the visible status lines centred, one slot per label.
pub fn render_labels(labels: &StatusLabels, frame: &mut FrameBuffer) {
    frame.clear(false);
    let style = MonoTextStyle::new(&FONT_10X20, BinaryColor::On);

    for (slot, label) in StatusLabel::ALL.into_iter().enumerate() {
        if labels.is_hidden(label) {
            continue;
        }
        let text = labels.text(label);
        if text.is_empty() {
            continue;
        }

        let origin = Point::new(
            WIDTH as i32 / 2,
            FIRST_BASELINE_Y + slot as i32 * LINE_PITCH_Y,
        );
        let _ = Text::with_alignment(text, origin, style, Alignment::Center).draw(frame);
    }
}
