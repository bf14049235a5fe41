//! User interaction events feeding the inactivity timer.

/// Edge of a touch or button interaction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InputEvent {
    Press,
    Release,
}

/// Polled input provider.
pub trait InputProvider {
    type Error;

    fn poll_event(&mut self) -> Result<Option<InputEvent>, Self::Error>;
}
