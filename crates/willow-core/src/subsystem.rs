//! Dependent subsystems that must be quiesced before flash writes.

use core::fmt::Debug;

/// A collaborator that can be shut down ahead of a reconfiguration.
///
/// `deinitialize` must be safe to call when the subsystem never finished
/// starting. Errors are reported back, never raised.
pub trait Subsystem {
    type Error: Debug;

    fn name(&self) -> &'static str;
    fn deinitialize(&mut self) -> Result<(), Self::Error>;
}

impl<S: Subsystem + ?Sized> Subsystem for &mut S {
    type Error = S::Error;

    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn deinitialize(&mut self) -> Result<(), Self::Error> {
        (**self).deinitialize()
    }
}

/// How a quiesce attempt ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum QuiesceResult {
    Stopped,
    Failed,
}
