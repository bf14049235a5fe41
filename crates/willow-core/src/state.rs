//! Process-wide lifecycle phase shared between boot, UI and reconfiguration.

use core::{
    fmt,
    sync::atomic::{AtomicU8, Ordering},
};

use log::{debug, warn};

/// Coarse lifecycle phase of the device.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
#[repr(u8)]
pub enum DeviceState {
    Init = 0,
    StorageReady = 1,
    ConfigReady = 2,
    Ready = 3,
    WritingConfig = 4,
    Restarting = 5,
}

impl DeviceState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::StorageReady,
            2 => Self::ConfigReady,
            3 => Self::Ready,
            4 => Self::WritingConfig,
            5 => Self::Restarting,
            _ => Self::Init,
        }
    }

    /// The single phase that may follow `self`, if any.
    pub const fn successor(self) -> Option<Self> {
        match self {
            Self::Init => Some(Self::StorageReady),
            Self::StorageReady => Some(Self::ConfigReady),
            Self::ConfigReady => Some(Self::Ready),
            Self::Ready => Some(Self::WritingConfig),
            Self::WritingConfig => Some(Self::Restarting),
            Self::Restarting => None,
        }
    }

    pub fn can_advance_to(self, next: Self) -> bool {
        self.successor() == Some(next)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::StorageReady => "storage_ready",
            Self::ConfigReady => "config_ready",
            Self::Ready => "ready",
            Self::WritingConfig => "writing_config",
            Self::Restarting => "restarting",
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected state change; the register is left untouched.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TransitionError {
    pub from: DeviceState,
    pub to: DeviceState,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "illegal state transition {} -> {}", self.from, self.to)
    }
}

/// Lock-free device state that only ever moves one step forward.
#[derive(Debug)]
pub struct DeviceStateRegister {
    state: AtomicU8,
}

impl DeviceStateRegister {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(DeviceState::Init as u8),
        }
    }

    pub fn current(&self) -> DeviceState {
        DeviceState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// Gate for actions that need the device fully operational.
    pub fn is_ready(&self) -> bool {
        self.current() == DeviceState::Ready
    }

    /// Moves to `next` if it is the direct successor of the current phase.
    pub fn advance_to(&self, next: DeviceState) -> Result<DeviceState, TransitionError> {
        let mut current = self.current();
        loop {
            if !current.can_advance_to(next) {
                warn!("state: rejected {} -> {}", current, next);
                return Err(TransitionError {
                    from: current,
                    to: next,
                });
            }

            match self.state.compare_exchange(
                current as u8,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    debug!("state: {} -> {}", current, next);
                    return Ok(current);
                }
                Err(raw) => current = DeviceState::from_raw(raw),
            }
        }
    }
}

impl Default for DeviceStateRegister {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [DeviceState; 6] = [
        DeviceState::Init,
        DeviceState::StorageReady,
        DeviceState::ConfigReady,
        DeviceState::Ready,
        DeviceState::WritingConfig,
        DeviceState::Restarting,
    ];

    #[test]
    fn starts_in_init() {
        let register = DeviceStateRegister::new();
        assert_eq!(register.current(), DeviceState::Init);
        assert!(!register.is_ready());
    }

    #[test]
    fn walks_the_full_lifecycle_in_order() {
        let register = DeviceStateRegister::new();
        for pair in ALL.windows(2) {
            assert_eq!(register.advance_to(pair[1]), Ok(pair[0]));
            assert_eq!(register.current(), pair[1]);
        }
        assert!(register.current().successor().is_none());
    }

    #[test]
    fn only_direct_successors_are_legal() {
        for from in ALL {
            for to in ALL {
                let legal = (from as u8) + 1 == to as u8;
                assert_eq!(from.can_advance_to(to), legal, "{from} -> {to}");
            }
        }
    }

    #[test]
    fn rejected_transition_leaves_state_untouched() {
        let register = DeviceStateRegister::new();
        register.advance_to(DeviceState::StorageReady).unwrap();

        let err = register.advance_to(DeviceState::Ready).unwrap_err();
        assert_eq!(
            err,
            TransitionError {
                from: DeviceState::StorageReady,
                to: DeviceState::Ready,
            }
        );
        assert_eq!(register.current(), DeviceState::StorageReady);
    }

    #[test]
    fn writing_config_can_only_become_restarting() {
        let register = DeviceStateRegister::new();
        for next in &ALL[1..5] {
            register.advance_to(*next).unwrap();
        }
        assert!(register.advance_to(DeviceState::Ready).is_err());
        assert!(register.advance_to(DeviceState::WritingConfig).is_err());
        assert!(register.advance_to(DeviceState::Restarting).is_ok());
        assert!(register.advance_to(DeviceState::Init).is_err());
        assert_eq!(register.current(), DeviceState::Restarting);
    }

    #[test]
    fn ready_is_exactly_ready() {
        let register = DeviceStateRegister::new();
        for next in &ALL[1..] {
            register.advance_to(*next).unwrap();
            assert_eq!(register.is_ready(), *next == DeviceState::Ready);
        }
    }
}
