//! Boot-time walk of the device state register up to `Ready`.

use embassy_sync::blocking_mutex::raw::RawMutex;
use log::{info, warn};

use crate::{
    DeviceContext,
    config::{ConfigStorage, LoadOutcome},
    state::{DeviceState, TransitionError},
};

/// Drives `Init -> StorageReady -> ConfigReady -> Ready`, one bring-up at a time.
pub struct BootSequence<'a, M: RawMutex> {
    ctx: DeviceContext<'a, M>,
}

impl<'a, M: RawMutex> BootSequence<'a, M> {
    pub const fn new(ctx: DeviceContext<'a, M>) -> Self {
        Self { ctx }
    }

    /// Storage mount result; the device stays in `Init` on failure.
    pub fn storage_mounted<E: core::fmt::Debug>(
        &self,
        mounted: Result<(), E>,
    ) -> Result<DeviceState, TransitionError> {
        match mounted {
            Ok(()) => self.advance(DeviceState::StorageReady),
            Err(err) => {
                warn!("boot: storage mount failed: {:?}", err);
                Ok(self.ctx.state.current())
            }
        }
    }

    /// Loads the persisted configuration and moves to `ConfigReady`.
    ///
    /// Every outcome advances: lookups are total, and an unprovisioned or
    /// corrupted device still has to accept a new document.
    pub fn load_config<S: ConfigStorage>(
        &self,
        storage: &mut S,
    ) -> Result<LoadOutcome, TransitionError> {
        let current = self.ctx.state.current();
        if !current.can_advance_to(DeviceState::ConfigReady) {
            return Err(TransitionError {
                from: current,
                to: DeviceState::ConfigReady,
            });
        }

        let outcome = self.ctx.config.load(storage);
        info!("boot: config load outcome {:?}", outcome);
        self.advance(DeviceState::ConfigReady)?;
        Ok(outcome)
    }

    /// Peripheral and UI bring-up result; `Ready` only on success.
    pub fn peripherals_started<E: core::fmt::Debug>(
        &self,
        started: Result<(), E>,
    ) -> Result<DeviceState, TransitionError> {
        match started {
            Ok(()) => self.advance(DeviceState::Ready),
            Err(err) => {
                warn!("boot: peripheral bring-up failed: {:?}", err);
                Ok(self.ctx.state.current())
            }
        }
    }

    fn advance(&self, next: DeviceState) -> Result<DeviceState, TransitionError> {
        self.ctx.state.advance_to(next)?;
        info!("boot: {}", next);
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

    use super::*;
    use crate::{
        config::{ConfigStore, ConfigWriter, MemoryStorage},
        state::DeviceStateRegister,
    };

    #[test]
    fn clean_boot_reaches_ready() {
        let state = DeviceStateRegister::new();
        let config = ConfigStore::<CriticalSectionRawMutex>::new();
        let boot = BootSequence::new(DeviceContext::new(&state, &config));
        let mut storage = MemoryStorage::with_contents(br#"{"display_timeout": 5000}"#);

        assert_eq!(boot.storage_mounted::<()>(Ok(())), Ok(DeviceState::StorageReady));
        assert_eq!(boot.load_config(&mut storage), Ok(LoadOutcome::Loaded));
        assert_eq!(boot.peripherals_started::<()>(Ok(())), Ok(DeviceState::Ready));
        assert!(state.is_ready());
    }

    #[test]
    fn unprovisioned_device_still_boots() {
        let state = DeviceStateRegister::new();
        let config = ConfigStore::<CriticalSectionRawMutex>::new();
        let boot = BootSequence::new(DeviceContext::new(&state, &config));

        boot.storage_mounted::<()>(Ok(())).unwrap();
        assert_eq!(
            boot.load_config(&mut MemoryStorage::new()),
            Ok(LoadOutcome::Absent)
        );
        boot.peripherals_started::<()>(Ok(())).unwrap();
        assert_eq!(state.current(), DeviceState::Ready);
    }

    /// Flash region holding a record this firmware cannot decode.
    struct CorruptedRecord;

    struct Unwritable;

    impl ConfigWriter for Unwritable {
        type Error = &'static str;

        fn write_all(&mut self, _bytes: &[u8]) -> Result<(), Self::Error> {
            Err("read-only")
        }

        fn close(self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    impl ConfigStorage for CorruptedRecord {
        type Error = &'static str;
        type Writer<'a> = Unwritable;

        fn read(&mut self) -> Result<Option<alloc::vec::Vec<u8>>, Self::Error> {
            Err("unrecognised record header")
        }

        fn open_truncate(&mut self) -> Result<Self::Writer<'_>, Self::Error> {
            Ok(Unwritable)
        }
    }

    #[test]
    fn corrupted_record_boots_with_invalid_config() {
        let state = DeviceStateRegister::new();
        let config = ConfigStore::<CriticalSectionRawMutex>::new();
        let boot = BootSequence::new(DeviceContext::new(&state, &config));

        boot.storage_mounted::<()>(Ok(())).unwrap();
        assert_eq!(
            boot.load_config(&mut CorruptedRecord),
            Ok(LoadOutcome::Invalid)
        );
        assert_eq!(state.current(), DeviceState::ConfigReady);
        assert!(!config.is_valid());
        assert_eq!(config.get_int("display_timeout", 15000), 15000);
    }

    #[test]
    fn mount_failure_blocks_config_load() {
        let state = DeviceStateRegister::new();
        let config = ConfigStore::<CriticalSectionRawMutex>::new();
        let boot = BootSequence::new(DeviceContext::new(&state, &config));

        assert_eq!(boot.storage_mounted(Err("no partition")), Ok(DeviceState::Init));
        let mut storage = MemoryStorage::with_contents(b"{}");
        assert!(boot.load_config(&mut storage).is_err());
        assert_eq!(state.current(), DeviceState::Init);
        assert!(!config.is_valid());
    }

    #[test]
    fn peripheral_failure_stops_short_of_ready() {
        let state = DeviceStateRegister::new();
        let config = ConfigStore::<CriticalSectionRawMutex>::new();
        let boot = BootSequence::new(DeviceContext::new(&state, &config));

        boot.storage_mounted::<()>(Ok(())).unwrap();
        boot.load_config(&mut MemoryStorage::new()).unwrap();
        assert_eq!(
            boot.peripherals_started(Err("panel not detected")),
            Ok(DeviceState::ConfigReady)
        );
        assert!(!state.is_ready());
    }
}
