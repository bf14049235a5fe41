//! Lifecycle coordination for the Willow voice appliance.
//!
//! Everything in here is board-agnostic: the ESP32-S3 crate plugs flash,
//! GPIO and panel adapters into the traits exposed by these modules.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod activity;
pub mod boot;
pub mod clock;
pub mod config;
pub mod display;
pub mod hardware;
pub mod input;
pub mod orchestrator;
pub mod restart;
pub mod state;
pub mod subsystem;

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::{config::ConfigStore, state::DeviceStateRegister};

/// Process-lifetime objects shared by every component.
///
/// Created once during boot and handed out by reference; nothing here is
/// torn down because the device restarts instead.
pub struct DeviceContext<'a, M: RawMutex> {
    pub state: &'a DeviceStateRegister,
    pub config: &'a ConfigStore<M>,
}

impl<M: RawMutex> Clone for DeviceContext<'_, M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M: RawMutex> Copy for DeviceContext<'_, M> {}

impl<'a, M: RawMutex> DeviceContext<'a, M> {
    pub const fn new(state: &'a DeviceStateRegister, config: &'a ConfigStore<M>) -> Self {
        Self { state, config }
    }
}
