//! Collaborators quiesced before the configuration file is rewritten.

use core::{
    convert::Infallible,
    sync::atomic::{AtomicBool, Ordering},
};

use log::info;
use willow_core::subsystem::Subsystem;

/// Audio capture/playback. The pipeline is not part of this firmware, so
/// stopping it is always a no-op.
pub(super) struct AudioPipeline;

impl Subsystem for AudioPipeline {
    type Error = Infallible;

    fn name(&self) -> &'static str {
        "audio"
    }

    fn deinitialize(&mut self) -> Result<(), Self::Error> {
        info!("audio: pipeline not running, nothing to stop");
        Ok(())
    }
}

/// Network side of the device: Wi-Fi station plus provisioning listener.
pub(super) struct NetworkEndpoint {
    stop: &'static AtomicBool,
}

impl NetworkEndpoint {
    pub(super) const fn new(stop: &'static AtomicBool) -> Self {
        Self { stop }
    }
}

impl Subsystem for NetworkEndpoint {
    type Error = Infallible;

    fn name(&self) -> &'static str {
        "endpoint"
    }

    fn deinitialize(&mut self) -> Result<(), Self::Error> {
        self.stop.store(true, Ordering::Release);
        Ok(())
    }
}
