//! Reconfiguration: persist a new document, show confirmation, reboot.
//!
//! The run is one linear sequence. Each step's result is recorded in the
//! report but never cuts the sequence short, since the restart at the end
//! recovers from anything that went wrong in between.

use core::fmt;

use embassy_sync::blocking_mutex::raw::RawMutex;
use log::{error, info, warn};

use crate::{
    DeviceContext,
    activity::{ActivityCoordinator, Backlight},
    clock::Clock,
    config::{
        ConfigError, ConfigStorage, LoadOutcome,
        keys::{DEFAULT_LOCK_TIMEOUT_MS, LOCK_TIMEOUT},
    },
    display::{CONFIG_UPDATED_TEXT, DisplayAccess, show_confirmation},
    restart::{DelayedRestart, RESTART_DELAY_MS},
    state::DeviceState,
    subsystem::{QuiesceResult, Subsystem},
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReconfigureError {
    /// Requests are only accepted while the device is fully operational.
    NotReady(DeviceState),
}

impl fmt::Display for ReconfigureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady(state) => write!(f, "reconfiguration rejected in state {}", state),
        }
    }
}

/// What happened to the new document on flash.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Persisted {
    Written(LoadOutcome),
    OpenFailed,
    WriteFailed,
}

impl Persisted {
    pub const fn is_written(self) -> bool {
        matches!(self, Self::Written(_))
    }
}

/// Step-by-step record of one reconfiguration run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReconfigureReport {
    pub audio: QuiesceResult,
    pub endpoint: QuiesceResult,
    pub persisted: Persisted,
    pub screen_updated: bool,
    pub restart_at_ms: u64,
}

/// Owns the collaborators touched by a reconfiguration.
pub struct Orchestrator<'a, M, S, D, A, E, C>
where
    M: RawMutex,
    S: ConfigStorage,
    D: DisplayAccess,
    A: Subsystem,
    E: Subsystem,
    C: Clock,
{
    ctx: DeviceContext<'a, M>,
    storage: S,
    display: &'a D,
    audio: A,
    endpoint: E,
    clock: C,
}

impl<'a, M, S, D, A, E, C> Orchestrator<'a, M, S, D, A, E, C>
where
    M: RawMutex,
    S: ConfigStorage,
    D: DisplayAccess,
    A: Subsystem,
    E: Subsystem,
    C: Clock,
{
    pub fn new(
        ctx: DeviceContext<'a, M>,
        storage: S,
        display: &'a D,
        audio: A,
        endpoint: E,
        clock: C,
    ) -> Self {
        Self {
            ctx,
            storage,
            display,
            audio,
            endpoint,
            clock,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Runs the whole sequence for `text` once accepted.
    ///
    /// `text` is the complete new document and is persisted verbatim.
    pub fn reconfigure<B: Backlight>(
        &mut self,
        text: &str,
        activity: &mut ActivityCoordinator<'_, M, B>,
        restart: &mut DelayedRestart,
    ) -> Result<ReconfigureReport, ReconfigureError> {
        // Entered before teardown so concurrent readers stop treating the
        // device as operational.
        self.ctx
            .state
            .advance_to(DeviceState::WritingConfig)
            .map_err(|err| {
                warn!("reconfigure: {}", ReconfigureError::NotReady(err.from));
                ReconfigureError::NotReady(err.from)
            })?;
        info!("reconfigure: accepted {} byte document", text.len());

        let audio = quiesce(&mut self.audio);
        let endpoint = quiesce(&mut self.endpoint);

        let persisted = match self.ctx.config.write(&mut self.storage, text) {
            Ok(outcome) => Persisted::Written(outcome),
            Err(err @ ConfigError::Open(_)) => {
                error!("reconfigure: {}", err);
                Persisted::OpenFailed
            }
            Err(err) => {
                error!("reconfigure: {}", err);
                Persisted::WriteFailed
            }
        };

        let lock_timeout_ms = self
            .ctx
            .config
            .get_millis(LOCK_TIMEOUT, DEFAULT_LOCK_TIMEOUT_MS);
        let screen_updated = match self.display.try_lock_for(lock_timeout_ms) {
            Some(mut surface) => {
                show_confirmation(&mut *surface, CONFIG_UPDATED_TEXT);
                true
            }
            None => {
                warn!(
                    "reconfigure: display lock timed out after {}ms, skipping UI update",
                    lock_timeout_ms
                );
                false
            }
        };

        activity.reset(self.clock.now_ms(), true);

        if let Err(err) = self.ctx.state.advance_to(DeviceState::Restarting) {
            error!("reconfigure: {}", err);
        }
        let restart_at_ms = restart.schedule(self.clock.now_ms(), RESTART_DELAY_MS);
        info!(
            "reconfigure: persisted={:?} screen_updated={}, restarting",
            persisted, screen_updated
        );

        Ok(ReconfigureReport {
            audio,
            endpoint,
            persisted,
            screen_updated,
            restart_at_ms,
        })
    }
}

fn quiesce<S: Subsystem>(subsystem: &mut S) -> QuiesceResult {
    match subsystem.deinitialize() {
        Ok(()) => {
            info!("reconfigure: {} stopped", subsystem.name());
            QuiesceResult::Stopped
        }
        Err(err) => {
            warn!(
                "reconfigure: {} deinit failed, continuing: {:?}",
                subsystem.name(),
                err
            );
            QuiesceResult::Failed
        }
    }
}
