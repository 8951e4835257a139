//! Synchronization engine
//!
//! Ties the console client, surface driver, and lighting sink together
//! through the shared strip table:
//!
//! - `sync`: the periodic reconciliation loop pulling console state
//!   onto the surface (touch arbitration, deadbanding, gain rings)
//! - `input`: the dispatcher consuming surface events and writing
//!   through to the console/lights
//! - `refresh`: the full display/fader/mute/gain resync used on page
//!   switches, reconnects, and startup
//! - `supervisor`: transport liveness checks and reconnection

mod input;
mod refresh;
mod supervisor;
mod sync;


use crate::config::AppConfig;
use crate::console::ConsolePort;
use crate::lighting::LightPort;
use crate::state::SharedState;
use crate::surface::SurfacePort;
use std::sync::atomic::AtomicU32;
use std::sync::Arc;

/// The synchronization engine.
///
/// All transports are behind port traits so the engine logic can be
/// driven deterministically in tests.
pub struct Bridge {
    pub(crate) console: Arc<dyn ConsolePort>,
    pub(crate) surface: Arc<dyn SurfacePort>,
    pub(crate) lights: Arc<dyn LightPort>,
    pub(crate) state: Arc<SharedState>,
    pub(crate) config: AppConfig,
    /// Consecutive failed reconciliation ticks
    pub(crate) tick_failures: AtomicU32,
    /// Consecutive failed surface reconnect attempts
    pub(crate) reconnect_failures: AtomicU32,
}

impl Bridge {
    pub fn new(
        console: Arc<dyn ConsolePort>,
        surface: Arc<dyn SurfacePort>,
        lights: Arc<dyn LightPort>,
        state: Arc<SharedState>,
        config: AppConfig,
    ) -> Self {
        Self {
            console,
            surface,
            lights,
            state,
            config,
            tick_failures: AtomicU32::new(0),
            reconnect_failures: AtomicU32::new(0),
        }
    }
}
