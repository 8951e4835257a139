//! Surface event dispatching
//!
//! A single task consumes the surface event channel in arrival order and
//! writes through to the console or the lights. The same deadband used
//! by the reconciliation loop filters inbound fader motion, so a motor
//! move echoed back by the surface never bounces to the console.

use super::Bridge;
use crate::curve;
use crate::page::{self, Page, StripTarget, STRIP_COUNT};
use crate::surface::{ButtonClass, RingMode, SurfaceEvent};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

impl Bridge {
    /// Consume surface events until shutdown.
    pub async fn run_dispatch(
        self: std::sync::Arc<Self>,
        mut events: mpsc::Receiver<SurfaceEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("Event dispatcher started");
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        info!("Surface event channel closed");
                        return;
                    }
                },
                _ = shutdown.changed() => {
                    info!("Event dispatcher stopped");
                    return;
                }
            }
        }
    }

    /// React to one surface event.
    pub async fn handle_event(&self, event: SurfaceEvent) {
        match event {
            SurfaceEvent::FaderMoved { strip, position } => {
                self.on_fader_moved(strip, position).await
            }
            SurfaceEvent::ButtonPressed { strip, button } => {
                self.on_button_pressed(strip, button).await
            }
            SurfaceEvent::EncoderTurned { strip, delta } => {
                self.on_encoder_turned(strip, delta).await
            }
        }
    }

    async fn on_fader_moved(&self, strip: u8, position: u16) {
        let current = self.current_page();
        let deadband = self.config.sync.deadband as i32;

        let accepted = self.state.with_strip(strip, |s| {
            if (position as i32 - s.last_stable_value as i32).abs() < deadband {
                // Motor echo or transmission noise
                return false;
            }
            s.fader_value = position;
            s.last_stable_value = position;
            true
        });
        if !accepted {
            return;
        }

        match page::resolve(current, strip) {
            StripTarget::Console(target) => {
                if !self.console.set_fader(target, position).await {
                    debug!("Console fader set for {target} failed");
                }
            }
            StripTarget::HouseLights => {
                // One physical fader drives the whole house wash
                for channel in 1..=4 {
                    self.lights.send(channel, position);
                }
            }
            StripTarget::Dimmer(channel) => {
                self.lights.send(channel, position);
                // No readback from DMX: confirm the move on the motor
                if let Err(e) = self.surface.set_fader(strip, position).await {
                    debug!("Fader echo failed: {e:#}");
                }
            }
            StripTarget::None => {}
        }
    }

    async fn on_button_pressed(&self, strip: u8, button: ButtonClass) {
        match button {
            ButtonClass::Mute => self.toggle_mute(strip).await,
            ButtonClass::Select => self.switch_page(strip).await,
            ButtonClass::Rec | ButtonClass::Solo => {
                debug!("Unassigned {button:?} button on strip {strip}");
            }
        }
    }

    /// Toggle mute via read-modify-write against the console, so an
    /// out-of-band change on the console side still toggles correctly.
    async fn toggle_mute(&self, strip: u8) {
        let current = self.current_page();
        let StripTarget::Console(target) = page::resolve(current, strip) else {
            return;
        };

        let muted = self.console.mute(target).await;
        let desired = !muted;
        if !self.console.set_mute(target, desired).await {
            warn!("Mute set for {target} failed");
            return;
        }

        self.state.with_strip(strip, |s| s.is_muted = desired);
        if let Err(e) = self.surface.set_led(strip, ButtonClass::Mute, desired).await {
            warn!("Mute LED update failed: {e:#}");
        }
    }

    /// Switch pages: every strip changes identity, so baselines reset
    /// and the whole surface is refreshed rather than patched.
    async fn switch_page(&self, strip: u8) {
        let next = Page::from_select_strip(strip);
        info!("Switching to page {next:?}");

        // Epoch first: in-flight ticks stop writing before the reset
        self.state.set_page(next);
        self.state.reset_baselines();

        for s in 1..=STRIP_COUNT {
            let _ = self.surface.set_led(s, ButtonClass::Select, false).await;
            let _ = self.surface.set_encoder_ring(s, 0, RingMode::Single).await;
        }
        let _ = self.surface.set_led(strip, ButtonClass::Select, true).await;

        self.full_refresh(next).await;
    }

    /// Trim or boost the preamp feeding this strip's channel.
    async fn on_encoder_turned(&self, strip: u8, delta: i8) {
        let current = self.current_page();
        let Some(channel) = page::console_channel(current, strip) else {
            // Matrix and lighting strips have no preamp to trim
            return;
        };
        let Some(source) = self.console.channel_input_source(channel).await else {
            debug!("No input source routed to channel {channel}");
            return;
        };

        let console = &self.config.console;
        let gain = self.state.strip(strip).gain_db;
        let desired =
            (gain + console.gain_step * delta as f32).clamp(console.gain_min, console.gain_max);

        if !self.console.set_gain(&source, desired).await {
            // A failed write must not desync the ring from the console
            debug!("Gain set for {source} failed");
            return;
        }

        self.state.with_strip(strip, |s| s.gain_db = desired);
        let ring = curve::gain_ring_index(desired, console.gain_max);
        let _ = self.surface.set_encoder_ring(strip, ring, RingMode::Pan).await;
    }
}
