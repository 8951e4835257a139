//! Full page refresh
//!
//! Rebuilds the entire surface for a page: labels and colors, motor
//! faders, mute LEDs, gain rings. Used on page switches, after a surface
//! reconnect, and once at startup. Deliberately a full rewrite rather
//! than incremental, since paging changes the identity of every strip.
//!
//! Refresh is best-effort: an unreadable value skips that strip for now
//! (the reconciliation loop will catch it up), and surface write errors
//! are logged, not propagated.

use super::Bridge;
use crate::curve;
use crate::page::{self, Page, StripTarget, STRIP_COUNT};
use crate::surface::{ButtonClass, RingMode};
use tracing::{debug, warn};

impl Bridge {
    /// Resync display, faders, mutes, and gain rings for a page.
    pub async fn full_refresh(&self, current: Page) {
        debug!("Full refresh for page {current:?}");
        self.refresh_display(current).await;
        self.refresh_faders(current).await;
        self.refresh_mutes(current).await;
        self.refresh_gains(current).await;
    }

    async fn refresh_display(&self, current: Page) {
        let labels = page::labels(current);
        let colors = page::colors(current);
        for strip in 1..=STRIP_COUNT {
            let i = (strip - 1) as usize;
            if let Err(e) = self.surface.set_text(strip, labels[i]).await {
                warn!("Label update for strip {strip} failed: {e:#}");
            }
            if let Err(e) = self.surface.set_color(strip, colors[i]).await {
                warn!("Color update for strip {strip} failed: {e:#}");
            }
        }
    }

    async fn refresh_faders(&self, current: Page) {
        for strip in 1..=STRIP_COUNT {
            match page::resolve(current, strip) {
                StripTarget::Console(target) => {
                    let Some(position) = self.console.fader(target).await else {
                        debug!("Fader for {target} unreadable, skipping");
                        continue;
                    };
                    self.apply_fader(strip, position).await;
                }
                StripTarget::HouseLights => {
                    self.apply_fader(strip, self.lights.house_average()).await;
                }
                StripTarget::Dimmer(channel) => {
                    self.apply_fader(strip, self.lights.value(channel)).await;
                }
                StripTarget::None => {}
            }
        }
    }

    /// Move a motor and seed the deadband baseline with the same value.
    async fn apply_fader(&self, strip: u8, position: u16) {
        self.state.with_strip(strip, |s| {
            s.fader_value = position;
            s.last_stable_value = position;
        });
        if let Err(e) = self.surface.set_fader(strip, position).await {
            warn!("Fader update for strip {strip} failed: {e:#}");
        }
    }

    async fn refresh_mutes(&self, current: Page) {
        for strip in 1..=STRIP_COUNT {
            let muted = match page::resolve(current, strip) {
                StripTarget::Console(target) => self.console.mute(target).await,
                _ => false,
            };
            self.state.with_strip(strip, |s| s.is_muted = muted);
            if let Err(e) = self.surface.set_led(strip, ButtonClass::Mute, muted).await {
                warn!("Mute LED for strip {strip} failed: {e:#}");
            }
        }
    }

    async fn refresh_gains(&self, current: Page) {
        for strip in 1..=STRIP_COUNT {
            let Some(channel) = page::console_channel(current, strip) else {
                continue;
            };
            let Some(source) = self.console.channel_input_source(channel).await else {
                continue;
            };
            let Some(gain) = self.console.gain(&source).await else {
                // Unreadable gain: leave the ring alone rather than guess
                continue;
            };

            self.state.with_strip(strip, |s| s.gain_db = gain);
            let ring = curve::gain_ring_index(gain, self.config.console.gain_max);
            if let Err(e) = self.surface.set_encoder_ring(strip, ring, RingMode::Pan).await {
                warn!("Gain ring for strip {strip} failed: {e:#}");
            }
        }
    }
}
