//! Reconciliation loop
//!
//! Every tick, the remote value of each strip on the current page is
//! pulled and pushed to the surface, unless a hand is on the fader
//! (touch arbitration) or the change is inside the deadband (motor
//! jitter and console quantization noise). Mute LEDs mirror the console
//! unconditionally; gain rings rewrite only on audible change.
//!
//! A tick is failed when no console fader query got an answer (or a
//! surface write errored); after enough consecutive failures a
//! connectivity check runs once and the counter restarts. A single
//! query hiccup never stalls the loop.

use super::Bridge;
use crate::curve;
use crate::page::{self, Page, StripTarget, STRIP_COUNT};
use crate::surface::{ButtonClass, RingMode};
use anyhow::{bail, Result};
use std::sync::atomic::Ordering;
use tokio::sync::watch;
use tracing::{debug, info, warn};

impl Bridge {
    /// Run the reconciliation loop until shutdown.
    pub async fn run_sync(self: std::sync::Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("Sync loop started ({} ms interval)", self.config.sync.interval_ms);
        let mut ticker = tokio::time::interval(self.config.sync.interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.sync_step().await,
                _ = shutdown.changed() => {
                    info!("Sync loop stopped");
                    return;
                }
            }
        }
    }

    /// One scheduled step: tick plus failure accounting and recovery.
    pub async fn sync_step(&self) {
        if !self.surface.is_connected() {
            debug!("Surface not connected, skipping sync tick");
            return;
        }

        match self.sync_tick().await {
            Ok(()) => {
                self.tick_failures.store(0, Ordering::Relaxed);
            }
            Err(e) => {
                let failures = self.tick_failures.fetch_add(1, Ordering::Relaxed) + 1;
                debug!("Sync tick failed (#{failures}): {e:#}");

                if failures >= self.config.sync.max_tick_failures {
                    warn!("Too many sync failures, checking console connectivity...");
                    if !self.console.check_connection().await {
                        warn!("Console unreachable");
                    }
                    self.tick_failures.store(0, Ordering::Relaxed);
                }
            }
        }
    }

    /// Reconcile every strip of the current page once.
    async fn sync_tick(&self) -> Result<()> {
        let (current, epoch) = self.state.page();

        let mut fader_queries = 0u32;
        let mut fader_answers = 0u32;

        for strip in 1..=STRIP_COUNT {
            // A page switch mid-tick invalidates the rest of this pass
            if !self.state.epoch_is_current(epoch) {
                debug!("Page changed mid-tick, aborting");
                return Ok(());
            }

            match page::resolve(current, strip) {
                StripTarget::Console(target) => {
                    fader_queries += 1;
                    if let Some(remote) = self.console.fader(target).await {
                        fader_answers += 1;
                        self.mirror_fader(strip, remote, epoch).await?;
                    }

                    let muted = self.console.mute(target).await;
                    if self.state.epoch_is_current(epoch) {
                        self.state.with_strip(strip, |s| s.is_muted = muted);
                        self.surface.set_led(strip, ButtonClass::Mute, muted).await?;
                    }

                    if let Some(channel) = page::console_channel(current, strip) {
                        self.sync_gain(strip, channel, epoch).await?;
                    }
                }
                StripTarget::Dimmer(channel) => {
                    let shadow = self.lights.value(channel);
                    self.mirror_fader(strip, shadow, epoch).await?;
                }
                StripTarget::HouseLights => {
                    // No readback and no touch sensor concern: the proxy
                    // fader simply follows the shadow average
                    self.surface.set_fader(strip, self.lights.house_average()).await?;
                }
                StripTarget::None => {}
            }
        }

        if fader_queries > 0 && fader_answers == 0 {
            bail!("no console response for any strip on page {current:?}");
        }
        Ok(())
    }

    /// Push a remote value to the motor fader, honoring touch and
    /// deadband. State and motor move together or not at all.
    async fn mirror_fader(&self, strip: u8, remote: u16, epoch: u64) -> Result<()> {
        if !self.state.epoch_is_current(epoch) {
            return Ok(());
        }
        let deadband = self.config.sync.deadband as i32;
        let push = self.state.with_strip(strip, |s| {
            if s.is_touched {
                // The hand wins; never fight it with the motor
                return false;
            }
            if (remote as i32 - s.last_stable_value as i32).abs() <= deadband {
                return false;
            }
            s.fader_value = remote;
            s.last_stable_value = remote;
            true
        });

        if push {
            debug!("Strip {strip} follows remote -> {remote}");
            self.surface.set_fader(strip, remote).await?;
        }
        Ok(())
    }

    /// Mirror preamp gain to the encoder ring when it moved audibly.
    async fn sync_gain(&self, strip: u8, channel: u8, epoch: u64) -> Result<()> {
        let Some(source) = self.console.channel_input_source(channel).await else {
            return Ok(());
        };
        let Some(gain) = self.console.gain(&source).await else {
            return Ok(());
        };
        if !self.state.epoch_is_current(epoch) {
            return Ok(());
        }

        let epsilon = self.config.sync.gain_epsilon_db;
        let changed = self.state.with_strip(strip, |s| {
            if (gain - s.gain_db).abs() > epsilon {
                s.gain_db = gain;
                true
            } else {
                false
            }
        });

        if changed {
            let ring = curve::gain_ring_index(gain, self.config.console.gain_max);
            self.surface.set_encoder_ring(strip, ring, RingMode::Pan).await?;
        }
        Ok(())
    }

    /// Current page snapshot helper for callers outside this module.
    pub fn current_page(&self) -> Page {
        self.state.page().0
    }
}
