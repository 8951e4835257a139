//! DMX dimmer line sink
//!
//! Writes line-delimited `"{channel},{value}"` commands to a USB serial
//! DMX dongle and keeps an in-memory shadow of the last value written
//! per channel; DMX has no readback, so the shadow is the only source
//! of truth for what the lights are doing.

use crate::config::LightingConfig;
use crate::curve::FADER_MAX;
use async_trait::async_trait;
use parking_lot::Mutex;
use serialport::{SerialPort, SerialPortType};
use std::io::Write;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Highest addressable DMX channel.
pub const DMX_CHANNELS: u16 = 512;

/// Lighting operations the sync engine depends on.
///
/// Values are in the normalized 0-1000 position domain; the 0-255 DMX
/// scaling happens inside the sink.
#[async_trait]
pub trait LightPort: Send + Sync {
    /// Write a channel value. A no-op (with a warning) when the serial
    /// link is down.
    fn send(&self, channel: u16, position: u16);

    /// Last written value for a channel (0 if out of range).
    fn value(&self, channel: u16) -> u16;

    /// Average of channels 1-4, driving the house-lights fader proxy.
    fn house_average(&self) -> u16;

    /// Zero every channel (fail-safe blackout).
    fn blackout(&self);

    fn is_open(&self) -> bool;

    /// Scan serial ports for the dongle and (re)open the link.
    async fn reopen(&self) -> bool;
}

struct LinkState {
    port: Option<Box<dyn SerialPort>>,
    shadow: [u16; DMX_CHANNELS as usize + 1],
}

/// Serial DMX link with per-channel shadow state.
pub struct DmxLink {
    baud_rate: u32,
    port_hints: Vec<String>,
    link: Mutex<LinkState>,
}

impl DmxLink {
    pub fn new(config: &LightingConfig) -> Self {
        Self {
            baud_rate: config.baud_rate,
            port_hints: config.port_hints.clone(),
            link: Mutex::new(LinkState {
                port: None,
                shadow: [0; DMX_CHANNELS as usize + 1],
            }),
        }
    }

    /// Find a serial port whose USB description matches one of the hints.
    fn find_port(&self) -> Option<String> {
        let ports = match serialport::available_ports() {
            Ok(ports) => ports,
            Err(e) => {
                warn!("Serial port enumeration failed: {e}");
                return None;
            }
        };

        for info in ports {
            let description = match &info.port_type {
                SerialPortType::UsbPort(usb) => {
                    let product = usb.product.clone().unwrap_or_default();
                    let manufacturer = usb.manufacturer.clone().unwrap_or_default();
                    format!("{product} {manufacturer}")
                }
                _ => info.port_name.clone(),
            }
            .to_uppercase();

            if self.port_hints.iter().any(|hint| description.contains(hint)) {
                return Some(info.port_name);
            }
        }
        None
    }

    pub fn close(&self) {
        self.link.lock().port = None;
    }
}

/// Linear 0-1000 position to 0-255 DMX scaling, clamped.
fn to_dmx(position: u16) -> u8 {
    (position.min(FADER_MAX) as u32 * 255 / FADER_MAX as u32) as u8
}

#[async_trait]
impl LightPort for DmxLink {
    fn send(&self, channel: u16, position: u16) {
        if !(1..=DMX_CHANNELS).contains(&channel) {
            warn!("DMX channel {channel} out of range");
            return;
        }

        let mut guard = self.link.lock();
        let link = &mut *guard;
        let Some(port) = link.port.as_mut() else {
            warn!("DMX link not open, dropping channel {channel} update");
            return;
        };

        let position = position.min(FADER_MAX);
        let line = format!("{},{}\n", channel, to_dmx(position));
        match port.write_all(line.as_bytes()) {
            Ok(()) => {
                link.shadow[channel as usize] = position;
            }
            Err(e) => {
                warn!("DMX write failed, closing link: {e}");
                link.port = None;
            }
        }
    }

    fn value(&self, channel: u16) -> u16 {
        if !(1..=DMX_CHANNELS).contains(&channel) {
            warn!("Queried DMX channel {channel} out of range");
            return 0;
        }
        self.link.lock().shadow[channel as usize]
    }

    fn house_average(&self) -> u16 {
        let link = self.link.lock();
        let sum: u32 = link.shadow[1..=4].iter().map(|&v| v as u32).sum();
        (sum / 4) as u16
    }

    fn blackout(&self) {
        if !self.is_open() {
            warn!("DMX link not open, cannot black out");
            return;
        }
        info!("Blacking out all {DMX_CHANNELS} DMX channels");
        for channel in 1..=DMX_CHANNELS {
            self.send(channel, 0);
        }
    }

    fn is_open(&self) -> bool {
        self.link.lock().port.is_some()
    }

    async fn reopen(&self) -> bool {
        self.close();

        let Some(name) = self.find_port() else {
            debug!("No serial port matching {:?}", self.port_hints);
            return false;
        };

        let port = match serialport::new(&name, self.baud_rate)
            .timeout(Duration::from_secs(1))
            .open()
        {
            Ok(port) => port,
            Err(e) => {
                warn!("Failed to open DMX port {name}: {e}");
                return false;
            }
        };

        // The dongle's microcontroller reboots on port open; give it
        // time to come up before the first command
        tokio::time::sleep(Duration::from_secs(2)).await;

        self.link.lock().port = Some(port);
        info!("✓ DMX link open on {name} at {} baud", self.baud_rate);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed_link() -> DmxLink {
        DmxLink::new(&LightingConfig::default())
    }

    #[test]
    fn dmx_scaling() {
        assert_eq!(to_dmx(0), 0);
        assert_eq!(to_dmx(1000), 255);
        assert_eq!(to_dmx(500), 127);
        // Out-of-range input clamps instead of wrapping
        assert_eq!(to_dmx(5000), 255);
    }

    #[test]
    fn closed_link_drops_writes() {
        let link = closed_link();
        link.send(1, 800);
        // Shadow only tracks values actually written to the wire
        assert_eq!(link.value(1), 0);
        assert!(!link.is_open());
    }

    #[test]
    fn out_of_range_channel_reads_zero() {
        let link = closed_link();
        assert_eq!(link.value(0), 0);
        assert_eq!(link.value(513), 0);
    }

    #[test]
    fn house_average_over_channels_one_to_four() {
        let link = closed_link();
        {
            let mut state = link.link.lock();
            state.shadow[1] = 1000;
            state.shadow[2] = 500;
            state.shadow[3] = 500;
            state.shadow[4] = 0;
            state.shadow[5] = 1000; // not part of the average
        }
        assert_eq!(link.house_average(), 500);
    }
}
