//! X-Touch Extender driver
//!
//! Owns the MIDI connection to the control surface. Inbound messages are
//! decoded in the MIDI callback: touch sensing writes the shared strip
//! table directly, everything else lands on a bounded event channel that
//! a single dispatcher task consumes in arrival order.
//!
//! The surface emits periodic traffic while healthy, so liveness is
//! judged by the age of the last received message, not just by whether
//! the port binding still exists.

pub mod decode;

pub use decode::{ButtonClass, SurfaceInput};

use crate::config::SurfaceConfig;
use crate::curve::FADER_MAX;
use crate::midi::{format_hex, MidiMessage};
use crate::page;
use crate::state::SharedState;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Scribble-strip backlight palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StripColor {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
}

impl StripColor {
    pub fn palette_index(&self) -> u8 {
        match self {
            StripColor::Black => 0,
            StripColor::Red => 1,
            StripColor::Green => 2,
            StripColor::Yellow => 3,
            StripColor::Blue => 4,
            StripColor::Magenta => 5,
            StripColor::Cyan => 6,
            StripColor::White => 7,
        }
    }
}

/// Encoder LED ring display modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingMode {
    Single,
    Pan,
    Fan,
    Spread,
}

impl RingMode {
    fn bits(&self) -> u8 {
        match self {
            RingMode::Single => 0,
            RingMode::Pan => 1,
            RingMode::Fan => 2,
            RingMode::Spread => 3,
        }
    }
}

/// A user action on the surface, as seen by the dispatcher.
///
/// Touch transitions are not events; they go straight into the strip
/// table from the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceEvent {
    FaderMoved { strip: u8, position: u16 },
    ButtonPressed { strip: u8, button: ButtonClass },
    EncoderTurned { strip: u8, delta: i8 },
}

/// Surface operations the sync engine depends on.
///
/// All output operations silently ignore strips outside 1-8.
#[async_trait]
pub trait SurfacePort: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Close and reopen the connection; restores the current page's
    /// display on success.
    async fn reconnect(&self) -> bool;

    /// Move a motorized fader (0-1000).
    async fn set_fader(&self, strip: u8, position: u16) -> Result<()>;

    /// Set a scribble-strip label (7 characters, space-padded).
    async fn set_text(&self, strip: u8, text: &str) -> Result<()>;

    /// Set a scribble-strip backlight color.
    async fn set_color(&self, strip: u8, color: StripColor) -> Result<()>;

    /// Set a button LED.
    async fn set_led(&self, strip: u8, button: ButtonClass, on: bool) -> Result<()>;

    /// Set an encoder LED ring (position 0-11).
    async fn set_encoder_ring(&self, strip: u8, position: u8, mode: RingMode) -> Result<()>;
}

/// MIDI driver for the X-Touch Extender.
pub struct SurfaceDriver {
    port_fragment: String,
    liveness_timeout: Duration,
    live_strips: Vec<u8>,
    state: Arc<SharedState>,
    event_tx: mpsc::Sender<SurfaceEvent>,
    input_conn: Mutex<Option<MidiInputConnection<()>>>,
    output_conn: Mutex<Option<MidiOutputConnection>>,
    last_rx: Arc<Mutex<Instant>>,
}

impl SurfaceDriver {
    /// Create the driver and the event channel its dispatcher will read.
    pub fn new(
        config: &SurfaceConfig,
        state: Arc<SharedState>,
    ) -> (Self, mpsc::Receiver<SurfaceEvent>) {
        let (event_tx, event_rx) = mpsc::channel(256);
        let driver = Self {
            port_fragment: config.port_fragment.clone(),
            liveness_timeout: config.liveness_timeout(),
            live_strips: config.live_strips.clone(),
            state,
            event_tx,
            input_conn: Mutex::new(None),
            output_conn: Mutex::new(None),
            last_rx: Arc::new(Mutex::new(Instant::now())),
        };
        (driver, event_rx)
    }

    /// Discover the device and bind both MIDI directions.
    pub async fn open(&self) -> Result<()> {
        self.close();

        let midi_out = MidiOutput::new("wingbridge-out")
            .map_err(|e| anyhow!("Failed to create MIDI output: {e}"))?;
        let out_port = self
            .find_port(midi_out.ports(), |p| midi_out.port_name(p).ok())
            .ok_or_else(|| {
                anyhow!(
                    "No MIDI output port matching '{}' (available: {:?})",
                    self.port_fragment,
                    output_port_names()
                )
            })?;
        let out_name = midi_out.port_name(&out_port).unwrap_or_default();
        info!("Using MIDI output port: {out_name}");

        let output_conn = midi_out
            .connect(&out_port, "wingbridge")
            .map_err(|e| anyhow!("Failed to connect output port: {e}"))?;

        let midi_in = MidiInput::new("wingbridge-in")
            .map_err(|e| anyhow!("Failed to create MIDI input: {e}"))?;
        let in_port = self
            .find_port(midi_in.ports(), |p| midi_in.port_name(p).ok())
            .ok_or_else(|| anyhow!("No MIDI input port matching '{}'", self.port_fragment))?;

        let state = self.state.clone();
        let event_tx = self.event_tx.clone();
        let last_rx = self.last_rx.clone();
        let live_strips = self.live_strips.clone();

        let input_conn = midi_in
            .connect(
                &in_port,
                "wingbridge",
                move |_timestamp, data, _| {
                    *last_rx.lock() = Instant::now();
                    handle_incoming(data, &state, &event_tx, &live_strips);
                },
                (),
            )
            .map_err(|e| anyhow!("Failed to connect input port: {e}"))?;

        *self.output_conn.lock() = Some(output_conn);
        *self.input_conn.lock() = Some(input_conn);
        *self.last_rx.lock() = Instant::now();

        self.init_display().await?;
        info!("✓ Surface connected on '{out_name}'");
        Ok(())
    }

    /// Drop both MIDI connections.
    pub fn close(&self) {
        self.input_conn.lock().take();
        self.output_conn.lock().take();
    }

    /// Find a port preferring an exact X-Touch name, falling back to the
    /// configured fragment (case-insensitive substring).
    fn find_port<P>(&self, ports: Vec<P>, name_of: impl Fn(&P) -> Option<String>) -> Option<P> {
        let mut named: Vec<(P, String)> = ports
            .into_iter()
            .filter_map(|p| {
                let name = name_of(&p)?;
                Some((p, name))
            })
            .collect();

        if let Some(i) = named.iter().position(|(_, name)| name.contains("X-TOUCH-")) {
            return Some(named.swap_remove(i).0);
        }
        let fragment = self.port_fragment.to_lowercase();
        if let Some(i) = named
            .iter()
            .position(|(_, name)| name.to_lowercase().contains(&fragment))
        {
            return Some(named.swap_remove(i).0);
        }
        None
    }

    /// All LEDs off, page display restored from shared state.
    async fn init_display(&self) -> Result<()> {
        debug!("Initializing surface display");
        for strip in 1..=page::STRIP_COUNT {
            for button in [
                ButtonClass::Rec,
                ButtonClass::Solo,
                ButtonClass::Mute,
                ButtonClass::Select,
            ] {
                self.set_led(strip, button, false).await?;
            }
        }

        let (current, _) = self.state.page();
        let labels = page::labels(current);
        let colors = page::colors(current);
        for strip in 1..=page::STRIP_COUNT {
            self.set_text(strip, labels[(strip - 1) as usize]).await?;
            self.set_color(strip, colors[(strip - 1) as usize]).await?;
        }
        if let Some(select) = current.select_strip() {
            self.set_led(select, ButtonClass::Select, true).await?;
        }
        Ok(())
    }

    fn send(&self, msg: &MidiMessage) -> Result<()> {
        let mut guard = self.output_conn.lock();
        let conn = guard
            .as_mut()
            .ok_or_else(|| anyhow!("Surface output not connected"))?;
        conn.send(&msg.encode())
            .map_err(|e| anyhow!("MIDI send failed: {e}"))?;
        Ok(())
    }
}

/// Decode one raw inbound message and route it.
///
/// Runs on the MIDI callback thread: touch flips the strip table in
/// place, fader moves are gated on touch (or the always-live strips,
/// which have no touch sensor), button releases are swallowed.
fn handle_incoming(
    data: &[u8],
    state: &SharedState,
    event_tx: &mpsc::Sender<SurfaceEvent>,
    live_strips: &[u8],
) {
    let Some(msg) = MidiMessage::parse(data) else {
        debug!("Unparseable MIDI from surface: {}", format_hex(data));
        return;
    };

    let event = match decode::decode(&msg) {
        Some(SurfaceInput::Touch { strip, touched }) => {
            debug!("Fader {strip} touch: {touched}");
            state.set_touched(strip, touched);
            return;
        }
        Some(SurfaceInput::Fader { strip, position }) => {
            if !state.is_touched(strip) && !live_strips.contains(&strip) {
                // Motor feedback echo, not a hand on the fader
                return;
            }
            SurfaceEvent::FaderMoved { strip, position }
        }
        Some(SurfaceInput::Encoder { strip, delta }) => SurfaceEvent::EncoderTurned { strip, delta },
        Some(SurfaceInput::Button { strip, button, pressed }) => {
            if !pressed {
                return;
            }
            SurfaceEvent::ButtonPressed { strip, button }
        }
        None => return,
    };

    if event_tx.try_send(event).is_err() {
        warn!("Surface event queue full, dropping {event:?}");
    }
}

fn strip_in_range(strip: u8) -> bool {
    (1..=page::STRIP_COUNT).contains(&strip)
}

#[async_trait]
impl SurfacePort for SurfaceDriver {
    fn is_connected(&self) -> bool {
        if self.input_conn.lock().is_none() || self.output_conn.lock().is_none() {
            return false;
        }
        // A healthy surface chats constantly; silence means the USB
        // link died even if the binding looks alive
        self.last_rx.lock().elapsed() <= self.liveness_timeout
    }

    async fn reconnect(&self) -> bool {
        info!("Attempting surface reconnect...");
        match self.open().await {
            Ok(()) => {
                info!("✓ Surface reconnect successful");
                true
            }
            Err(e) => {
                warn!("Surface reconnect failed: {e:#}");
                false
            }
        }
    }

    async fn set_fader(&self, strip: u8, position: u16) -> Result<()> {
        if !strip_in_range(strip) {
            return Ok(());
        }
        let position = position.min(FADER_MAX);
        self.send(&MidiMessage::PitchBend {
            channel: strip - 1,
            value: decode::pitch_bend_from_position(position),
        })
    }

    async fn set_text(&self, strip: u8, text: &str) -> Result<()> {
        if !strip_in_range(strip) {
            return Ok(());
        }
        let mut data = vec![0x00, 0x00, 0x66, 0x15, 0x12, (strip - 1) * 7];
        let mut bytes: Vec<u8> = text.chars().take(7).map(|c| (c as u8).min(0x7F)).collect();
        bytes.resize(7, b' ');
        data.extend_from_slice(&bytes);
        self.send(&MidiMessage::SysEx { data })
    }

    async fn set_color(&self, strip: u8, color: StripColor) -> Result<()> {
        if !strip_in_range(strip) {
            return Ok(());
        }
        let data = vec![0x00, 0x00, 0x66, 0x15, 0x72, strip - 1, color.palette_index()];
        self.send(&MidiMessage::SysEx { data })?;
        // The display chokes on back-to-back SysEx
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(())
    }

    async fn set_led(&self, strip: u8, button: ButtonClass, on: bool) -> Result<()> {
        if !strip_in_range(strip) {
            return Ok(());
        }
        self.send(&MidiMessage::NoteOn {
            channel: 0,
            note: button.note_base() + strip - 1,
            velocity: if on { 127 } else { 0 },
        })
    }

    async fn set_encoder_ring(&self, strip: u8, position: u8, mode: RingMode) -> Result<()> {
        if !strip_in_range(strip) {
            return Ok(());
        }
        self.send(&MidiMessage::ControlChange {
            channel: 0,
            cc: 47 + strip,
            value: (mode.bits() << 4) | (position & 0x0F),
        })
    }
}

fn output_port_names() -> Vec<String> {
    let Ok(midi_out) = MidiOutput::new("wingbridge-scan") else {
        return vec![];
    };
    midi_out
        .ports()
        .iter()
        .filter_map(|p| midi_out.port_name(p).ok())
        .collect()
}

/// List available MIDI ports (for `--list-ports`).
pub fn list_ports() -> Result<(Vec<String>, Vec<String>)> {
    let midi_in =
        MidiInput::new("wingbridge-scan").map_err(|e| anyhow!("MIDI input unavailable: {e}"))?;
    let inputs = midi_in
        .ports()
        .iter()
        .filter_map(|p| midi_in.port_name(p).ok())
        .collect();
    Ok((inputs, output_port_names()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_indices_match_the_device() {
        assert_eq!(StripColor::Black.palette_index(), 0);
        assert_eq!(StripColor::Red.palette_index(), 1);
        assert_eq!(StripColor::White.palette_index(), 7);
    }

    #[test]
    fn ring_mode_bits() {
        assert_eq!(RingMode::Single.bits(), 0);
        assert_eq!(RingMode::Pan.bits(), 1);
        assert_eq!(RingMode::Spread.bits(), 3);
    }

    #[test]
    fn touch_gates_fader_events() {
        let state = Arc::new(SharedState::new());
        let (tx, mut rx) = mpsc::channel(16);
        let live = vec![5, 7];

        // Untouched strip 1: motor echo, dropped
        let fader = MidiMessage::PitchBend { channel: 0, value: 8192 }.encode();
        handle_incoming(&fader, &state, &tx, &live);
        assert!(rx.try_recv().is_err());

        // Touch, then move: forwarded
        let touch = MidiMessage::NoteOn { channel: 0, note: 104, velocity: 127 }.encode();
        handle_incoming(&touch, &state, &tx, &live);
        assert!(state.is_touched(1));
        handle_incoming(&fader, &state, &tx, &live);
        assert_eq!(
            rx.try_recv().ok(),
            Some(SurfaceEvent::FaderMoved { strip: 1, position: 500 })
        );

        // Strip 5 has no touch sensor but is always live
        let fader5 = MidiMessage::PitchBend { channel: 4, value: 0 }.encode();
        handle_incoming(&fader5, &state, &tx, &live);
        assert_eq!(
            rx.try_recv().ok(),
            Some(SurfaceEvent::FaderMoved { strip: 5, position: 0 })
        );
    }

    #[test]
    fn button_release_not_forwarded() {
        let state = Arc::new(SharedState::new());
        let (tx, mut rx) = mpsc::channel(16);

        let press = MidiMessage::NoteOn { channel: 0, note: 16, velocity: 127 }.encode();
        let release = MidiMessage::NoteOn { channel: 0, note: 16, velocity: 0 }.encode();
        handle_incoming(&press, &state, &tx, &[]);
        handle_incoming(&release, &state, &tx, &[]);

        assert_eq!(
            rx.try_recv().ok(),
            Some(SurfaceEvent::ButtonPressed { strip: 1, button: ButtonClass::Mute })
        );
        assert!(rx.try_recv().is_err());
    }
}
