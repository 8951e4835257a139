//! Wingbridge
//!
//! Bridges a Behringer Wing digital mixer (OSC over UDP), an X-Touch
//! Extender control surface (MIDI), and a DMX dimmer line (USB serial):
//! 8 motorized strips mirror and drive the live state of 24+ mixer
//! channels plus the house lights, multiplexed through pages.
//!
//! The interesting part is the synchronization engine in [`bridge`]:
//! touch-sense ownership arbitration, deadband filtering against motor
//! jitter, and a page epoch barrier keeping three concurrent execution
//! contexts from fighting over the strip table.

pub mod bridge;
pub mod config;
pub mod console;
pub mod curve;
pub mod lighting;
pub mod midi;
pub mod page;
pub mod state;
pub mod surface;
