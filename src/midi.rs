//! MIDI message codec
//!
//! Parses and encodes exactly the message subset the X-Touch Extender
//! speaks: note on/off (buttons, LEDs, touch sensors), control change
//! (encoders, LED rings), pitch bend (faders), and the vendor SysEx used
//! for scribble-strip text and color.

use std::fmt;

/// MIDI messages exchanged with the control surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiMessage {
    /// Note Off: channel (0-15), note (0-127), velocity (0-127)
    NoteOff { channel: u8, note: u8, velocity: u8 },

    /// Note On: channel (0-15), note (0-127), velocity (0-127)
    NoteOn { channel: u8, note: u8, velocity: u8 },

    /// Control Change: channel (0-15), cc (0-127), value (0-127)
    ControlChange { channel: u8, cc: u8, value: u8 },

    /// Pitch Bend: channel (0-15), value (0-16383, 14-bit)
    PitchBend { channel: u8, value: u16 },

    /// System Exclusive: payload between 0xF0 and 0xF7
    SysEx { data: Vec<u8> },
}

impl MidiMessage {
    /// Parse a MIDI message from raw bytes.
    ///
    /// Returns `None` for truncated input and for message types outside
    /// the subset this surface uses (running status included).
    pub fn parse(data: &[u8]) -> Option<Self> {
        let status = *data.first()?;
        if status < 0x80 {
            return None;
        }

        if status < 0xF0 {
            let channel = status & 0x0F;
            match status & 0xF0 {
                0x80 => {
                    if data.len() < 3 {
                        return None;
                    }
                    Some(MidiMessage::NoteOff {
                        channel,
                        note: data[1] & 0x7F,
                        velocity: data[2] & 0x7F,
                    })
                }
                0x90 => {
                    if data.len() < 3 {
                        return None;
                    }
                    let note = data[1] & 0x7F;
                    let velocity = data[2] & 0x7F;
                    // Note On with velocity 0 is a Note Off by convention
                    if velocity == 0 {
                        Some(MidiMessage::NoteOff { channel, note, velocity: 0 })
                    } else {
                        Some(MidiMessage::NoteOn { channel, note, velocity })
                    }
                }
                0xB0 => {
                    if data.len() < 3 {
                        return None;
                    }
                    Some(MidiMessage::ControlChange {
                        channel,
                        cc: data[1] & 0x7F,
                        value: data[2] & 0x7F,
                    })
                }
                0xE0 => {
                    if data.len() < 3 {
                        return None;
                    }
                    let lsb = (data[1] & 0x7F) as u16;
                    let msb = (data[2] & 0x7F) as u16;
                    Some(MidiMessage::PitchBend {
                        channel,
                        value: (msb << 7) | lsb,
                    })
                }
                _ => None,
            }
        } else if status == 0xF0 {
            let end = data.iter().position(|&b| b == 0xF7)?;
            Some(MidiMessage::SysEx {
                data: data[1..end].to_vec(),
            })
        } else {
            None
        }
    }

    /// Encode the message to raw MIDI bytes.
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            MidiMessage::NoteOff { channel, note, velocity } => {
                vec![0x80 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
            }
            MidiMessage::NoteOn { channel, note, velocity } => {
                vec![0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
            }
            MidiMessage::ControlChange { channel, cc, value } => {
                vec![0xB0 | (channel & 0x0F), cc & 0x7F, value & 0x7F]
            }
            MidiMessage::PitchBend { channel, value } => {
                let lsb = (value & 0x7F) as u8;
                let msb = ((value >> 7) & 0x7F) as u8;
                vec![0xE0 | (channel & 0x0F), lsb, msb]
            }
            MidiMessage::SysEx { ref data } => {
                let mut out = Vec::with_capacity(data.len() + 2);
                out.push(0xF0);
                out.extend_from_slice(data);
                out.push(0xF7);
                out
            }
        }
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiMessage::NoteOff { channel, note, velocity } => {
                write!(f, "NoteOff ch:{} n:{} v:{}", channel + 1, note, velocity)
            }
            MidiMessage::NoteOn { channel, note, velocity } => {
                write!(f, "NoteOn ch:{} n:{} v:{}", channel + 1, note, velocity)
            }
            MidiMessage::ControlChange { channel, cc, value } => {
                write!(f, "CC ch:{} cc:{} v:{}", channel + 1, cc, value)
            }
            MidiMessage::PitchBend { channel, value } => {
                write!(f, "PitchBend ch:{} v:{}", channel + 1, value)
            }
            MidiMessage::SysEx { ref data } => {
                write!(f, "SysEx {} bytes", data.len())
            }
        }
    }
}

/// Format MIDI bytes as a hex string for debug logs.
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_on_parsing() {
        let data = vec![0x90, 24, 127];
        let msg = MidiMessage::parse(&data).unwrap();

        assert_eq!(msg, MidiMessage::NoteOn {
            channel: 0,
            note: 24,
            velocity: 127,
        });
    }

    #[test]
    fn test_note_on_velocity_zero() {
        let data = vec![0x90, 104, 0]; // touch release arrives this way
        let msg = MidiMessage::parse(&data).unwrap();

        assert_eq!(msg, MidiMessage::NoteOff {
            channel: 0,
            note: 104,
            velocity: 0,
        });
    }

    #[test]
    fn test_control_change() {
        let data = vec![0xB0, 16, 1]; // encoder 1, one click clockwise
        let msg = MidiMessage::parse(&data).unwrap();

        assert_eq!(msg, MidiMessage::ControlChange {
            channel: 0,
            cc: 16,
            value: 1,
        });
    }

    #[test]
    fn test_pitch_bend() {
        let data = vec![0xE2, 0x00, 0x40]; // fader 3 at center
        let msg = MidiMessage::parse(&data).unwrap();

        assert_eq!(msg, MidiMessage::PitchBend {
            channel: 2,
            value: 8192,
        });
    }

    #[test]
    fn test_sysex_parsing() {
        let data = vec![0xF0, 0x00, 0x00, 0x66, 0x15, 0x72, 0x00, 0x01, 0xF7];
        let msg = MidiMessage::parse(&data).unwrap();

        assert_eq!(msg, MidiMessage::SysEx {
            data: vec![0x00, 0x00, 0x66, 0x15, 0x72, 0x00, 0x01],
        });
    }

    #[test]
    fn test_unterminated_sysex_rejected() {
        assert_eq!(MidiMessage::parse(&[0xF0, 0x00, 0x00]), None);
    }

    #[test]
    fn test_truncated_messages_rejected() {
        assert_eq!(MidiMessage::parse(&[]), None);
        assert_eq!(MidiMessage::parse(&[0xE0, 0x00]), None);
        assert_eq!(MidiMessage::parse(&[0xB0]), None);
    }

    #[test]
    fn test_encode_round_trip() {
        let messages = vec![
            MidiMessage::NoteOn { channel: 0, note: 16, velocity: 127 },
            MidiMessage::NoteOff { channel: 0, note: 16, velocity: 0 },
            MidiMessage::ControlChange { channel: 0, cc: 48, value: 0x16 },
            MidiMessage::PitchBend { channel: 7, value: 16383 },
        ];

        for msg in messages {
            assert_eq!(MidiMessage::parse(&msg.encode()), Some(msg));
        }
    }
}
