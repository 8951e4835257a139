//! Inbound surface message decoding
//!
//! Pure translation of the X-Touch Extender's MIDI layout into typed
//! inputs: pitch bend per channel = fader position, CC 16-23 = relative
//! encoder deltas, notes 0-31 = button rows, notes 104-111 = fader
//! touch sensors.

use crate::curve::FADER_MAX;
use crate::midi::MidiMessage;

/// Button rows on a channel strip, top to bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonClass {
    Rec,
    Solo,
    Mute,
    Select,
}

impl ButtonClass {
    /// Base note of this button's row (strip 1 = base, strip 8 = base+7).
    pub fn note_base(&self) -> u8 {
        match self {
            ButtonClass::Rec => 0,
            ButtonClass::Solo => 8,
            ButtonClass::Mute => 16,
            ButtonClass::Select => 24,
        }
    }
}

/// A decoded inbound surface message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceInput {
    Fader { strip: u8, position: u16 },
    Encoder { strip: u8, delta: i8 },
    Button { strip: u8, button: ButtonClass, pressed: bool },
    Touch { strip: u8, touched: bool },
}

const ENCODER_CC_BASE: u8 = 16;
const TOUCH_NOTE_BASE: u8 = 104;

/// Decode one MIDI message into a surface input.
///
/// Encoder clicks with zero delta (raw 0 or 64) produce no input.
pub fn decode(msg: &MidiMessage) -> Option<SurfaceInput> {
    match *msg {
        MidiMessage::PitchBend { channel, value } => Some(SurfaceInput::Fader {
            strip: channel + 1,
            position: position_from_pitch_bend(value),
        }),

        MidiMessage::ControlChange { cc, value, .. }
            if (ENCODER_CC_BASE..ENCODER_CC_BASE + 8).contains(&cc) =>
        {
            let delta = encoder_delta(value);
            if delta == 0 {
                return None;
            }
            Some(SurfaceInput::Encoder {
                strip: cc - ENCODER_CC_BASE + 1,
                delta,
            })
        }

        MidiMessage::NoteOn { note, velocity, .. } => decode_note(note, velocity > 0),
        MidiMessage::NoteOff { note, .. } => decode_note(note, false),

        _ => None,
    }
}

fn decode_note(note: u8, pressed: bool) -> Option<SurfaceInput> {
    if (TOUCH_NOTE_BASE..TOUCH_NOTE_BASE + 8).contains(&note) {
        return Some(SurfaceInput::Touch {
            strip: note - TOUCH_NOTE_BASE + 1,
            touched: pressed,
        });
    }

    for button in [
        ButtonClass::Rec,
        ButtonClass::Solo,
        ButtonClass::Mute,
        ButtonClass::Select,
    ] {
        let base = button.note_base();
        if (base..base + 8).contains(&note) {
            return Some(SurfaceInput::Button {
                strip: note - base + 1,
                button,
                pressed,
            });
        }
    }
    None
}

/// Relative encoder delta from the signed 7-bit convention:
/// 1-63 clockwise, 65-127 counter-clockwise (two's complement),
/// 0 and 64 are no movement.
pub fn encoder_delta(raw: u8) -> i8 {
    match raw {
        0 | 64 => 0,
        v if v < 64 => v as i8,
        v => (v as i16 - 128) as i8,
    }
}

/// Normalize a 14-bit pitch-bend value (0-16383) to a fader position
/// (0-1000), rounding to the nearest unit.
pub fn position_from_pitch_bend(value: u16) -> u16 {
    let value = value.min(16383) as u32;
    ((value * FADER_MAX as u32 + 8191) / 16383) as u16
}

/// Inverse of [`position_from_pitch_bend`], for driving the motor.
pub fn pitch_bend_from_position(position: u16) -> u16 {
    let position = position.min(FADER_MAX) as u32;
    ((position * 16383 + FADER_MAX as u32 / 2) / FADER_MAX as u32) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoder_delta_convention() {
        assert_eq!(encoder_delta(1), 1);
        assert_eq!(encoder_delta(3), 3);
        assert_eq!(encoder_delta(63), 63);
        assert_eq!(encoder_delta(127), -1);
        assert_eq!(encoder_delta(125), -3);
        assert_eq!(encoder_delta(65), -63);
        assert_eq!(encoder_delta(64), 0);
        assert_eq!(encoder_delta(0), 0);
    }

    #[test]
    fn zero_delta_produces_no_input() {
        let msg = MidiMessage::ControlChange { channel: 0, cc: 16, value: 64 };
        assert_eq!(decode(&msg), None);
    }

    #[test]
    fn encoder_cc_range_maps_to_strips() {
        let msg = MidiMessage::ControlChange { channel: 0, cc: 16, value: 1 };
        assert_eq!(decode(&msg), Some(SurfaceInput::Encoder { strip: 1, delta: 1 }));

        let msg = MidiMessage::ControlChange { channel: 0, cc: 23, value: 127 };
        assert_eq!(decode(&msg), Some(SurfaceInput::Encoder { strip: 8, delta: -1 }));

        // Ring output CCs must not decode as input
        let msg = MidiMessage::ControlChange { channel: 0, cc: 48, value: 1 };
        assert_eq!(decode(&msg), None);
    }

    #[test]
    fn pitch_bend_normalization() {
        assert_eq!(position_from_pitch_bend(0), 0);
        assert_eq!(position_from_pitch_bend(16383), 1000);
        assert_eq!(position_from_pitch_bend(8192), 500);
    }

    #[test]
    fn pitch_bend_round_trip() {
        for position in [0u16, 1, 250, 499, 500, 750, 999, 1000] {
            let back = position_from_pitch_bend(pitch_bend_from_position(position));
            assert!(
                (back as i32 - position as i32).abs() <= 1,
                "{position} -> {back}"
            );
        }
    }

    #[test]
    fn fader_message_decodes_with_strip() {
        let msg = MidiMessage::PitchBend { channel: 2, value: 16383 };
        assert_eq!(
            decode(&msg),
            Some(SurfaceInput::Fader { strip: 3, position: 1000 })
        );
    }

    #[test]
    fn button_rows() {
        let cases = [
            (0, ButtonClass::Rec, 1),
            (7, ButtonClass::Rec, 8),
            (8, ButtonClass::Solo, 1),
            (16, ButtonClass::Mute, 1),
            (23, ButtonClass::Mute, 8),
            (24, ButtonClass::Select, 1),
            (31, ButtonClass::Select, 8),
        ];
        for (note, button, strip) in cases {
            let msg = MidiMessage::NoteOn { channel: 0, note, velocity: 127 };
            assert_eq!(
                decode(&msg),
                Some(SurfaceInput::Button { strip, button, pressed: true }),
                "note {note}"
            );
        }
    }

    #[test]
    fn touch_sense_range() {
        let msg = MidiMessage::NoteOn { channel: 0, note: 104, velocity: 127 };
        assert_eq!(decode(&msg), Some(SurfaceInput::Touch { strip: 1, touched: true }));

        // Velocity 0 arrives as NoteOff from the parser
        let msg = MidiMessage::NoteOff { channel: 0, note: 111, velocity: 0 };
        assert_eq!(decode(&msg), Some(SurfaceInput::Touch { strip: 8, touched: false }));
    }

    #[test]
    fn unmapped_notes_ignored() {
        let msg = MidiMessage::NoteOn { channel: 0, note: 60, velocity: 127 };
        assert_eq!(decode(&msg), None);
    }
}
