//! Fader-law codec
//!
//! Converts between the normalized fader position domain (0-1000) and the
//! console's gain scale in dB, and maps preamp gain onto the 12-step
//! encoder LED ring.
//!
//! The quadratic coefficients approximate the Wing fader law between
//! roughly -144 dB and +10 dB; both directions are exact inverses of each
//! other within rounding (see the property test below).

/// Full scale of the normalized fader position domain.
pub const FADER_MAX: u16 = 1000;

/// Positions at or below this are treated as silence.
pub const SILENT_THRESHOLD: u16 = 5;

/// dB value sent for effective silence ("-oo" on the console).
pub const SILENCE_DB: f32 = -144.0;

/// Number of segments on the encoder LED ring (positions 0-11).
pub const RING_STEPS: u8 = 11;

// Fader-law calibration constants.
const A: f64 = -6e-5;
const B: f64 = 0.1359;
const C: f64 = -62.895;

/// Convert a fader position (0-1000) to console gain in dB.
///
/// Positions at or below [`SILENT_THRESHOLD`] return [`SILENCE_DB`].
pub fn position_to_db(position: u16) -> f32 {
    let position = position.min(FADER_MAX);
    if position <= SILENT_THRESHOLD {
        return SILENCE_DB;
    }
    let x = position as f64;
    (A * x * x + B * x + C) as f32
}

/// Convert console gain in dB back to a fader position (0-1000).
///
/// Values at or below -90 dB, and values below the curve range
/// (negative discriminant), map to 0. The result is clamped to the
/// position domain. The console's "-oo" string sentinel is mapped to 0
/// by the caller before reaching this function.
pub fn db_to_position(db: f32) -> u16 {
    if db <= -90.0 {
        return 0;
    }
    let y = db as f64;
    let discriminant = B * B - 4.0 * A * (C - y);
    if discriminant < 0.0 {
        return 0;
    }
    let position = (-B + discriminant.sqrt()) / (2.0 * A);
    position.round().clamp(0.0, FADER_MAX as f64) as u16
}

/// Map preamp gain onto the encoder LED ring (0-11).
pub fn gain_ring_index(gain_db: f32, gain_max: f32) -> u8 {
    if gain_max <= 0.0 {
        return 0;
    }
    let index = (gain_db / gain_max * RING_STEPS as f32).round();
    index.clamp(0.0, RING_STEPS as f32) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn silence_floor_below_threshold() {
        for pos in 0..=SILENT_THRESHOLD {
            assert_eq!(position_to_db(pos), SILENCE_DB);
        }
        assert_ne!(position_to_db(SILENT_THRESHOLD + 1), SILENCE_DB);
    }

    #[test]
    fn silence_maps_back_to_zero() {
        assert_eq!(db_to_position(SILENCE_DB), 0);
        assert_eq!(db_to_position(-90.0), 0);
        assert_eq!(db_to_position(-200.0), 0);
    }

    #[test]
    fn known_points() {
        // Top of the curve: -6e-5 * 1e6 + 135.9 - 62.895 = 13.005 dB
        let top = position_to_db(1000);
        assert!((top - 13.005).abs() < 0.01, "top was {top}");
        assert_eq!(db_to_position(top), 1000);
    }

    #[test]
    fn below_curve_range_clamps_to_zero() {
        // Between -90 and the curve's lower reach the discriminant goes
        // negative; both cases must land on 0.
        assert_eq!(db_to_position(-89.0), 0);
    }

    #[test]
    fn out_of_range_position_clamps() {
        assert_eq!(position_to_db(2000), position_to_db(1000));
    }

    #[test]
    fn ring_index_scaling() {
        assert_eq!(gain_ring_index(0.0, 45.0), 0);
        assert_eq!(gain_ring_index(45.0, 45.0), 11);
        assert_eq!(gain_ring_index(22.5, 45.0), 6); // 5.5 rounds up
        // Negative preamp gain clamps to the bottom of the ring
        assert_eq!(gain_ring_index(-2.5, 45.0), 0);
    }

    proptest! {
        #[test]
        fn round_trip_within_one_unit(pos in 6u16..=1000) {
            let db = position_to_db(pos);
            let back = db_to_position(db);
            prop_assert!(
                (back as i32 - pos as i32).abs() <= 1,
                "{pos} -> {db} dB -> {back}"
            );
        }

        #[test]
        fn db_to_position_never_overflows(db in -200.0f32..60.0) {
            prop_assert!(db_to_position(db) <= FADER_MAX);
        }
    }
}
