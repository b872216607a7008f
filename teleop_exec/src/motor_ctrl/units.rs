//! Conversions between motor board register values and physical units
//!
//! Every conversion is total: values outside the destination's range are clamped into it rather
//! than rejected.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use util::maths::{clamp, round_half_even};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Full scale of the 16 bit current ADC.
const ADC_FULL_SCALE: f64 = 65536.0;

/// ADC reference voltage.
///
/// Units: volts
const ADC_REF_V: f64 = 3.3;

/// Current sense gain used when reading a limit back from the board.
///
/// Units: milliamps per volt
const CURRENT_SENSE_MA_PER_V: f64 = 4000.0;

/// Current sense resistance used when writing a limit to the board.
///
/// Units: ohms
const CURRENT_SENSE_OHM: f64 = 0.25;

/// Divisor turning a gain register value into a physical gain.
const KP_SCALE: f32 = 10000.0;

/// Encoder clicks counted per revolution of the gearbox input.
const CLICKS_PER_RATIO: f64 = 2.0;

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Current limit reported by the board, converted to whole milliamps.
pub fn current_raw_to_ma(raw: i32) -> f64 {
    round_half_even(raw as f64 * ADC_REF_V * CURRENT_SENSE_MA_PER_V / ADC_FULL_SCALE) as f64
}

/// Current limit in milliamps converted to the board's 16 bit register.
///
/// This is not the exact inverse of `current_raw_to_ma`, the board's write path is calibrated
/// through the sense resistor instead of the read path's gain. A value read back can differ from
/// the one written by a couple of counts.
pub fn current_ma_to_raw(ma: f64) -> u16 {
    let raw = round_half_even(ma * ADC_FULL_SCALE / ADC_REF_V * CURRENT_SENSE_OHM / 1000.0);
    raw.max(0).min(u16::MAX as i64) as u16
}

/// Live current telemetry in milliamps, unrounded.
pub fn live_current_ma(raw: i32) -> f64 {
    raw as f64 * (ADC_REF_V / ADC_FULL_SCALE) / CURRENT_SENSE_OHM * 1000.0
}

/// Gain register value to physical gain.
///
/// There is no inverse, gains are written to the board in physical units.
pub fn kp_from_raw(raw: i32) -> f32 {
    raw as f32 / KP_SCALE
}

pub fn gear_ratio_from_clicks(clicks_per_rev: f64) -> f64 {
    clicks_per_rev / CLICKS_PER_RATIO
}

pub fn clicks_from_gear_ratio(gear_ratio: f64) -> f64 {
    gear_ratio * CLICKS_PER_RATIO
}

/// Shaft counter to output shaft angle.
///
/// Units: degrees
pub fn counter_to_deg(shaft_counter: i32, gear_ratio: f64) -> f64 {
    (shaft_counter as f64 / gear_ratio / 2.0) * 360.0
}

/// Clamp a requested minimum speed into a byte.
pub fn clamp_speed_min(speed_min: i32) -> u8 {
    speed_min.max(0).min(u8::MAX as i32) as u8
}

/// Clamp a gain to be non-negative.
pub fn clamp_kp(kp: f32) -> f32 {
    if kp < 0.0 {
        0.0
    } else {
        kp
    }
}

/// Clamp a current limit to be non-negative.
pub fn clamp_current_ma(ma: f64) -> f64 {
    clamp(&ma, &0.0, &f64::INFINITY)
}

/// Clamp a deadband into the board's 16 bit register.
pub fn clamp_deadband(deadband: i32) -> u16 {
    deadband.max(0).min(u16::MAX as i32) as u16
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_current_limit_conversions() {
        assert_eq!(current_raw_to_ma(0), 0.0);
        assert_eq!(current_raw_to_ma(1000), 201.0);
        assert_eq!(current_raw_to_ma(4965), 1000.0);
        assert_eq!(current_raw_to_ma(65535), 13200.0);

        assert_eq!(current_ma_to_raw(0.0), 0);
        assert_eq!(current_ma_to_raw(201.0), 998);
        assert_eq!(current_ma_to_raw(1000.0), 4965);
        assert_eq!(current_ma_to_raw(500.4), 2484);

        // Out of range limits saturate
        assert_eq!(current_ma_to_raw(20000.0), 65535);
        assert_eq!(current_ma_to_raw(-10.0), 0);
    }

    #[test]
    fn test_current_round_trip_tolerance() {
        for raw in 0..=u16::MAX as i32 {
            let back = current_ma_to_raw(current_raw_to_ma(raw)) as i32;
            assert!(
                (back - raw).abs() <= 3,
                "raw {} came back as {}",
                raw,
                back
            );
        }
    }

    #[test]
    fn test_live_current() {
        assert_relative_eq!(live_current_ma(0), 0.0);
        assert_relative_eq!(live_current_ma(1000), 201.416015625, epsilon = 1e-9);
        assert_relative_eq!(live_current_ma(-1000), -201.416015625, epsilon = 1e-9);
    }

    #[test]
    fn test_kp_and_gear_ratio() {
        assert_relative_eq!(kp_from_raw(15000), 1.5);
        assert_relative_eq!(kp_from_raw(0), 0.0);

        assert_relative_eq!(gear_ratio_from_clicks(2000.0), 1000.0);
        assert_relative_eq!(clicks_from_gear_ratio(1000.0), 2000.0);
        assert_relative_eq!(
            gear_ratio_from_clicks(clicks_from_gear_ratio(33.5)),
            33.5
        );
    }

    #[test]
    fn test_counter_to_deg() {
        assert_relative_eq!(counter_to_deg(0, 1.0), 0.0);
        assert_relative_eq!(counter_to_deg(2, 1.0), 360.0);
        assert_relative_eq!(counter_to_deg(500, 1000.0), 90.0);
        assert_relative_eq!(counter_to_deg(-1000, 1000.0), -180.0);
    }

    #[test]
    fn test_clamps() {
        assert_eq!(clamp_speed_min(-5), 0);
        assert_eq!(clamp_speed_min(100), 100);
        assert_eq!(clamp_speed_min(300), 255);
        assert_eq!(clamp_kp(-0.5), 0.0);
        assert_eq!(clamp_kp(2.5), 2.5);
        assert_eq!(clamp_current_ma(-1.0), 0.0);
        assert_eq!(clamp_current_ma(1500.0), 1500.0);
        assert_eq!(clamp_deadband(-1), 0);
        assert_eq!(clamp_deadband(70000), 65535);
    }
}
