//! Calibration parameters for a single motor

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::eqpt::motor::ControlMode;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Persisted calibration of one motor, enough to reconstruct its state on the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorCalibration {
    /// Index of the motor on the board.
    pub id: u8,

    /// Operator-facing name, also used to qualify the motor's signal names.
    pub friendly_name: String,

    /// Proportional gain.
    pub kp: f32,

    /// Gear ratio between the encoder shaft and the output shaft.
    pub gear_ratio: f64,

    /// Minimum drive speed.
    pub speed_min: i32,

    /// Current limit.
    ///
    /// Units: milliamps
    pub current_max_ma: f64,

    /// Potentiometer zero offset.
    pub pot_zero: u16,

    /// Deadband around the setpoint.
    ///
    /// Units: encoder ticks
    pub deadband: u16,

    pub control_mode: ControlMode,

    /// Speed used while jogging.
    pub jog_speed: i32,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Load the calibration of every motor from the given parameter files.
pub fn load_calibrations(param_files: &[String]) -> Result<Vec<MotorCalibration>, super::MotorCtrlError> {
    param_files
        .iter()
        .map(|f| util::params::load(f).map_err(super::MotorCtrlError::from))
        .collect()
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for MotorCalibration {
    fn default() -> Self {
        Self {
            id: 0,
            friendly_name: String::new(),
            kp: 1.0,
            gear_ratio: 1.0,
            speed_min: 0,
            current_max_ma: 1000.0,
            pot_zero: 0,
            deadband: 1,
            control_mode: ControlMode::default(),
            jog_speed: super::DEFAULT_JOG_SPEED,
        }
    }
}
