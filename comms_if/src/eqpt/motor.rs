//! # Motor Board Equipment Interface
//!
//! Demands sent to the motor controller board and the hardware events it reports back. One
//! board drives several motors, each addressed by its index on the board.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use thiserror::Error;

use super::{CommError, CommStatus};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A change of one quantity on one motor, reported by the board.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub struct JointEvent {
    /// Index of the motor on the board
    pub motor_index: u8,

    /// The quantity which changed
    pub quantity: JointQuantity,

    /// The new raw register value
    pub raw: i32,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Demands that are written to a single motor on the board.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub enum MotorDemand {
    /// Proportional gain, in physical units
    Kp(f32),

    /// Encoder clicks per revolution
    ClicksPerRev(f64),

    /// Minimum drive speed
    SpeedMin(u8),

    /// Current limit register value
    CurrentMax(u16),

    /// Potentiometer zero offset
    PotZero(u16),

    /// Deadband in encoder ticks
    Deadband(u16),

    ControlMode(ControlMode),

    /// Change the index of the motor on the board
    Index(u8),

    /// Absolute angle setpoint in degrees
    Angle(f64),

    /// Velocity-mode jog, a speed of zero stops the motor
    Jog { speed: u8, forward: bool },

    /// Ask the board to report the motor's whole configuration
    RequestConfig,
}

/// Commands addressed to the board as a whole.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub enum JointCommand {
    /// Report all potentiometer readings
    GetPots,

    /// Reset the shaft counters, the payload selects the motor and the counter mask
    ResetCounters,
}

/// Quantities the board reports changes of.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum JointQuantity {
    Current,
    ShaftCounter,
    Pot,
    Kp,
    ClicksPerRev,
    SpeedMin,
    CurrentMax,
    PotZero,
    ControlMode,
    Deadband,
}

/// Closed-loop control modes supported by the board.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub enum ControlMode {
    Position = 0,
    Velocity = 1,
    Current = 2,
    Potentiometer = 3,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("{0} is not a valid control mode index")]
pub struct InvalidControlMode(pub i32);

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A link to the motor board.
///
/// Writes are fire-and-forget, the caller checks `comm_result` after a burst of writes if it
/// needs to know whether they arrived.
pub trait MotorLink {
    /// Send a demand to the motor with the given index.
    fn send(&mut self, motor_index: u8, demand: MotorDemand);

    /// Send a board-level command with its payload.
    fn send_command(&mut self, command: JointCommand, payload: &[u8]);

    /// Status of the last transmit/receive burst.
    fn comm_result(&mut self) -> CommStatus;

    /// Compare the last status against the success sentinel.
    fn check_comm(&mut self) -> Result<(), CommError> {
        self.comm_result().check()
    }
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl TryFrom<i32> for ControlMode {
    type Error = InvalidControlMode;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ControlMode::Position),
            1 => Ok(ControlMode::Velocity),
            2 => Ok(ControlMode::Current),
            3 => Ok(ControlMode::Potentiometer),
            v => Err(InvalidControlMode(v)),
        }
    }
}

impl Default for ControlMode {
    fn default() -> Self {
        ControlMode::Position
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_control_mode_index() {
        for mode in [
            ControlMode::Position,
            ControlMode::Velocity,
            ControlMode::Current,
            ControlMode::Potentiometer,
        ]
        .iter()
        {
            assert_eq!(ControlMode::try_from(*mode as i32), Ok(*mode));
        }
        assert_eq!(ControlMode::try_from(7), Err(InvalidControlMode(7)));
    }

    #[test]
    fn test_event_json() {
        let event: JointEvent =
            serde_json::from_str(r#"{"motor_index": 1, "quantity": "ShaftCounter", "raw": -420}"#)
                .unwrap();
        assert_eq!(
            event,
            JointEvent {
                motor_index: 1,
                quantity: JointQuantity::ShaftCounter,
                raw: -420
            }
        );
    }
}
