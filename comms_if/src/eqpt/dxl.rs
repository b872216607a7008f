//! # Dynamixel Pro Equipment Interface
//!
//! Control table addresses and the register bus used to drive the three Dynamixel Pro servos of
//! the wrist.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use super::{CommError, CommStatus};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

pub const TORQUE_ENABLE: u16 = 562;
pub const LED_RED: u16 = 563;
pub const LED_GREEN: u16 = 564;
pub const LED_BLUE: u16 = 565;
pub const GOAL_POSITION: u16 = 596;
pub const GOAL_VELOCITY: u16 = 600;
pub const GOAL_TORQUE: u16 = 30;
pub const GOAL_ACCEL: u16 = 606;
pub const MOVING: u16 = 610;
pub const PRESENT_POSITION: u16 = 611;
pub const PRESENT_VELOCITY: u16 = 615;

/// Default bus baud rate
pub const DEFAULT_BAUD: u32 = 57600;

/// Ids of the wrist servos, in axis order
pub const WRIST_IDS: [u8; 3] = [1, 2, 3];

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Register-level access to a bus of Dynamixel servos.
pub trait DxlBus {
    /// Write a single byte register.
    fn write_byte(&mut self, id: u8, address: u16, value: u8);

    /// Write a 16-bit register.
    fn write_word(&mut self, id: u8, address: u16, value: u16);

    /// Write a 32-bit register.
    fn write_dword(&mut self, id: u8, address: u16, value: u32);

    /// Status of the last transmit/receive burst.
    fn comm_result(&mut self) -> CommStatus;

    /// Compare the last status against the success sentinel.
    fn check_comm(&mut self) -> Result<(), CommError> {
        self.comm_result().check()
    }
}
