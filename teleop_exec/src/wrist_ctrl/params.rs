//! Parameters structure for WristCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use super::{OrientationCmd, NUM_WRIST_AXES};
use comms_if::eqpt::dxl;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for wrist control.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    // ---- BUS ----
    /// Serial port of the Dynamixel adaptor.
    pub port: String,

    /// Units: bits/second
    pub baud_rate: u32,

    // ---- SERVOS ----
    /// Goal acceleration register value of each servo, in axis order.
    pub goal_accel: [u32; NUM_WRIST_AXES],

    /// Brightness of the blue LED lit once a servo is connected.
    pub led_brightness: u8,

    /// Orientation the wrist is driven to once connected.
    pub home: OrientationCmd,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: dxl::DEFAULT_BAUD,
            goal_accel: [1, 1, 10],
            led_brightness: 255,
            home: OrientationCmd::new(0.0, 127.0, 0.0),
        }
    }
}
