//! Wrist control module

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod inverse_kinematics;
mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use inverse_kinematics::*;
pub use params::*;
pub use state::*;

use comms_if::eqpt::CommError;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// The number of servos driving the wrist.
pub const NUM_WRIST_AXES: usize = 3;

/// How long an error stays visible in the error text.
///
/// Units: seconds
pub const ERROR_TEXT_HOLD_S: f64 = 5.0;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during WristCtrl operation.
///
/// The display text of each error is what the operator sees in the error text.
#[derive(Debug, thiserror::Error)]
pub enum WristCtrlError {
    #[error("Failed to open USB2Dynamixel!")]
    OpenFailed(String),

    #[error("Not connected to Dynamixel Pro")]
    NotConnected,

    #[error("Failed to enable torque!")]
    ConnectTorqueFailed(#[source] CommError),

    #[error("Failed to connect to Dynamixel Pro")]
    ConnectFailed(#[source] CommError),

    #[error("Failed to send home setpoints!")]
    HomeFailed(#[source] CommError),

    #[error("Failed to send Motor{motor} setpoint!")]
    SetpointFailed {
        motor: usize,
        #[source]
        source: CommError,
    },

    #[error("Failed to enable torque{motor}!")]
    TorqueEnableFailed {
        motor: usize,
        #[source]
        source: CommError,
    },

    #[error("Failed to disable torque{motor}!")]
    TorqueDisableFailed {
        motor: usize,
        #[source]
        source: CommError,
    },
}
