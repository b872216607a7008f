//! Motor control module

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod board;
mod jog;
mod motor;
mod params;
mod state;
mod telemetry;
pub mod units;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use board::*;
pub use jog::*;
pub use motor::*;
pub use params::*;
pub use state::*;
pub use telemetry::*;

use comms_if::eqpt::CommError;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Jog speed given to a motor whose calibration doesn't name one.
pub const DEFAULT_JOG_SPEED: i32 = 32;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during MotorCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum MotorCtrlError {
    #[error("No motor has index {0}")]
    UnknownMotor(u8),

    #[error("Two motors share index {0}")]
    DuplicateId(u8),

    #[error("Communication with the motor board failed: {0}")]
    Comm(#[from] CommError),

    #[error("Cannot load a motor calibration: {0}")]
    LoadError(#[from] util::params::LoadError),
}
