//! # Teleoperation library.
//!
//! This library allows other crates in the workspace (and the benchmarks) to access items defined
//! inside the teleoperation crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Motor control - calibration, jogging and telemetry of the joints on the motor board
pub mod motor_ctrl;

/// Wrist control - inverse kinematics and the Dynamixel Pro servos of the wrist
pub mod wrist_ctrl;

/// Footswitch box - auxiliary buttons read over a serial link
pub mod footswitch;

/// Simulated equipment - stands in for the motor board and Dynamixel bus
pub mod sim;

/// Timed script entries driving signals and motor commands
pub mod script;

/// Global data store for the executable
pub mod data_store;

/// Parameters for the executable
pub mod params;
