//! # Communications interface crate.
//!
//! Provides all common communications interfaces for the software.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Command, event and protocol definitions for equipment (motor board, Dynamixel wrist,
/// footswitch box)
pub mod eqpt;

/// Signal bus used to route operator and automation values between modules
pub mod signal;
