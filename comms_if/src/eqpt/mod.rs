//! # Equipment Interface
//!
//! This module defines the interface structures which are exchanged with the teleoperation
//! equipment, and the communication status reported by the equipment drivers.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod dxl;
pub mod footswitch;
pub mod motor;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Result of the last transmit/receive burst reported by an equipment driver.
///
/// The numeric codes are those used by the serial servo driver library.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub enum CommStatus {
    TxSuccess,
    /// The success sentinel, every other status is a failure
    RxSuccess,
    TxFail,
    RxFail,
    TxError,
    RxWaiting,
    RxTimeout,
    RxCorrupt,
    Unknown(i32),
}

/// A communication failure detected after a write burst.
#[derive(Serialize, Deserialize, Debug, Error, Clone, PartialEq)]
pub enum CommError {
    #[error("Equipment reported communication status {0:?}")]
    Status(CommStatus),

    #[error("Equipment is not connected")]
    NotConnected,
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl CommStatus {
    /// Convert a driver status code into a status.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => CommStatus::TxSuccess,
            1 => CommStatus::RxSuccess,
            2 => CommStatus::TxFail,
            3 => CommStatus::RxFail,
            4 => CommStatus::TxError,
            5 => CommStatus::RxWaiting,
            6 => CommStatus::RxTimeout,
            7 => CommStatus::RxCorrupt,
            c => CommStatus::Unknown(c),
        }
    }

    /// True if this is the success sentinel.
    pub fn is_success(&self) -> bool {
        *self == CommStatus::RxSuccess
    }

    /// Convert the status into a result, failing on anything but the success sentinel.
    pub fn check(self) -> Result<(), CommError> {
        if self.is_success() {
            Ok(())
        } else {
            Err(CommError::Status(self))
        }
    }
}
