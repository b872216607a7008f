//! # Script entries
//!
//! Scripts for the executable mix signal writes with motor commands:
//!
//! ```text
//! 1.0: {"signal": "base.JogForward", "value": 1.0};
//! 4.0: {"motor_id": 0, "action": "HomeJoint"};
//! 4.5: {"motor_id": 1, "action": {"SetKp": 2.0}};
//! ```

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::warn;
use serde::Deserialize;

use crate::motor_ctrl::{self, MotorCmd};
use comms_if::signal::LocalSignalBus;
use util::script_interpreter::SignalWrite;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// One timed entry of an executable script.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ScriptEntry {
    Signal(SignalWrite),
    Motor(MotorCmd),
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Publish the signal writes onto the bus and queue the motor commands for this cycle.
///
/// Returns the number of writes to signals nobody has registered.
pub fn dispatch(
    entries: Vec<ScriptEntry>,
    bus: &LocalSignalBus,
    motor_input: &mut motor_ctrl::InputData,
) -> usize {
    let mut num_unknown = 0;

    for entry in entries {
        match entry {
            ScriptEntry::Signal(w) => {
                if !bus.publish_named(&w.signal, w.value) {
                    warn!("Script writes to unknown signal {}", w.signal);
                    num_unknown += 1;
                }
            }
            ScriptEntry::Motor(cmd) => motor_input.cmds.push(cmd),
        }
    }

    num_unknown
}
