//! # Teleoperation Executable Parameters
//!
//! This module provide parameters for the teleoperation executable.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::eqpt::footswitch;
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeleopExecParams {
    /// Calibration parameter file of each motor on the board, relative to the params directory
    pub motor_calibrations: Vec<String>,

    /// Wrist control parameter file, relative to the params directory
    pub wrist_params: String,

    /// Footswitch settings, no footswitch is used if absent
    #[serde(default)]
    pub footswitch: Option<FootswitchParams>,

    /// Signal script to run instead of waiting for an operator
    #[serde(default)]
    pub script: Option<String>,

    /// Archive motor telemetry and wrist setpoints every cycle
    #[serde(default)]
    pub print_data: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FootswitchParams {
    /// Serial port of the box, every available port is tried if absent
    pub port: Option<String>,

    /// Units: bits/second
    pub baud_rate: u32,

    /// Qualified name of the signal each button drives, in button order
    pub bindings: Vec<String>,

    /// Period at which the listener polls the box.
    ///
    /// Units: milliseconds
    pub poll_period_ms: u64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for FootswitchParams {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: footswitch::DEFAULT_BAUD,
            bindings: Vec::new(),
            poll_period_ms: 10,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_exec_params() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("teleop_exec.toml");
        std::fs::write(
            &path,
            "motor_calibrations = [\"motor_0.toml\", \"motor_1.toml\"]\n\
            wrist_params = \"wrist_ctrl.toml\"\n\
            \n\
            [footswitch]\n\
            bindings = [\"base.JogForward\", \"base.JogReverse\"]\n",
        )
        .unwrap();

        let p: TeleopExecParams = util::params::load_from_path(&path).unwrap();

        assert_eq!(p.motor_calibrations.len(), 2);
        assert!(p.script.is_none());
        assert!(!p.print_data);

        let fs = p.footswitch.unwrap();
        assert_eq!(fs.port, None);
        assert_eq!(fs.baud_rate, 57600);
        assert_eq!(fs.bindings[1], "base.JogReverse");
    }
}
