//! # Data Store

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Serialize;

use crate::{motor_ctrl, wrist_ctrl};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Global data store for the executable.
#[derive(Default)]
pub struct DataStore {
    // Cycle management
    /// Number of cycles already executed
    pub num_cycles: u128,

    /// True if this cycle falls on a 1Hz boundary
    pub is_1_hz_cycle: bool,

    /// Session elapsed time at the start of the cycle
    pub sim_time_s: f64,

    // Footswitch
    /// Button states last published onto the signal bus
    pub footswitch_states: Option<Vec<bool>>,

    // MotorCtrl
    pub motor_ctrl_input: motor_ctrl::InputData,
    pub motor_ctrl_output: motor_ctrl::OutputData,
    pub motor_ctrl_status_rpt: motor_ctrl::StatusReport,

    // WristCtrl
    pub wrist_ctrl_input: wrist_ctrl::InputData,
    pub wrist_ctrl_output: Option<wrist_ctrl::OutputData>,
    pub wrist_ctrl_status_rpt: wrist_ctrl::StatusReport,

    // Monitoring Counters
    /// Number of consecutive cycle overruns
    pub num_consec_cycle_overruns: u64,
}

/// One row of the motor telemetry archive.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MotorTelemetryRecord {
    pub time_s: f64,
    pub motor_id: u8,
    pub current_ma: f64,
    pub position_deg: f64,
    pub pot: i32,
}

/// One row of the wrist setpoint archive.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct WristSetpointRecord {
    pub time_s: f64,
    pub roll_deg: f64,
    pub pitch_deg: f64,
    pub yaw_deg: f64,
    pub setpoint1: i32,
    pub setpoint2: i32,
    pub setpoint3: i32,
    pub wrap_suppressed: bool,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl DataStore {
    /// Perform actions required at the start of a cycle.
    ///
    /// Clears those items that need clearing at the start of a cycle, and sets the 1Hz cycle flag.
    pub fn cycle_start(&mut self, cycle_frequency_hz: f64, elapsed_s: f64) {
        self.is_1_hz_cycle = self.num_cycles % (cycle_frequency_hz as u128).max(1) == 0;

        self.motor_ctrl_input = motor_ctrl::InputData::default();
        self.motor_ctrl_output = motor_ctrl::OutputData::default();
        self.motor_ctrl_status_rpt = motor_ctrl::StatusReport::default();

        self.wrist_ctrl_input = wrist_ctrl::InputData::default();
        self.wrist_ctrl_output = None;
        self.wrist_ctrl_status_rpt = wrist_ctrl::StatusReport::default();

        self.sim_time_s = elapsed_s;
    }

    /// Perform actions required at the end of a cycle.
    pub fn cycle_end(&mut self) {
        self.num_cycles += 1;
    }

    /// Telemetry archive rows for this cycle, one per motor.
    pub fn motor_telemetry_records(&self) -> Vec<MotorTelemetryRecord> {
        self.motor_ctrl_output
            .telemetry
            .iter()
            .map(|t| MotorTelemetryRecord {
                time_s: self.sim_time_s,
                motor_id: t.motor_id,
                current_ma: t.current_ma,
                position_deg: t.position_deg,
                pot: t.pot,
            })
            .collect()
    }

    /// Wrist archive row, if wrist control produced setpoints this cycle.
    pub fn wrist_setpoint_record(&self) -> Option<WristSetpointRecord> {
        if !self.wrist_ctrl_status_rpt.solved {
            return None;
        }

        let out = self.wrist_ctrl_output.as_ref()?;
        let sp = out.setpoints?;

        Some(WristSetpointRecord {
            time_s: self.sim_time_s,
            roll_deg: out.orientation.roll_deg,
            pitch_deg: out.orientation.pitch_deg,
            yaw_deg: out.orientation.yaw_deg,
            setpoint1: sp[0],
            setpoint2: sp[1],
            setpoint3: sp[2],
            wrap_suppressed: self.wrist_ctrl_status_rpt.wrap_suppressed,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::motor_ctrl::MotorTelemetry;
    use crate::wrist_ctrl::OrientationCmd;

    #[test]
    fn test_cycle_management() {
        let mut ds = DataStore::default();

        ds.cycle_start(10.0, 0.0);
        assert!(ds.is_1_hz_cycle);
        ds.cycle_end();

        for _ in 1..10 {
            ds.cycle_start(10.0, 0.1);
            assert!(!ds.is_1_hz_cycle);
            ds.cycle_end();
        }

        ds.cycle_start(10.0, 1.0);
        assert!(ds.is_1_hz_cycle);
        assert_eq!(ds.num_cycles, 10);
    }

    #[test]
    fn test_archive_records() {
        let mut ds = DataStore::default();
        ds.cycle_start(10.0, 2.5);

        ds.motor_ctrl_output.telemetry.push(MotorTelemetry {
            motor_id: 1,
            current_ma: 120.0,
            position_deg: 45.0,
            pot: 2048,
        });

        let rows = ds.motor_telemetry_records();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].motor_id, 1);
        assert_eq!(rows[0].time_s, 2.5);

        // No solve, no wrist row
        ds.wrist_ctrl_output = Some(wrist_ctrl::OutputData {
            connected: true,
            orientation: OrientationCmd::new(0.0, 60.0, 0.0),
            setpoints: Some([75940, 98370, -79412]),
            yaw_min_deg: -180.0,
            yaw_max_deg: 180.0,
            torque: [true; 3],
        });
        assert!(ds.wrist_setpoint_record().is_none());

        ds.wrist_ctrl_status_rpt.solved = true;
        let row = ds.wrist_setpoint_record().unwrap();
        assert_eq!(row.setpoint1, 75940);
        assert_eq!(row.setpoint3, -79412);
        assert_eq!(row.pitch_deg, 60.0);
    }
}
