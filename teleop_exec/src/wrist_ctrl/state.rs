//! Implementations for the WristCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::time::Instant;

// Internal
use super::{
    IkSolution, OrientationCmd, Params, WristCtrlError, WristIk, ERROR_TEXT_HOLD_S,
    NUM_WRIST_AXES,
};
use comms_if::eqpt::{
    dxl::{self, DxlBus, WRIST_IDS},
    CommError,
};
use util::{module::State, session::Session};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Wrist control module state
pub struct WristCtrl<B: DxlBus> {
    params: Params,

    /// The bus to the servos, `None` until connected
    bus: Option<B>,

    ik: WristIk,

    orientation: OrientationCmd,

    /// Commanded torque enable of each servo
    torque: [bool; NUM_WRIST_AXES],

    last_solution: Option<IkSolution>,

    /// Last error and when it was raised
    error: Option<(String, Instant)>,
}

/// Input data to wrist control.
#[derive(Debug, Default, Clone)]
pub struct InputData {
    /// New orientation to drive to, if any
    pub orientation: Option<OrientationCmd>,

    /// Torque changes to apply
    pub torque: Vec<(WristAxis, bool)>,
}

/// Output data from wrist control.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct OutputData {
    pub connected: bool,

    pub orientation: OrientationCmd,

    /// Setpoints last written to the servos
    pub setpoints: Option<[i32; NUM_WRIST_AXES]>,

    /// Units: degrees
    pub yaw_min_deg: f64,

    /// Units: degrees
    pub yaw_max_deg: f64,

    pub torque: [bool; NUM_WRIST_AXES],
}

/// Status report for WristCtrl processing.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct StatusReport {
    /// A solve took place this cycle
    pub solved: bool,

    /// The third servo's setpoint was held to avoid a wrap
    pub wrap_suppressed: bool,

    /// The orientation could not be solved
    pub degenerate: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Axes of the wrist, each driven by one servo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WristAxis {
    Roll,
    Pitch,
    Yaw,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl WristAxis {
    /// Position of the axis' servo in `WRIST_IDS`.
    pub fn index(&self) -> usize {
        match self {
            WristAxis::Roll => 0,
            WristAxis::Pitch => 1,
            WristAxis::Yaw => 2,
        }
    }

    /// Number of the axis' servo as shown to the operator.
    pub fn motor_number(&self) -> usize {
        self.index() + 1
    }
}

impl<B: DxlBus> Default for WristCtrl<B> {
    fn default() -> Self {
        let params = Params::default();
        Self {
            orientation: params.home,
            params,
            bus: None,
            ik: WristIk::new(),
            torque: [true; NUM_WRIST_AXES],
            last_solution: None,
            error: None,
        }
    }
}

impl<B: DxlBus> WristCtrl<B> {
    pub fn new(params: Params) -> Self {
        Self {
            orientation: params.home,
            params,
            ..Default::default()
        }
    }

    // ---- ACCESSORS ----

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn is_connected(&self) -> bool {
        self.bus.is_some()
    }

    pub fn bus(&self) -> Option<&B> {
        self.bus.as_ref()
    }

    pub fn bus_mut(&mut self) -> Option<&mut B> {
        self.bus.as_mut()
    }

    pub fn orientation(&self) -> OrientationCmd {
        self.orientation
    }

    pub fn torque(&self, axis: WristAxis) -> bool {
        self.torque[axis.index()]
    }

    pub fn last_solution(&self) -> Option<&IkSolution> {
        self.last_solution.as_ref()
    }

    /// Yaw range reachable from the current pitch and roll, `(-180, 180)` before the first solve.
    ///
    /// Units: degrees
    pub fn yaw_range(&self) -> (f64, f64) {
        match self.last_solution {
            Some(ref s) => (s.yaw_min_deg, s.yaw_max_deg),
            None => (-180.0, 180.0),
        }
    }

    /// The text of the last error, empty once it is older than `ERROR_TEXT_HOLD_S`.
    pub fn error_text(&self) -> &str {
        match self.error {
            Some((ref text, raised)) if raised.elapsed().as_secs_f64() < ERROR_TEXT_HOLD_S => {
                text.as_str()
            }
            _ => "",
        }
    }

    // ---- CONNECTION ----

    /// Take control of the servos on the given bus.
    ///
    /// Every servo has its torque enabled, its goal position zeroed, its goal acceleration set
    /// and its blue LED lit, then the wrist is driven to the home orientation. The wrist stays
    /// connected when a write fails, the first failure is returned.
    pub fn connect(&mut self, bus: B) -> Result<(), WristCtrlError> {
        self.bus = Some(bus);

        let mut first_err = None;

        if let Some(bus) = self.bus.as_mut() {
            for (i, id) in WRIST_IDS.iter().enumerate() {
                bus.write_byte(*id, dxl::TORQUE_ENABLE, 1);
                if let Err(e) = bus.check_comm() {
                    first_err.get_or_insert(WristCtrlError::ConnectTorqueFailed(e));
                }

                bus.write_dword(*id, dxl::GOAL_POSITION, 0);
                bus.write_dword(*id, dxl::GOAL_ACCEL, self.params.goal_accel[i]);
                bus.write_byte(*id, dxl::LED_BLUE, self.params.led_brightness);
                if let Err(e) = bus.check_comm() {
                    first_err.get_or_insert(WristCtrlError::ConnectFailed(e));
                }
            }
        }

        // The servos now sit at zero
        self.torque = [true; NUM_WRIST_AXES];
        self.ik = WristIk::new();

        self.orientation = self.params.home;
        if let Err(e) = self.write_setpoints() {
            first_err.get_or_insert(WristCtrlError::HomeFailed(e));
        }

        match first_err {
            Some(e) => Err(self.raise(e)),
            None => {
                info!("Connected to Dynamixel Pro, wrist at {:?}", self.orientation);
                Ok(())
            }
        }
    }

    /// Release the bus.
    pub fn disconnect(&mut self) -> Option<B> {
        info!("Disconnected from Dynamixel Pro");
        self.bus.take()
    }

    // ---- ORIENTATION ----

    pub fn set_roll(&mut self, roll_deg: f64) -> Result<(), WristCtrlError> {
        let mut cmd = self.orientation;
        cmd.roll_deg = roll_deg;
        self.set_orientation(cmd)
    }

    pub fn set_pitch(&mut self, pitch_deg: f64) -> Result<(), WristCtrlError> {
        let mut cmd = self.orientation;
        cmd.pitch_deg = pitch_deg;
        self.set_orientation(cmd)
    }

    pub fn set_yaw(&mut self, yaw_deg: f64) -> Result<(), WristCtrlError> {
        let mut cmd = self.orientation;
        cmd.yaw_deg = yaw_deg;
        self.set_orientation(cmd)
    }

    /// Command a new orientation.
    ///
    /// Does nothing if the orientation is unchanged. Otherwise the orientation is stored, and if
    /// connected the servos are driven to it with a single solve.
    pub fn set_orientation(&mut self, cmd: OrientationCmd) -> Result<(), WristCtrlError> {
        // The first changed axis names the failure, as the operator moved that one
        let axis = if cmd.roll_deg != self.orientation.roll_deg {
            WristAxis::Roll
        } else if cmd.pitch_deg != self.orientation.pitch_deg {
            WristAxis::Pitch
        } else if cmd.yaw_deg != self.orientation.yaw_deg {
            WristAxis::Yaw
        } else {
            return Ok(());
        };

        self.orientation = cmd;

        if !self.is_connected() {
            return Ok(());
        }

        match self.write_setpoints() {
            Ok(()) => Ok(()),
            Err(source) => Err(self.raise(WristCtrlError::SetpointFailed {
                motor: axis.motor_number(),
                source,
            })),
        }
    }

    // ---- TORQUE ----

    /// Enable or disable the torque of one servo.
    ///
    /// If the bus reports a failure the servo is commanded back to torque enabled.
    pub fn set_torque(&mut self, axis: WristAxis, enabled: bool) -> Result<(), WristCtrlError> {
        let i = axis.index();
        if self.torque[i] == enabled {
            return Ok(());
        }

        let bus = self.bus.as_mut().ok_or(WristCtrlError::NotConnected)?;
        let id = WRIST_IDS[i];

        self.torque[i] = enabled;
        bus.write_byte(id, dxl::TORQUE_ENABLE, enabled as u8);

        let source = match bus.check_comm() {
            Ok(()) => {
                debug!("Servo {} torque {}", id, enabled);
                return Ok(());
            }
            Err(e) => e,
        };

        self.torque[i] = true;
        let motor = axis.motor_number();

        if enabled {
            return Err(self.raise(WristCtrlError::TorqueEnableFailed { motor, source }));
        }

        bus.write_byte(id, dxl::TORQUE_ENABLE, 1);
        if let Err(e) = bus.check_comm() {
            warn!("Could not re-enable torque of servo {}: {}", id, e);
        }

        Err(self.raise(WristCtrlError::TorqueDisableFailed { motor, source }))
    }

    /// Solve the current orientation and write the setpoints.
    fn write_setpoints(&mut self) -> Result<(), CommError> {
        let bus = self.bus.as_mut().ok_or(CommError::NotConnected)?;

        let solution = self.ik.solve(&self.orientation);
        if solution.is_degenerate() {
            warn!("Wrist orientation {:?} is out of reach", self.orientation);
        }

        for (id, setpoint) in WRIST_IDS.iter().zip(solution.setpoints.iter()) {
            // Negative setpoints go out as their two's complement
            bus.write_dword(*id, dxl::GOAL_POSITION, *setpoint as u32);
        }

        self.last_solution = Some(solution);

        bus.check_comm()
    }

    /// Show the error to the operator, handing it back.
    fn raise(&mut self, err: WristCtrlError) -> WristCtrlError {
        warn!("{}", err);
        self.error = Some((err.to_string(), Instant::now()));
        err
    }
}

impl<B: DxlBus> State for WristCtrl<B> {
    type InitData = Params;
    type InitError = WristCtrlError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = WristCtrlError;

    /// Initialise the WristCtrl module.
    ///
    /// Expected init data is the wrist parameters, connection is done separately.
    fn init(&mut self, init_data: Self::InitData, _session: &Session) -> Result<(), Self::InitError> {
        self.params = init_data;
        self.orientation = self.params.home;
        self.ik = WristIk::new();
        self.last_solution = None;

        Ok(())
    }

    /// Perform cyclic processing of wrist control.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        let mut report = StatusReport::default();

        for (axis, enabled) in input_data.torque.iter() {
            self.set_torque(*axis, *enabled)?;
        }

        if let Some(cmd) = input_data.orientation {
            let before = self.last_solution;
            self.set_orientation(cmd)?;

            if self.last_solution != before {
                if let Some(ref s) = self.last_solution {
                    report.solved = true;
                    report.wrap_suppressed = s.wrap_suppressed;
                    report.degenerate = s.is_degenerate();
                }
            }
        }

        let (yaw_min_deg, yaw_max_deg) = self.yaw_range();

        Ok((
            OutputData {
                connected: self.is_connected(),
                orientation: self.orientation,
                setpoints: self.last_solution.map(|s| s.setpoints),
                yaw_min_deg,
                yaw_max_deg,
                torque: self.torque,
            },
            report,
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sim::{DxlWrite, SimDxlBus};
    use comms_if::eqpt::CommStatus;

    fn params() -> Params {
        Params {
            home: OrientationCmd::new(0.0, 60.0, 0.0),
            ..Default::default()
        }
    }

    fn connected() -> WristCtrl<SimDxlBus> {
        let mut wrist = WristCtrl::new(params());
        wrist.connect(SimDxlBus::new()).unwrap();
        wrist.bus_mut().unwrap().writes.clear();
        wrist
    }

    #[test]
    fn test_connect_sequence() {
        let mut wrist = WristCtrl::new(params());
        wrist.connect(SimDxlBus::new()).unwrap();

        let bus = wrist.bus().unwrap();
        let accels = [1, 1, 10];
        for (i, id) in WRIST_IDS.iter().enumerate() {
            assert_eq!(
                bus.writes[i * 4..i * 4 + 4],
                [
                    DxlWrite::Byte { id: *id, address: dxl::TORQUE_ENABLE, value: 1 },
                    DxlWrite::Dword { id: *id, address: dxl::GOAL_POSITION, value: 0 },
                    DxlWrite::Dword { id: *id, address: dxl::GOAL_ACCEL, value: accels[i] },
                    DxlWrite::Byte { id: *id, address: dxl::LED_BLUE, value: 255 },
                ]
            );
        }

        // Then driven home
        assert_eq!(bus.writes.len(), 15);
        assert_eq!(
            &bus.goal_positions()[3..],
            &[(1, 75940), (2, 98370), (3, -79412)]
        );
        assert_eq!(wrist.error_text(), "");
    }

    #[test]
    fn test_connect_failure_keeps_going() {
        let mut bus = SimDxlBus::new();
        bus.fail_next(CommStatus::TxFail);

        let mut wrist = WristCtrl::new(params());
        let err = wrist.connect(bus).unwrap_err();

        assert!(matches!(err, WristCtrlError::ConnectTorqueFailed(_)));
        assert_eq!(wrist.error_text(), "Failed to enable torque!");
        assert!(wrist.is_connected());
        assert_eq!(wrist.bus().unwrap().writes.len(), 15);
    }

    #[test]
    fn test_orientation_setters() {
        let mut wrist = connected();

        // Unchanged values write nothing
        wrist.set_pitch(60.0).unwrap();
        assert!(wrist.bus().unwrap().writes.is_empty());

        wrist.set_roll(30.0).unwrap();
        assert_eq!(
            wrist.bus().unwrap().goal_positions(),
            vec![(1, 34107), (2, 98370), (3, -79412)]
        );

        wrist.set_roll(0.0).unwrap();
        wrist.set_yaw(170.0).unwrap();
        assert_eq!(
            wrist.bus().unwrap().goal_positions()[6..],
            [(1, 75940), (2, 98370), (3, 64025)]
        );

        let (min, max) = wrist.yaw_range();
        assert!((min - -84.8815518062729).abs() < 1e-7);
        assert!((max - 273.1184481937271).abs() < 1e-7);
    }

    #[test]
    fn test_setter_while_disconnected() {
        let mut wrist: WristCtrl<SimDxlBus> = WristCtrl::new(params());

        wrist.set_yaw(20.0).unwrap();
        assert_eq!(wrist.orientation().yaw_deg, 20.0);
        assert!(wrist.last_solution().is_none());
        assert_eq!(wrist.yaw_range(), (-180.0, 180.0));
    }

    #[test]
    fn test_setpoint_failure_names_motor() {
        let mut wrist = connected();
        wrist.bus_mut().unwrap().fail_next(CommStatus::RxTimeout);

        let err = wrist.set_yaw(45.0).unwrap_err();
        assert!(matches!(err, WristCtrlError::SetpointFailed { motor: 3, .. }));
        assert_eq!(wrist.error_text(), "Failed to send Motor3 setpoint!");

        // The orientation is kept even though the write failed
        assert_eq!(wrist.orientation().yaw_deg, 45.0);
    }

    #[test]
    fn test_torque_revert() {
        let mut wrist = connected();

        wrist.set_torque(WristAxis::Pitch, false).unwrap();
        assert!(!wrist.torque(WristAxis::Pitch));
        assert_eq!(
            wrist.bus().unwrap().writes,
            vec![DxlWrite::Byte { id: 2, address: dxl::TORQUE_ENABLE, value: 0 }]
        );
        wrist.set_torque(WristAxis::Pitch, true).unwrap();
        wrist.bus_mut().unwrap().writes.clear();

        wrist.bus_mut().unwrap().fail_next(CommStatus::TxError);
        let err = wrist.set_torque(WristAxis::Yaw, false).unwrap_err();

        assert!(matches!(err, WristCtrlError::TorqueDisableFailed { motor: 3, .. }));
        assert_eq!(wrist.error_text(), "Failed to disable torque3!");
        assert!(wrist.torque(WristAxis::Yaw));
        assert_eq!(
            wrist.bus().unwrap().writes,
            vec![
                DxlWrite::Byte { id: 3, address: dxl::TORQUE_ENABLE, value: 0 },
                DxlWrite::Byte { id: 3, address: dxl::TORQUE_ENABLE, value: 1 },
            ]
        );
    }

    #[test]
    fn test_torque_needs_connection() {
        let mut wrist: WristCtrl<SimDxlBus> = WristCtrl::new(params());
        assert!(matches!(
            wrist.set_torque(WristAxis::Roll, false),
            Err(WristCtrlError::NotConnected)
        ));
        assert!(wrist.torque(WristAxis::Roll));
    }

    #[test]
    fn test_proc() {
        let mut wrist = connected();

        let input = InputData {
            orientation: Some(OrientationCmd::new(30.0, 60.0, 45.0)),
            torque: vec![(WristAxis::Roll, false)],
        };
        let (output, report) = wrist.proc(&input).unwrap();

        assert!(report.solved);
        assert!(!report.wrap_suppressed);
        assert_eq!(output.setpoints, Some([34107, 98370, -41444]));
        assert_eq!(output.torque, [false, true, true]);

        // Same orientation again, nothing solved
        let (_, report) = wrist.proc(&input).unwrap();
        assert!(!report.solved);
    }
}
