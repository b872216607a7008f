//! Cyclic processing of every motor on the motor board

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::Arc;

// Internal
use super::{MotorCalibration, MotorCtrl, MotorCtrlError, MotorProperty, TelemetryBridge};
use comms_if::{
    eqpt::{
        motor::{ControlMode, JointEvent, MotorLink},
        CommError,
    },
    signal::SignalBus,
};
use util::{module::State, session::Session};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// All motors of one board, along with the link to the board and the event stream it reports.
pub struct MotorBoard<L: MotorLink> {
    link: L,

    motors: Vec<MotorCtrl>,

    bridge: TelemetryBridge,

    events: Receiver<JointEvent>,

    /// Set once the board's event stream has gone away
    events_lost: bool,

    bus: Arc<dyn SignalBus + Send + Sync>,
}

/// Input data to the motor board.
#[derive(Debug, Default, Clone)]
pub struct InputData {
    /// Commands to execute this cycle, in order
    pub cmds: Vec<MotorCmd>,
}

/// A command for one motor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotorCmd {
    /// Index of the motor on the board
    pub motor_id: u8,

    pub action: MotorAction,
}

/// Output data from the motor board.
#[derive(Debug, Default, Clone, Serialize)]
pub struct OutputData {
    pub telemetry: Vec<MotorTelemetry>,

    /// Properties which changed this cycle, tagged with the motor's index
    pub changes: Vec<(u8, MotorProperty)>,
}

/// Telemetry of one motor at the end of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MotorTelemetry {
    pub motor_id: u8,

    /// Units: milliamps
    pub current_ma: f64,

    /// Units: degrees
    pub position_deg: f64,

    /// Raw potentiometer reading
    pub pot: i32,
}

/// Status report for motor board processing.
#[derive(Debug, Default, Clone, Serialize)]
pub struct StatusReport {
    /// Number of hardware events received this cycle
    pub num_events: usize,

    /// Number of events no motor claimed
    pub num_unrouted_events: usize,

    /// Number of values received on the motors' sinks
    pub num_sink_values: usize,

    /// Number of commands addressed to an unknown motor
    pub num_rejected_cmds: usize,

    pub events_lost: bool,

    /// Failure reported by the board after this cycle's writes
    pub comm_error: Option<CommError>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Actions that can be performed on a single motor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MotorAction {
    JogForwardDown,
    JogForwardUp,
    JogReverseDown,
    JogReverseUp,
    RefreshConfig,
    ReadPots,
    HomeJoint,
    SetId(u8),
    SetKp(f32),
    SetGearRatio(f64),
    SetSpeedMin(i32),
    SetCurrentMax(f64),
    SetPotZero(u16),
    SetDeadband(i32),
    SetControlMode(ControlMode),
    SetAngle(f64),
    SetJogSpeed(i32),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<L: MotorLink> MotorBoard<L> {
    /// Create an empty board, motors are added by `init`.
    pub fn new(link: L, events: Receiver<JointEvent>, bus: Arc<dyn SignalBus + Send + Sync>) -> Self {
        Self {
            link,
            motors: Vec::new(),
            bridge: TelemetryBridge::new(),
            events,
            events_lost: false,
            bus,
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn motors(&self) -> &[MotorCtrl] {
        &self.motors
    }

    /// Find a motor by its index on the board.
    pub fn motor(&self, motor_id: u8) -> Option<&MotorCtrl> {
        self.motors.iter().find(|m| m.id() == motor_id)
    }

    /// Calibration of every motor, in the order they were added.
    pub fn calibrations(&self) -> Vec<MotorCalibration> {
        self.motors.iter().map(|m| m.calibration()).collect()
    }

    /// Replace every motor on the board with motors built from the given calibrations.
    pub fn load_motors(&mut self, calibs: &[MotorCalibration]) -> Result<(), MotorCtrlError> {
        let mut ids = HashSet::new();
        for c in calibs.iter() {
            if !ids.insert(c.id) {
                return Err(MotorCtrlError::DuplicateId(c.id));
            }
        }

        for m in self.motors.drain(..) {
            m.dispose(&mut self.link, self.bus.as_ref());
        }

        for c in calibs.iter() {
            let motor = MotorCtrl::new(c, &mut self.link, self.bus.as_ref());
            info!("{} loaded", motor.display_name());
            self.motors.push(motor);
        }

        self.bridge.rebuild(&self.motors);

        self.link.check_comm()?;

        Ok(())
    }

    /// Rename a motor, moving its signals onto the new name.
    pub fn rename(&mut self, motor_id: u8, friendly_name: &str) -> Result<(), MotorCtrlError> {
        let bus = self.bus.as_ref();
        let motor = self
            .motors
            .iter_mut()
            .find(|m| m.id() == motor_id)
            .ok_or(MotorCtrlError::UnknownMotor(motor_id))?;

        motor.set_friendly_name(bus, friendly_name);

        Ok(())
    }

    /// Stop every motor and release their signals, saving the final calibration to the session.
    pub fn shutdown(&mut self, session: &Session) -> Vec<MotorCalibration> {
        let calibs = self.calibrations();
        session.save("calibration/motors_exit.json", calibs.clone());

        for m in self.motors.drain(..) {
            m.dispose(&mut self.link, self.bus.as_ref());
        }
        self.bridge = TelemetryBridge::new();

        if let Err(e) = self.link.check_comm() {
            warn!("Could not stop every motor: {}", e);
        }

        calibs
    }

    /// Drain the board's events into the motors, republishing their telemetry.
    fn drain_events(&mut self, report: &mut StatusReport) {
        loop {
            let event = match self.events.try_recv() {
                Ok(e) => e,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.events_lost {
                        warn!("Motor board event stream closed, telemetry will no longer update");
                        self.events_lost = true;
                    }
                    break;
                }
            };

            report.num_events += 1;

            match self.bridge.dispatch(&event, &mut self.motors) {
                Some(d) => {
                    if let Some((slot, value)) = d.output {
                        self.motors[d.motor].publish(self.bus.as_ref(), slot, value);
                    }
                }
                None => {
                    debug!("Unrouted event {:?}", event);
                    report.num_unrouted_events += 1;
                }
            }
        }
    }

    fn execute(motor: &mut MotorCtrl, link: &mut L, action: MotorAction) {
        match action {
            MotorAction::JogForwardDown => {
                motor.jog_forward_down(link);
            }
            MotorAction::JogForwardUp => {
                motor.jog_forward_up(link);
            }
            MotorAction::JogReverseDown => {
                motor.jog_reverse_down(link);
            }
            MotorAction::JogReverseUp => {
                motor.jog_reverse_up(link);
            }
            MotorAction::RefreshConfig => motor.refresh_config(link),
            MotorAction::ReadPots => motor.read_pots(link),
            MotorAction::HomeJoint => motor.home_joint(link),
            MotorAction::SetId(id) => {
                motor.state_mut().set_id(link, id);
            }
            MotorAction::SetKp(kp) => {
                motor.state_mut().set_kp(link, kp);
            }
            MotorAction::SetGearRatio(r) => {
                motor.state_mut().set_gear_ratio(link, r);
            }
            MotorAction::SetSpeedMin(s) => {
                motor.state_mut().set_speed_min(link, s);
            }
            MotorAction::SetCurrentMax(c) => {
                motor.state_mut().set_current_max(link, c);
            }
            MotorAction::SetPotZero(p) => {
                motor.state_mut().set_pot_zero(link, p);
            }
            MotorAction::SetDeadband(d) => {
                motor.state_mut().set_deadband(link, d);
            }
            MotorAction::SetControlMode(m) => {
                motor.state_mut().set_control_mode(link, m);
            }
            MotorAction::SetAngle(a) => {
                motor.state_mut().set_angle_setpoint(link, a);
            }
            MotorAction::SetJogSpeed(s) => {
                motor.set_jog_speed(link, s);
            }
        }
    }
}

impl<L: MotorLink> State for MotorBoard<L> {
    type InitData = Vec<MotorCalibration>;
    type InitError = MotorCtrlError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = MotorCtrlError;

    /// Initialise the motors from their calibrations.
    fn init(&mut self, init_data: Self::InitData, session: &Session) -> Result<(), Self::InitError> {
        self.load_motors(&init_data)?;

        session.save("calibration/motors_init.json", init_data);

        Ok(())
    }

    /// Perform cyclic processing of the board.
    ///
    /// Hardware events are applied first, then values received on the motors' sinks, then the
    /// commands in the input data. A communication failure is reported in the status report
    /// rather than as an error, so telemetry is still produced.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        let mut report = StatusReport::default();
        let mut output = OutputData::default();

        self.drain_events(&mut report);
        report.events_lost = self.events_lost;

        for motor in self.motors.iter_mut() {
            report.num_sink_values += motor.process_sinks(&mut self.link);
        }

        let mut rebuild = false;
        for cmd in input_data.cmds.iter() {
            let motor = match self.motors.iter_mut().find(|m| m.id() == cmd.motor_id) {
                Some(m) => m,
                None => {
                    warn!("{:?} rejected: no motor has index {}", cmd.action, cmd.motor_id);
                    report.num_rejected_cmds += 1;
                    continue;
                }
            };

            if let MotorAction::SetId(_) = cmd.action {
                rebuild = true;
            }

            Self::execute(motor, &mut self.link, cmd.action);
        }

        if rebuild {
            self.bridge.rebuild(&self.motors);

            let mut ids = HashSet::new();
            for m in self.motors.iter() {
                if !ids.insert(m.id()) {
                    warn!("{}", MotorCtrlError::DuplicateId(m.id()));
                }
            }
        }

        if !input_data.cmds.is_empty() || report.num_sink_values > 0 {
            if let Err(e) = self.link.check_comm() {
                warn!("Motor board write failed: {}", e);
                report.comm_error = Some(e);
            }
        }

        for motor in self.motors.iter_mut() {
            let id = motor.id();
            output
                .changes
                .extend(motor.take_changes().into_iter().map(|p| (id, p)));

            let state = motor.state();
            output.telemetry.push(MotorTelemetry {
                motor_id: id,
                current_ma: state.current_ma(),
                position_deg: state.position_deg(),
                pot: state.pot(),
            });
        }

        Ok((output, report))
    }
}
