//! Simulated equipment
//!
//! Stand-ins for the motor board and the Dynamixel bus. Both record what they are sent and report
//! success unless a failure has been queued with `fail_next`. The simulated motor board can also
//! model the motors behind it, answering configuration requests and reporting jog motion as
//! hardware events.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::Sender;

// Internal
use crate::motor_ctrl::units;
use comms_if::eqpt::{
    dxl::{self, DxlBus},
    motor::{ControlMode, JointCommand, JointEvent, JointQuantity, MotorDemand, MotorLink},
    CommStatus,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Shaft counter rate per unit of jog speed.
///
/// Units: counts per second
const COUNTS_PER_SPEED_S: f64 = 0.05;

/// Raw current drawn per unit of jog speed.
const CURRENT_PER_SPEED: i32 = 20;

/// Raw potentiometer reading of a motor at rest.
const POT_AT_REST: i32 = 2048;

/// Bit of the reset mask selecting the shaft counter.
const SHAFT_COUNTER_MASK: u8 = 0x01;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A simulated motor board.
#[derive(Default)]
pub struct SimMotorBoard {
    /// Every demand sent, when recording
    pub demands: Vec<(u8, MotorDemand)>,

    /// Every board command sent with its payload, when recording
    pub commands: Vec<(JointCommand, Vec<u8>)>,

    record: bool,

    statuses: VecDeque<CommStatus>,

    events: Option<Sender<JointEvent>>,

    motors: HashMap<u8, SimMotor>,
}

/// Registers of one simulated motor.
#[derive(Debug, Clone)]
struct SimMotor {
    kp_raw: i32,
    clicks_per_rev: f64,
    speed_min: u8,
    current_max: u16,
    pot_zero: u16,
    deadband: u16,
    control_mode: ControlMode,

    shaft_counter: f64,
    current: i32,
    pot: i32,
    jog_speed: u8,
    jog_forward: bool,
}

/// A simulated Dynamixel bus.
#[derive(Debug, Default)]
pub struct SimDxlBus {
    /// Every register write, oldest first
    pub writes: Vec<DxlWrite>,

    statuses: VecDeque<CommStatus>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A register write on the Dynamixel bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DxlWrite {
    Byte { id: u8, address: u16, value: u8 },
    Word { id: u8, address: u16, value: u16 },
    Dword { id: u8, address: u16, value: u32 },
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SimMotorBoard {
    /// A board which only records what it is sent.
    pub fn recording() -> Self {
        Self {
            record: true,
            ..Default::default()
        }
    }

    /// A board which models its motors and reports their changes on `events`.
    ///
    /// Nothing is recorded, so the board can run indefinitely.
    pub fn with_events(events: Sender<JointEvent>) -> Self {
        Self {
            events: Some(events),
            ..Default::default()
        }
    }

    /// Make the next communication check fail with the given status.
    pub fn fail_next(&mut self, status: CommStatus) {
        self.statuses.push_back(status);
    }

    /// Advance the simulated motors by `dt` seconds.
    pub fn step(&mut self, dt: f64) {
        let mut events = Vec::new();

        for (index, m) in self.motors.iter_mut() {
            let rate = m.jog_speed as f64 * COUNTS_PER_SPEED_S;
            let current = m.jog_speed as i32 * CURRENT_PER_SPEED;

            if m.jog_speed > 0 {
                let old = m.shaft_counter.round() as i32;
                if m.jog_forward {
                    m.shaft_counter += rate * dt;
                } else {
                    m.shaft_counter -= rate * dt;
                }
                let new = m.shaft_counter.round() as i32;
                if new != old {
                    events.push(event(*index, JointQuantity::ShaftCounter, new));
                }
            }

            if m.current != current {
                m.current = current;
                events.push(event(*index, JointQuantity::Current, current));
            }
        }

        for e in events {
            self.emit(e);
        }
    }

    fn motor(&mut self, index: u8) -> &mut SimMotor {
        self.motors.entry(index).or_insert_with(SimMotor::default)
    }

    fn emit(&mut self, e: JointEvent) {
        let sent = match self.events {
            Some(ref tx) => tx.send(e).is_ok(),
            None => return,
        };

        // Nobody listens anymore
        if !sent {
            self.events = None;
        }
    }

    fn report_config(&mut self, index: u8) {
        let m = self.motor(index).clone();
        let config = [
            (JointQuantity::Kp, m.kp_raw),
            (JointQuantity::ClicksPerRev, m.clicks_per_rev.round() as i32),
            (JointQuantity::SpeedMin, m.speed_min as i32),
            (JointQuantity::CurrentMax, m.current_max as i32),
            (JointQuantity::PotZero, m.pot_zero as i32),
            (JointQuantity::ControlMode, m.control_mode as i32),
            (JointQuantity::Deadband, m.deadband as i32),
        ];

        for (quantity, raw) in config.iter() {
            self.emit(event(index, *quantity, *raw));
        }
    }
}

impl MotorLink for SimMotorBoard {
    fn send(&mut self, motor_index: u8, demand: MotorDemand) {
        trace!("SimMotorBoard: {} <- {:?}", motor_index, demand);

        if self.record {
            self.demands.push((motor_index, demand));
        }

        if self.events.is_none() {
            return;
        }

        let m = self.motor(motor_index);
        match demand {
            MotorDemand::Kp(kp) => m.kp_raw = (kp * 10000.0).round() as i32,
            MotorDemand::ClicksPerRev(c) => m.clicks_per_rev = c,
            MotorDemand::SpeedMin(s) => m.speed_min = s,
            MotorDemand::CurrentMax(c) => m.current_max = c,
            MotorDemand::PotZero(p) => m.pot_zero = p,
            MotorDemand::Deadband(d) => m.deadband = d,
            MotorDemand::ControlMode(c) => m.control_mode = c,
            MotorDemand::Index(new_index) => {
                if let Some(m) = self.motors.remove(&motor_index) {
                    self.motors.insert(new_index, m);
                }
            }
            MotorDemand::Angle(angle_deg) => {
                let gear_ratio = units::gear_ratio_from_clicks(m.clicks_per_rev);
                m.shaft_counter = angle_deg / 360.0 * 2.0 * gear_ratio;
                let raw = m.shaft_counter.round() as i32;
                self.emit(event(motor_index, JointQuantity::ShaftCounter, raw));
            }
            MotorDemand::Jog { speed, forward } => {
                m.jog_speed = speed;
                m.jog_forward = forward;
            }
            MotorDemand::RequestConfig => self.report_config(motor_index),
        }
    }

    fn send_command(&mut self, command: JointCommand, payload: &[u8]) {
        trace!("SimMotorBoard: {:?} {:?}", command, payload);

        if self.record {
            self.commands.push((command, payload.to_vec()));
        }

        match command {
            JointCommand::GetPots => {
                let pots: Vec<_> = self
                    .motors
                    .iter()
                    .map(|(i, m)| event(*i, JointQuantity::Pot, m.pot))
                    .collect();
                for e in pots {
                    self.emit(e);
                }
            }
            JointCommand::ResetCounters => {
                if let [index, mask] = *payload {
                    if mask & SHAFT_COUNTER_MASK != 0 {
                        if let Some(m) = self.motors.get_mut(&index) {
                            m.shaft_counter = 0.0;
                            self.emit(event(index, JointQuantity::ShaftCounter, 0));
                        }
                    }
                }
            }
        }
    }

    fn comm_result(&mut self) -> CommStatus {
        self.statuses.pop_front().unwrap_or(CommStatus::RxSuccess)
    }
}

impl Default for SimMotor {
    fn default() -> Self {
        Self {
            kp_raw: 0,
            clicks_per_rev: 2.0,
            speed_min: 0,
            current_max: 0,
            pot_zero: 0,
            deadband: 0,
            control_mode: ControlMode::default(),
            shaft_counter: 0.0,
            current: 0,
            pot: POT_AT_REST,
            jog_speed: 0,
            jog_forward: false,
        }
    }
}

impl SimDxlBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next communication check fail with the given status.
    pub fn fail_next(&mut self, status: CommStatus) {
        self.statuses.push_back(status);
    }

    /// Drain the recorded writes.
    pub fn take_writes(&mut self) -> Vec<DxlWrite> {
        std::mem::take(&mut self.writes)
    }

    /// Goal positions written so far as `(id, setpoint)`, oldest first.
    pub fn goal_positions(&self) -> Vec<(u8, i32)> {
        self.writes
            .iter()
            .filter_map(|w| match *w {
                DxlWrite::Dword { id, address, value } if address == dxl::GOAL_POSITION => {
                    Some((id, value as i32))
                }
                _ => None,
            })
            .collect()
    }
}

impl DxlBus for SimDxlBus {
    fn write_byte(&mut self, id: u8, address: u16, value: u8) {
        self.writes.push(DxlWrite::Byte { id, address, value });
    }

    fn write_word(&mut self, id: u8, address: u16, value: u16) {
        self.writes.push(DxlWrite::Word { id, address, value });
    }

    fn write_dword(&mut self, id: u8, address: u16, value: u32) {
        self.writes.push(DxlWrite::Dword { id, address, value });
    }

    fn comm_result(&mut self) -> CommStatus {
        self.statuses.pop_front().unwrap_or(CommStatus::RxSuccess)
    }
}

fn event(motor_index: u8, quantity: JointQuantity, raw: i32) -> JointEvent {
    JointEvent {
        motor_index,
        quantity,
        raw,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::mpsc::channel;

    #[test]
    fn test_config_request_and_jog() {
        let (tx, rx) = channel();
        let mut board = SimMotorBoard::with_events(tx);

        board.send(0, MotorDemand::Kp(1.5));
        board.send(0, MotorDemand::RequestConfig);
        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 7);
        assert_eq!(events[0], event(0, JointQuantity::Kp, 15000));

        board.send(0, MotorDemand::Jog { speed: 100, forward: true });
        board.step(1.0);
        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                event(0, JointQuantity::ShaftCounter, 5),
                event(0, JointQuantity::Current, 2000),
            ]
        );

        board.send_command(JointCommand::ResetCounters, &[0, 0x01]);
        assert_eq!(
            rx.try_recv(),
            Ok(event(0, JointQuantity::ShaftCounter, 0))
        );
        assert!(board.demands.is_empty());
    }

    #[test]
    fn test_queued_failures() {
        let mut bus = SimDxlBus::new();
        bus.fail_next(CommStatus::RxTimeout);

        bus.write_dword(3, dxl::GOAL_POSITION, -5i32 as u32);
        assert_eq!(bus.comm_result(), CommStatus::RxTimeout);
        assert_eq!(bus.comm_result(), CommStatus::RxSuccess);
        assert_eq!(bus.goal_positions(), vec![(3, -5)]);
    }
}
