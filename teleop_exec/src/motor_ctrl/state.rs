//! Per-motor calibration and telemetry state
//!
//! Each calibration field is held twice: the physical value the operator works with and the
//! device-facing value last written to (or reported by) the board. A setter only writes to the
//! board when the converted value differs from the device-facing one, so writing a field back
//! with its current value costs nothing.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{trace, warn};
use serde::Serialize;
use std::convert::TryFrom;

// Internal
use super::units;
use comms_if::eqpt::motor::{ControlMode, JointEvent, MotorDemand, MotorLink};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// State of one motor on the board.
#[derive(Debug, Clone, Serialize)]
pub struct MotorState {
    // ---- CALIBRATION ----
    id: u8,
    kp: f32,
    gear_ratio: f64,
    speed_min: u8,
    current_max_ma: f64,
    pot_zero: u16,
    deadband: u16,
    control_mode: ControlMode,

    /// Commanded absolute angle.
    ///
    /// Units: degrees
    angle_setpoint: f64,

    // ---- TELEMETRY ----
    /// Raw encoder ticks
    shaft_counter: i32,

    /// Raw current ADC ticks
    current: i32,

    /// Raw potentiometer ticks
    pot: i32,

    #[serde(skip)]
    latched: Latched,

    #[serde(skip)]
    changes: Vec<MotorProperty>,
}

/// Values last exchanged with the board, `None` until the first exchange.
#[derive(Debug, Clone, Default)]
struct Latched {
    index: Option<u8>,
    kp: Option<f32>,
    clicks_per_rev: Option<f64>,
    speed_min: Option<u8>,
    current_max: Option<u16>,
    pot_zero: Option<u16>,
    deadband: Option<u16>,
    control_mode: Option<ControlMode>,
    angle: Option<f64>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Properties of a motor whose changes are notified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MotorProperty {
    Id,
    Kp,
    GearRatio,
    SpeedMin,
    CurrentMax,
    PotZero,
    Deadband,
    ControlMode,
    AngleSetpoint,
    ShaftCounter,
    Current,
    Pot,
    JogSpeed,
    JogDirection,
    JogEnabled,
    FriendlyName,
    DisplayName,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl MotorState {
    /// Create the state of the motor with the given index.
    ///
    /// Nothing is written to the board until a setter is called.
    pub fn new(id: u8) -> Self {
        Self {
            id,
            kp: 1.0,
            gear_ratio: 1.0,
            speed_min: 0,
            current_max_ma: 1000.0,
            pot_zero: 0,
            deadband: 1,
            control_mode: ControlMode::default(),
            angle_setpoint: 0.0,
            shaft_counter: 0,
            current: 0,
            pot: 0,
            latched: Latched::default(),
            changes: Vec::new(),
        }
    }

    // ---- ACCESSORS ----

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn kp(&self) -> f32 {
        self.kp
    }

    pub fn gear_ratio(&self) -> f64 {
        self.gear_ratio
    }

    pub fn speed_min(&self) -> u8 {
        self.speed_min
    }

    pub fn current_max_ma(&self) -> f64 {
        self.current_max_ma
    }

    pub fn pot_zero(&self) -> u16 {
        self.pot_zero
    }

    pub fn deadband(&self) -> u16 {
        self.deadband
    }

    pub fn control_mode(&self) -> ControlMode {
        self.control_mode
    }

    pub fn angle_setpoint(&self) -> f64 {
        self.angle_setpoint
    }

    pub fn shaft_counter(&self) -> i32 {
        self.shaft_counter
    }

    pub fn current(&self) -> i32 {
        self.current
    }

    pub fn pot(&self) -> i32 {
        self.pot
    }

    /// Live current.
    ///
    /// Units: milliamps
    pub fn current_ma(&self) -> f64 {
        units::live_current_ma(self.current)
    }

    /// Output shaft position.
    ///
    /// Units: degrees
    pub fn position_deg(&self) -> f64 {
        units::counter_to_deg(self.shaft_counter, self.gear_ratio)
    }

    /// True if the event is addressed to this motor.
    pub fn accepts(&self, event: &JointEvent) -> bool {
        event.motor_index == self.id
    }

    /// Drain the properties which changed since the last call, oldest first.
    pub fn take_changes(&mut self) -> Vec<MotorProperty> {
        std::mem::take(&mut self.changes)
    }

    pub(crate) fn notify(&mut self, property: MotorProperty) {
        self.changes.push(property);
    }

    // ---- CALIBRATION SETTERS ----
    //
    // Each returns true if a write was issued to the board.

    /// Move this state onto another index of the board.
    pub fn set_id<L: MotorLink>(&mut self, link: &mut L, id: u8) -> bool {
        if self.latched.index == Some(id) {
            return false;
        }
        self.id = id;
        self.latched.index = Some(id);
        self.write(link, MotorDemand::Index(id));
        self.notify(MotorProperty::Id);
        self.notify(MotorProperty::DisplayName);
        true
    }

    /// Set the proportional gain, negative gains are clamped to zero.
    pub fn set_kp<L: MotorLink>(&mut self, link: &mut L, kp: f32) -> bool {
        let kp = units::clamp_kp(kp);
        if self.latched.kp == Some(kp) {
            return false;
        }
        self.kp = kp;
        self.latched.kp = Some(kp);
        self.write(link, MotorDemand::Kp(kp));
        self.notify(MotorProperty::Kp);
        true
    }

    /// Set the gear ratio, written to the board as encoder clicks per revolution.
    pub fn set_gear_ratio<L: MotorLink>(&mut self, link: &mut L, gear_ratio: f64) -> bool {
        let clicks = units::clicks_from_gear_ratio(gear_ratio);
        if self.latched.clicks_per_rev == Some(clicks) {
            return false;
        }
        self.gear_ratio = gear_ratio;
        self.latched.clicks_per_rev = Some(clicks);
        self.write(link, MotorDemand::ClicksPerRev(clicks));
        self.notify(MotorProperty::GearRatio);
        true
    }

    /// Set the minimum speed, clamped into `[0, 255]`.
    pub fn set_speed_min<L: MotorLink>(&mut self, link: &mut L, speed_min: i32) -> bool {
        let speed_min = units::clamp_speed_min(speed_min);
        if self.latched.speed_min == Some(speed_min) {
            return false;
        }
        self.speed_min = speed_min;
        self.latched.speed_min = Some(speed_min);
        self.write(link, MotorDemand::SpeedMin(speed_min));
        self.notify(MotorProperty::SpeedMin);
        true
    }

    /// Set the current limit in milliamps, negative limits are clamped to zero.
    pub fn set_current_max<L: MotorLink>(&mut self, link: &mut L, current_max_ma: f64) -> bool {
        let current_max_ma = units::clamp_current_ma(current_max_ma);
        let raw = units::current_ma_to_raw(current_max_ma);
        if self.latched.current_max == Some(raw) {
            return false;
        }
        self.current_max_ma = current_max_ma;
        self.latched.current_max = Some(raw);
        self.write(link, MotorDemand::CurrentMax(raw));
        self.notify(MotorProperty::CurrentMax);
        true
    }

    pub fn set_pot_zero<L: MotorLink>(&mut self, link: &mut L, pot_zero: u16) -> bool {
        if self.latched.pot_zero == Some(pot_zero) {
            return false;
        }
        self.pot_zero = pot_zero;
        self.latched.pot_zero = Some(pot_zero);
        self.write(link, MotorDemand::PotZero(pot_zero));
        self.notify(MotorProperty::PotZero);
        true
    }

    /// Set the deadband, clamped into the 16 bit register.
    pub fn set_deadband<L: MotorLink>(&mut self, link: &mut L, deadband: i32) -> bool {
        let deadband = units::clamp_deadband(deadband);
        if self.latched.deadband == Some(deadband) {
            return false;
        }
        self.deadband = deadband;
        self.latched.deadband = Some(deadband);
        self.write(link, MotorDemand::Deadband(deadband));
        self.notify(MotorProperty::Deadband);
        true
    }

    pub fn set_control_mode<L: MotorLink>(&mut self, link: &mut L, mode: ControlMode) -> bool {
        if self.latched.control_mode == Some(mode) {
            return false;
        }
        self.control_mode = mode;
        self.latched.control_mode = Some(mode);
        self.write(link, MotorDemand::ControlMode(mode));
        self.notify(MotorProperty::ControlMode);
        true
    }

    /// Command an absolute angle in degrees.
    ///
    /// The angle goes to the board as is, without gear ratio scaling.
    pub fn set_angle_setpoint<L: MotorLink>(&mut self, link: &mut L, angle_deg: f64) -> bool {
        if self.latched.angle == Some(angle_deg) {
            return false;
        }
        self.angle_setpoint = angle_deg;
        self.latched.angle = Some(angle_deg);
        self.write(link, MotorDemand::Angle(angle_deg));
        self.notify(MotorProperty::AngleSetpoint);
        true
    }

    // ---- BOARD REPORTS ----
    //
    // Reports update both the physical and device-facing values, so nothing is written back.
    // Telemetry reports return the converted value to republish, if the quantity has an output.

    pub fn on_current(&mut self, raw: i32) -> Option<f64> {
        if self.current != raw {
            self.current = raw;
            self.notify(MotorProperty::Current);
        }
        Some(units::live_current_ma(raw))
    }

    pub fn on_shaft_counter(&mut self, raw: i32) -> Option<f64> {
        if self.shaft_counter != raw {
            self.shaft_counter = raw;
            self.notify(MotorProperty::ShaftCounter);
        }
        Some(units::counter_to_deg(raw, self.gear_ratio))
    }

    pub fn on_pot(&mut self, raw: i32) -> Option<f64> {
        if self.pot != raw {
            self.pot = raw;
            self.notify(MotorProperty::Pot);
        }
        None
    }

    pub fn on_kp(&mut self, raw: i32) -> Option<f64> {
        let kp = units::clamp_kp(units::kp_from_raw(raw));
        self.latched.kp = Some(kp);
        if self.kp != kp {
            self.kp = kp;
            self.notify(MotorProperty::Kp);
        }
        None
    }

    pub fn on_clicks_per_rev(&mut self, raw: i32) -> Option<f64> {
        let clicks = raw as f64;
        let gear_ratio = units::gear_ratio_from_clicks(clicks);
        self.latched.clicks_per_rev = Some(clicks);
        if self.gear_ratio != gear_ratio {
            self.gear_ratio = gear_ratio;
            self.notify(MotorProperty::GearRatio);
        }
        None
    }

    pub fn on_speed_min(&mut self, raw: i32) -> Option<f64> {
        let speed_min = units::clamp_speed_min(raw);
        self.latched.speed_min = Some(speed_min);
        if self.speed_min != speed_min {
            self.speed_min = speed_min;
            self.notify(MotorProperty::SpeedMin);
        }
        None
    }

    pub fn on_current_max(&mut self, raw: i32) -> Option<f64> {
        let current_max_ma = units::current_raw_to_ma(raw);
        self.latched.current_max = Some(raw.max(0).min(u16::MAX as i32) as u16);
        if self.current_max_ma != current_max_ma {
            self.current_max_ma = current_max_ma;
            self.notify(MotorProperty::CurrentMax);
        }
        None
    }

    pub fn on_pot_zero(&mut self, raw: i32) -> Option<f64> {
        let pot_zero = raw.max(0).min(u16::MAX as i32) as u16;
        self.latched.pot_zero = Some(pot_zero);
        if self.pot_zero != pot_zero {
            self.pot_zero = pot_zero;
            self.notify(MotorProperty::PotZero);
        }
        None
    }

    pub fn on_control_mode(&mut self, raw: i32) -> Option<f64> {
        match ControlMode::try_from(raw) {
            Ok(mode) => {
                self.latched.control_mode = Some(mode);
                if self.control_mode != mode {
                    self.control_mode = mode;
                    self.notify(MotorProperty::ControlMode);
                }
            }
            Err(e) => warn!("Motor {} reported {}, ignored", self.id, e),
        }
        None
    }

    pub fn on_deadband(&mut self, raw: i32) -> Option<f64> {
        let deadband = units::clamp_deadband(raw);
        self.latched.deadband = Some(deadband);
        if self.deadband != deadband {
            self.deadband = deadband;
            self.notify(MotorProperty::Deadband);
        }
        None
    }

    fn write<L: MotorLink>(&self, link: &mut L, demand: MotorDemand) {
        trace!("Motor {} <- {:?}", self.id, demand);
        link.send(self.id, demand);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sim::SimMotorBoard;
    use approx::assert_relative_eq;

    #[test]
    fn test_setter_writes_once() {
        let mut link = SimMotorBoard::recording();
        let mut state = MotorState::new(0);

        assert!(state.set_kp(&mut link, 2.0));
        assert!(state.set_speed_min(&mut link, 40));
        assert!(state.set_current_max(&mut link, 1000.0));
        assert!(state.set_deadband(&mut link, 3));
        assert_eq!(
            link.demands,
            vec![
                (0, MotorDemand::Kp(2.0)),
                (0, MotorDemand::SpeedMin(40)),
                (0, MotorDemand::CurrentMax(4965)),
                (0, MotorDemand::Deadband(3)),
            ]
        );
        state.take_changes();
        link.demands.clear();

        // Writing the same values again must not touch the board nor notify
        assert!(!state.set_kp(&mut link, 2.0));
        assert!(!state.set_speed_min(&mut link, 40));
        assert!(!state.set_current_max(&mut link, 1000.0));
        assert!(!state.set_deadband(&mut link, 3));
        assert!(link.demands.is_empty());
        assert!(state.take_changes().is_empty());
    }

    #[test]
    fn test_idempotence_after_conversion() {
        let mut link = SimMotorBoard::recording();
        let mut state = MotorState::new(1);

        state.set_current_max(&mut link, 1000.0);
        link.demands.clear();

        // 1000.05 mA lands on the same register value
        assert!(!state.set_current_max(&mut link, 1000.05));

        // Out of range values clamp onto the same latched value
        state.set_speed_min(&mut link, 255);
        link.demands.clear();
        assert!(!state.set_speed_min(&mut link, 1000));
        state.set_kp(&mut link, 0.0);
        link.demands.clear();
        assert!(!state.set_kp(&mut link, -3.0));
        assert!(link.demands.is_empty());
    }

    #[test]
    fn test_clamped_writes() {
        let mut link = SimMotorBoard::recording();
        let mut state = MotorState::new(0);

        state.set_kp(&mut link, -1.0);
        state.set_current_max(&mut link, -50.0);
        state.set_speed_min(&mut link, 999);
        state.set_current_max(&mut link, 1e6);

        assert_eq!(state.kp(), 0.0);
        assert_eq!(state.speed_min(), 255);
        assert_eq!(
            link.demands,
            vec![
                (0, MotorDemand::Kp(0.0)),
                (0, MotorDemand::CurrentMax(0)),
                (0, MotorDemand::SpeedMin(255)),
                (0, MotorDemand::CurrentMax(65535)),
            ]
        );
    }

    #[test]
    fn test_gear_ratio_and_angle() {
        let mut link = SimMotorBoard::recording();
        let mut state = MotorState::new(0);

        assert!(state.set_gear_ratio(&mut link, 1000.0));
        assert!(state.set_angle_setpoint(&mut link, 45.0));
        assert!(!state.set_angle_setpoint(&mut link, 45.0));
        assert_eq!(
            link.demands,
            vec![
                (0, MotorDemand::ClicksPerRev(2000.0)),
                (0, MotorDemand::Angle(45.0)),
            ]
        );
        assert_eq!(
            state.take_changes(),
            vec![MotorProperty::GearRatio, MotorProperty::AngleSetpoint]
        );
    }

    #[test]
    fn test_reports_update_without_writes() {
        let mut link = SimMotorBoard::recording();
        let mut state = MotorState::new(0);

        state.on_kp(25000);
        state.on_clicks_per_rev(2000);
        state.on_current_max(4965);
        state.on_speed_min(12);
        state.on_pot_zero(512);
        state.on_deadband(4);
        state.on_control_mode(1);

        assert_relative_eq!(state.kp(), 2.5);
        assert_relative_eq!(state.gear_ratio(), 1000.0);
        assert_eq!(state.current_max_ma(), 1000.0);
        assert_eq!(state.speed_min(), 12);
        assert_eq!(state.pot_zero(), 512);
        assert_eq!(state.deadband(), 4);
        assert_eq!(state.control_mode(), ControlMode::Velocity);

        // The board already holds these values so setting them again writes nothing
        assert!(!state.set_kp(&mut link, 2.5));
        assert!(!state.set_gear_ratio(&mut link, 1000.0));
        assert!(!state.set_speed_min(&mut link, 12));
        assert!(!state.set_pot_zero(&mut link, 512));
        assert!(!state.set_deadband(&mut link, 4));
        assert!(!state.set_control_mode(&mut link, ControlMode::Velocity));
        assert!(link.demands.is_empty());

        // An invalid mode is ignored
        state.on_control_mode(42);
        assert_eq!(state.control_mode(), ControlMode::Velocity);
    }

    #[test]
    fn test_telemetry_reports() {
        let mut state = MotorState::new(0);
        let mut link = SimMotorBoard::recording();
        state.set_gear_ratio(&mut link, 1000.0);
        state.take_changes();

        assert_relative_eq!(state.on_current(1000).unwrap(), 201.416015625, epsilon = 1e-9);
        assert_relative_eq!(state.on_shaft_counter(500).unwrap(), 90.0);
        assert_eq!(state.on_pot(77), None);
        assert_eq!(state.current(), 1000);
        assert_eq!(state.shaft_counter(), 500);
        assert_eq!(state.pot(), 77);
        assert_relative_eq!(state.position_deg(), 90.0);

        // Repeated values are republished but not notified twice
        state.on_pot(77);
        assert_eq!(
            state.take_changes(),
            vec![
                MotorProperty::Current,
                MotorProperty::ShaftCounter,
                MotorProperty::Pot
            ]
        );
    }
}
