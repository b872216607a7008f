//! A single motor as seen by the operator
//!
//! Wraps the motor's state with its jog controller and the signals it exchanges with the rest of
//! the application: four input sinks (`AngleSetpoint`, `JogForward`, `JogReverse`, `JogSpeed`)
//! and two outputs (`Current`, `MotorPosition`).

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info};
use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver};

// Internal
use super::{JogCtrl, MotorCalibration, MotorProperty, MotorState, OutputSlot};
use comms_if::{
    eqpt::motor::{JointCommand, MotorDemand, MotorLink},
    signal::{SignalBus, SignalId},
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Counter mask sent with a home request, selects the shaft counter.
const HOME_COUNTER_MASK: u8 = 0x01;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A motor with its jog controller and signal endpoints.
pub struct MotorCtrl {
    state: MotorState,

    jog: JogCtrl,

    friendly_name: String,

    sinks: Vec<Sink>,

    /// Values from every sink, in publish order
    sink_rx: Option<Receiver<(SignalId, f64)>>,

    outputs: HashMap<OutputSlot, SignalId>,
}

struct Sink {
    kind: SinkKind,
    id: SignalId,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Input signals a motor listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkKind {
    AngleSetpoint,
    JogForward,
    JogReverse,
    JogSpeed,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SinkKind {
    pub const ALL: [SinkKind; 4] = [
        SinkKind::AngleSetpoint,
        SinkKind::JogForward,
        SinkKind::JogReverse,
        SinkKind::JogSpeed,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SinkKind::AngleSetpoint => "AngleSetpoint",
            SinkKind::JogForward => "JogForward",
            SinkKind::JogReverse => "JogReverse",
            SinkKind::JogSpeed => "JogSpeed",
        }
    }

    /// Range the bus clamps values on this sink into, if any.
    pub fn range(&self) -> Option<(f64, f64)> {
        match self {
            SinkKind::AngleSetpoint => None,
            SinkKind::JogForward | SinkKind::JogReverse => Some((0.0, 1.0)),
            SinkKind::JogSpeed => Some((0.0, 255.0)),
        }
    }
}

impl MotorCtrl {
    /// Create the motor, subscribe its sinks and push its calibration to the board.
    pub fn new<L: MotorLink>(
        calib: &MotorCalibration,
        link: &mut L,
        bus: &dyn SignalBus,
    ) -> Self {
        let mut motor = Self {
            state: MotorState::new(calib.id),
            jog: JogCtrl::new(0),
            friendly_name: calib.friendly_name.clone(),
            sinks: Vec::new(),
            sink_rx: None,
            outputs: HashMap::new(),
        };

        motor.connect_signals(bus);
        motor.apply_calibration(link, calib);

        debug!("{} created", motor.display_name());

        motor
    }

    // ---- ACCESSORS ----

    pub fn state(&self) -> &MotorState {
        &self.state
    }

    pub fn jog(&self) -> &JogCtrl {
        &self.jog
    }

    pub fn id(&self) -> u8 {
        self.state.id()
    }

    pub fn friendly_name(&self) -> &str {
        &self.friendly_name
    }

    pub fn display_name(&self) -> String {
        format!("Motor {} ({})", self.state.id(), self.friendly_name)
    }

    /// Identifier of one of the motor's input sinks.
    pub fn sink_id(&self, kind: SinkKind) -> Option<&SignalId> {
        self.sinks.iter().find(|s| s.kind == kind).map(|s| &s.id)
    }

    /// Identifier of one of the motor's outputs.
    pub fn output_id(&self, slot: OutputSlot) -> Option<&SignalId> {
        self.outputs.get(&slot)
    }

    /// Snapshot of the calibration, as it would be persisted.
    pub fn calibration(&self) -> MotorCalibration {
        MotorCalibration {
            id: self.state.id(),
            friendly_name: self.friendly_name.clone(),
            kp: self.state.kp(),
            gear_ratio: self.state.gear_ratio(),
            speed_min: self.state.speed_min() as i32,
            current_max_ma: self.state.current_max_ma(),
            pot_zero: self.state.pot_zero(),
            deadband: self.state.deadband(),
            control_mode: self.state.control_mode(),
            jog_speed: self.jog.speed() as i32,
        }
    }

    /// Drain the properties which changed since the last call.
    pub fn take_changes(&mut self) -> Vec<MotorProperty> {
        self.state.take_changes()
    }

    // ---- CALIBRATION ----

    /// Push every calibration field, only the fields which differ are written.
    pub fn apply_calibration<L: MotorLink>(&mut self, link: &mut L, calib: &MotorCalibration) {
        let s = &mut self.state;
        s.set_id(link, calib.id);
        s.set_gear_ratio(link, calib.gear_ratio);
        s.set_kp(link, calib.kp);
        s.set_speed_min(link, calib.speed_min);
        s.set_current_max(link, calib.current_max_ma);
        s.set_pot_zero(link, calib.pot_zero);
        s.set_deadband(link, calib.deadband as i32);
        s.set_control_mode(link, calib.control_mode);
        self.set_jog_speed(link, calib.jog_speed);
    }

    /// Access the state for calibration setters.
    pub fn state_mut(&mut self) -> &mut MotorState {
        &mut self.state
    }

    /// Rename the motor, moving its signals onto the new name.
    pub fn set_friendly_name(&mut self, bus: &dyn SignalBus, name: &str) {
        if self.friendly_name == name {
            return;
        }

        self.disconnect_signals(bus);
        self.friendly_name = name.to_string();
        self.connect_signals(bus);

        self.state.notify(MotorProperty::FriendlyName);
        self.state.notify(MotorProperty::DisplayName);
    }

    // ---- JOG ----

    pub fn jog_forward_down<L: MotorLink>(&mut self, link: &mut L) -> bool {
        let before = self.jog;
        let demand = self.jog.forward_down();
        self.apply_jog(link, before, demand)
    }

    pub fn jog_forward_up<L: MotorLink>(&mut self, link: &mut L) -> bool {
        let before = self.jog;
        let demand = self.jog.forward_up();
        self.apply_jog(link, before, demand)
    }

    pub fn jog_reverse_down<L: MotorLink>(&mut self, link: &mut L) -> bool {
        let before = self.jog;
        let demand = self.jog.reverse_down();
        self.apply_jog(link, before, demand)
    }

    pub fn jog_reverse_up<L: MotorLink>(&mut self, link: &mut L) -> bool {
        let before = self.jog;
        let demand = self.jog.reverse_up();
        self.apply_jog(link, before, demand)
    }

    pub fn set_jog_speed<L: MotorLink>(&mut self, link: &mut L, speed: i32) -> bool {
        let before = self.jog;
        let demand = self.jog.set_speed(speed);
        self.apply_jog(link, before, demand)
    }

    // ---- AUXILIARY COMMANDS ----

    /// Ask the board to report this motor's configuration.
    pub fn refresh_config<L: MotorLink>(&self, link: &mut L) {
        link.send(self.state.id(), MotorDemand::RequestConfig);
    }

    /// Ask the board to report every potentiometer.
    pub fn read_pots<L: MotorLink>(&self, link: &mut L) {
        link.send_command(JointCommand::GetPots, &[]);
    }

    /// Zero this motor's shaft counter.
    pub fn home_joint<L: MotorLink>(&self, link: &mut L) {
        info!("Homing {}", self.display_name());
        link.send_command(
            JointCommand::ResetCounters,
            &[self.state.id(), HOME_COUNTER_MASK],
        );
    }

    // ---- SIGNALS ----

    /// Apply every value received on the sinks since the last call.
    ///
    /// Returns the number of values applied.
    pub fn process_sinks<L: MotorLink>(&mut self, link: &mut L) -> usize {
        let received: Vec<(SinkKind, f64)> = match self.sink_rx {
            Some(ref rx) => rx
                .try_iter()
                .filter_map(|(id, v)| {
                    self.sinks
                        .iter()
                        .find(|s| s.id == id)
                        .map(|s| (s.kind, v))
                })
                .collect(),
            None => Vec::new(),
        };

        for (kind, value) in received.iter() {
            let before = self.jog;
            match kind {
                SinkKind::AngleSetpoint => {
                    self.state.set_angle_setpoint(link, *value);
                }
                SinkKind::JogForward => {
                    let d = self.jog.button_from_signal(true, *value);
                    self.apply_jog(link, before, d);
                }
                SinkKind::JogReverse => {
                    let d = self.jog.button_from_signal(false, *value);
                    self.apply_jog(link, before, d);
                }
                SinkKind::JogSpeed => {
                    let d = self.jog.speed_from_signal(*value);
                    self.apply_jog(link, before, d);
                }
            }
        }

        received.len()
    }

    /// Publish a value on one of the motor's outputs.
    pub fn publish(&self, bus: &dyn SignalBus, slot: OutputSlot, value: f64) {
        if let Some(id) = self.outputs.get(&slot) {
            bus.publish(id, value);
        }
    }

    /// Stop jogging and release every signal, consuming the motor.
    pub fn dispose<L: MotorLink>(mut self, link: &mut L, bus: &dyn SignalBus) {
        let before = self.jog;
        let demand = self.jog.set_enabled(false);
        self.apply_jog(link, before, demand);

        self.disconnect_signals(bus);
    }

    fn qualifier(&self) -> String {
        if self.friendly_name.is_empty() {
            format!("motor{}", self.state.id())
        } else {
            self.friendly_name.clone()
        }
    }

    fn connect_signals(&mut self, bus: &dyn SignalBus) {
        let qualifier = self.qualifier();

        let (tx, rx) = channel();
        self.sinks = SinkKind::ALL
            .iter()
            .map(|kind| {
                let id = SignalId::new(&format!("{}.{}", qualifier, kind.name()));
                bus.subscribe_tagged(&id, tx.clone());
                if let Some((min, max)) = kind.range() {
                    bus.set_range(&id, min, max);
                }
                Sink { kind: *kind, id }
            })
            .collect();
        self.sink_rx = Some(rx);

        self.outputs = OutputSlot::ALL
            .iter()
            .map(|slot| {
                let id = SignalId::new(&format!("{}.{}", qualifier, slot.name()));
                bus.advertise(&id);
                (*slot, id)
            })
            .collect();
    }

    fn disconnect_signals(&mut self, bus: &dyn SignalBus) {
        for sink in self.sinks.drain(..) {
            bus.unsubscribe(&sink.id);
        }
        self.sink_rx = None;
        for (_, id) in self.outputs.drain() {
            bus.unsubscribe(&id);
        }
    }

    /// Send a jog command and notify whichever jog fields changed.
    fn apply_jog<L: MotorLink>(
        &mut self,
        link: &mut L,
        before: JogCtrl,
        demand: Option<MotorDemand>,
    ) -> bool {
        let demand = match demand {
            Some(d) => d,
            None => return false,
        };

        if before.speed() != self.jog.speed() {
            self.state.notify(MotorProperty::JogSpeed);
        }
        if before.direction() != self.jog.direction() {
            self.state.notify(MotorProperty::JogDirection);
        }
        if before.enabled() != self.jog.enabled() {
            self.state.notify(MotorProperty::JogEnabled);
        }

        link.send(self.state.id(), demand);
        true
    }
}

impl AsRef<MotorState> for MotorCtrl {
    fn as_ref(&self) -> &MotorState {
        &self.state
    }
}

impl AsMut<MotorState> for MotorCtrl {
    fn as_mut(&mut self) -> &mut MotorState {
        &mut self.state
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sim::SimMotorBoard;
    use comms_if::signal::LocalSignalBus;

    fn calib(id: u8, name: &str) -> MotorCalibration {
        MotorCalibration {
            id,
            friendly_name: name.into(),
            ..Default::default()
        }
    }

    fn jog(speed: u8, forward: bool) -> MotorDemand {
        MotorDemand::Jog { speed, forward }
    }

    #[test]
    fn test_new_pushes_calibration() {
        let bus = LocalSignalBus::new();
        let mut link = SimMotorBoard::recording();

        let motor = MotorCtrl::new(&calib(1, "elbow"), &mut link, &bus);

        assert_eq!(motor.display_name(), "Motor 1 (elbow)");
        assert_eq!(
            link.demands,
            vec![
                (1, MotorDemand::Index(1)),
                (1, MotorDemand::ClicksPerRev(2.0)),
                (1, MotorDemand::Kp(1.0)),
                (1, MotorDemand::SpeedMin(0)),
                (1, MotorDemand::CurrentMax(4965)),
                (1, MotorDemand::PotZero(0)),
                (1, MotorDemand::Deadband(1)),
                (1, MotorDemand::ControlMode(Default::default())),
                (1, jog(0, false)),
            ]
        );
        assert_eq!(motor.jog().speed(), 32);
        assert_eq!(motor.calibration(), calib(1, "elbow"));

        // Applying the same calibration again is free
        let mut motor = motor;
        link.demands.clear();
        motor.apply_calibration(&mut link, &calib(1, "elbow"));
        assert!(link.demands.is_empty());
    }

    #[test]
    fn test_jog_buttons() {
        let bus = LocalSignalBus::new();
        let mut link = SimMotorBoard::recording();
        let mut motor = MotorCtrl::new(&calib(0, "base"), &mut link, &bus);
        motor.take_changes();
        link.demands.clear();

        assert!(motor.jog_forward_down(&mut link));
        assert!(!motor.jog_forward_down(&mut link));
        assert!(motor.jog_forward_up(&mut link));
        assert!(motor.jog_reverse_down(&mut link));
        assert!(motor.set_jog_speed(&mut link, 100));
        assert!(motor.jog_reverse_up(&mut link));

        assert_eq!(
            link.demands,
            vec![
                (0, jog(32, true)),
                (0, jog(0, false)),
                (0, jog(32, false)),
                (0, jog(100, false)),
                (0, jog(0, false)),
            ]
        );
        assert_eq!(
            motor.take_changes(),
            vec![
                MotorProperty::JogDirection,
                MotorProperty::JogEnabled,
                MotorProperty::JogEnabled,
                MotorProperty::JogDirection,
                MotorProperty::JogEnabled,
                MotorProperty::JogSpeed,
                MotorProperty::JogEnabled,
            ]
        );
    }

    #[test]
    fn test_sinks() {
        let bus = LocalSignalBus::new();
        let mut link = SimMotorBoard::recording();
        let mut motor = MotorCtrl::new(&calib(0, "base"), &mut link, &bus);
        link.demands.clear();

        assert!(bus.publish_named("base.JogSpeed", 64.4));
        assert!(bus.publish_named("base.JogReverse", 1.0));
        assert!(bus.publish_named("base.AngleSetpoint", 12.5));
        assert_eq!(motor.process_sinks(&mut link), 3);

        assert_eq!(
            link.demands,
            vec![
                (0, jog(0, false)),
                (0, jog(64, false)),
                (0, MotorDemand::Angle(12.5)),
            ]
        );
        assert_eq!(motor.process_sinks(&mut link), 0);

        link.demands.clear();
        bus.publish_named("base.JogReverse", 0.0);
        bus.publish_named("base.JogSpeed", 300.0);
        motor.process_sinks(&mut link);
        assert_eq!(link.demands, vec![(0, jog(0, false)), (0, jog(0, false))]);
        assert_eq!(motor.jog().speed(), 0);
    }

    #[test]
    fn test_sinks_keep_publish_order() {
        let bus = LocalSignalBus::new();
        let mut link = SimMotorBoard::recording();
        let mut motor = MotorCtrl::new(&calib(0, "base"), &mut link, &bus);
        link.demands.clear();

        bus.publish_named("base.JogReverse", 1.0);
        bus.publish_named("base.JogForward", 1.0);
        assert_eq!(motor.process_sinks(&mut link), 2);

        assert!(motor.jog().direction());
        assert!(motor.jog().enabled());
        assert_eq!(link.demands, vec![(0, jog(32, false)), (0, jog(32, true))]);
    }

    #[test]
    fn test_sink_ranges() {
        let bus = LocalSignalBus::new();
        let mut link = SimMotorBoard::recording();
        let mut motor = MotorCtrl::new(&calib(0, "base"), &mut link, &bus);

        let speed = bus.lookup("base.JogSpeed").unwrap();
        let rx = bus.subscribe(&speed);
        bus.publish(&speed, 400.0);
        bus.publish(&speed, -3.0);
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![255.0, 0.0]);

        let angle = bus.lookup("base.AngleSetpoint").unwrap();
        let rx = bus.subscribe(&angle);
        bus.publish(&angle, -720.0);
        assert_eq!(rx.try_recv(), Ok(-720.0));

        // Ranges follow the sinks through a rename
        motor.set_friendly_name(&bus, "turret");
        let fwd = bus.lookup("turret.JogForward").unwrap();
        let rx = bus.subscribe(&fwd);
        bus.publish(&fwd, 7.0);
        assert_eq!(rx.try_recv(), Ok(1.0));
    }

    #[test]
    fn test_outputs_and_rename() {
        let bus = LocalSignalBus::new();
        let mut link = SimMotorBoard::recording();
        let mut motor = MotorCtrl::new(&calib(2, "wrist"), &mut link, &bus);

        let current = bus.subscribe(motor.output_id(OutputSlot::Current).unwrap());
        motor.publish(&bus, OutputSlot::Current, 201.4);
        assert_eq!(current.try_recv(), Ok(201.4));

        motor.set_friendly_name(&bus, "roll");
        assert_eq!(motor.display_name(), "Motor 2 (roll)");
        assert!(bus.lookup("wrist.JogSpeed").is_none());
        assert!(bus.lookup("roll.JogSpeed").is_some());
        assert_eq!(
            motor.sink_id(SinkKind::JogSpeed).map(|id| id.name()),
            Some("roll.JogSpeed")
        );
    }

    #[test]
    fn test_aux_commands_and_dispose() {
        let bus = LocalSignalBus::new();
        let mut link = SimMotorBoard::recording();
        let mut motor = MotorCtrl::new(&calib(1, "elbow"), &mut link, &bus);
        link.demands.clear();

        motor.refresh_config(&mut link);
        motor.read_pots(&mut link);
        motor.home_joint(&mut link);
        assert_eq!(link.demands, vec![(1, MotorDemand::RequestConfig)]);
        assert_eq!(
            link.commands,
            vec![
                (JointCommand::GetPots, vec![]),
                (JointCommand::ResetCounters, vec![1, 0x01]),
            ]
        );

        motor.jog_forward_down(&mut link);
        link.demands.clear();
        motor.dispose(&mut link, &bus);
        assert_eq!(link.demands, vec![(1, jog(0, false))]);
        assert!(bus.lookup("elbow.JogForward").is_none());
    }
}
