//! Routing of joint hardware events onto motor states

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use serde::Serialize;
use std::collections::HashMap;

// Internal
use super::MotorState;
use comms_if::eqpt::motor::{JointEvent, JointQuantity};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Handler and republished output for every quantity the board reports.
const HANDLERS: [(JointQuantity, Handler, Option<OutputSlot>); 10] = [
    (
        JointQuantity::Current,
        MotorState::on_current,
        Some(OutputSlot::Current),
    ),
    (
        JointQuantity::ShaftCounter,
        MotorState::on_shaft_counter,
        Some(OutputSlot::MotorPosition),
    ),
    (JointQuantity::Pot, MotorState::on_pot, None),
    (JointQuantity::Kp, MotorState::on_kp, None),
    (
        JointQuantity::ClicksPerRev,
        MotorState::on_clicks_per_rev,
        None,
    ),
    (JointQuantity::SpeedMin, MotorState::on_speed_min, None),
    (JointQuantity::CurrentMax, MotorState::on_current_max, None),
    (JointQuantity::PotZero, MotorState::on_pot_zero, None),
    (JointQuantity::ControlMode, MotorState::on_control_mode, None),
    (JointQuantity::Deadband, MotorState::on_deadband, None),
];

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

type Handler = fn(&mut MotorState, i32) -> Option<f64>;

/// Dispatch table from `(motor index, quantity)` to the motor owning that index.
#[derive(Default)]
pub struct TelemetryBridge {
    routes: HashMap<(u8, JointQuantity), Route>,
}

#[derive(Clone, Copy)]
struct Route {
    /// Position of the motor in the caller's motor list
    motor: usize,
    handler: Handler,
    output: Option<OutputSlot>,
}

/// Result of dispatching one event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dispatched {
    /// Position of the motor which took the event
    pub motor: usize,

    /// Value to republish, if the quantity has an output
    pub output: Option<(OutputSlot, f64)>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Named outputs a motor republishes telemetry on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OutputSlot {
    /// Live current in milliamps
    Current,

    /// Output shaft position in degrees
    MotorPosition,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl OutputSlot {
    pub const ALL: [OutputSlot; 2] = [OutputSlot::Current, OutputSlot::MotorPosition];

    pub fn name(&self) -> &'static str {
        match self {
            OutputSlot::Current => "Current",
            OutputSlot::MotorPosition => "MotorPosition",
        }
    }
}

impl TelemetryBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route every quantity reported for `motor_id` to the motor at position `motor`.
    pub fn register(&mut self, motor: usize, motor_id: u8) {
        for (quantity, handler, output) in HANDLERS.iter() {
            self.routes.insert(
                (motor_id, *quantity),
                Route {
                    motor,
                    handler: *handler,
                    output: *output,
                },
            );
        }
    }

    /// Drop every route for `motor_id`.
    pub fn unregister(&mut self, motor_id: u8) {
        self.routes.retain(|(id, _), _| *id != motor_id);
    }

    /// Rebuild the whole table from the motors' current indexes.
    pub fn rebuild<M: AsRef<MotorState>>(&mut self, motors: &[M]) {
        self.routes.clear();
        for (i, m) in motors.iter().enumerate() {
            self.register(i, m.as_ref().id());
        }
    }

    /// Deliver an event to the motor it is addressed to.
    ///
    /// Returns `None` if no motor is routed for the event, or if the routed motor's identity no
    /// longer matches the event's index.
    pub fn dispatch<M: AsMut<MotorState>>(
        &self,
        event: &JointEvent,
        motors: &mut [M],
    ) -> Option<Dispatched> {
        let route = self.routes.get(&(event.motor_index, event.quantity))?;
        let state = motors.get_mut(route.motor)?.as_mut();

        if !state.accepts(event) {
            trace!(
                "Dropping {:?} for motor {}, routed motor is now {}",
                event.quantity,
                event.motor_index,
                state.id()
            );
            return None;
        }

        let value = (route.handler)(state, event.raw);

        Some(Dispatched {
            motor: route.motor,
            output: match (route.output, value) {
                (Some(slot), Some(v)) => Some((slot, v)),
                _ => None,
            },
        })
    }
}

impl AsRef<MotorState> for MotorState {
    fn as_ref(&self) -> &MotorState {
        self
    }
}

impl AsMut<MotorState> for MotorState {
    fn as_mut(&mut self) -> &mut MotorState {
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    fn event(motor_index: u8, quantity: JointQuantity, raw: i32) -> JointEvent {
        JointEvent {
            motor_index,
            quantity,
            raw,
        }
    }

    #[test]
    fn test_dispatch_by_index() {
        let mut motors = vec![MotorState::new(0), MotorState::new(1)];
        let mut bridge = TelemetryBridge::new();
        bridge.rebuild(&motors);

        let d = bridge
            .dispatch(&event(1, JointQuantity::Current, 1000), &mut motors)
            .unwrap();
        assert_eq!(d.motor, 1);
        let (slot, value) = d.output.unwrap();
        assert_eq!(slot, OutputSlot::Current);
        assert_relative_eq!(value, 201.416015625, epsilon = 1e-9);
        assert_eq!(motors[1].current(), 1000);
        assert_eq!(motors[0].current(), 0);

        let d = bridge
            .dispatch(&event(0, JointQuantity::ShaftCounter, 1), &mut motors)
            .unwrap();
        assert_eq!(d.output, Some((OutputSlot::MotorPosition, 180.0)));

        let d = bridge
            .dispatch(&event(0, JointQuantity::Deadband, 9), &mut motors)
            .unwrap();
        assert_eq!(d.output, None);
        assert_eq!(motors[0].deadband(), 9);
    }

    #[test]
    fn test_unknown_and_stale_routes() {
        let mut motors = vec![MotorState::new(0)];
        let mut bridge = TelemetryBridge::new();
        bridge.rebuild(&motors);

        // No motor with index 5
        assert!(bridge
            .dispatch(&event(5, JointQuantity::Pot, 3), &mut motors)
            .is_none());

        // Motor moved to index 2 without rebuilding the table
        let mut link = crate::sim::SimMotorBoard::recording();
        motors[0].set_id(&mut link, 2);
        assert!(bridge
            .dispatch(&event(0, JointQuantity::Pot, 3), &mut motors)
            .is_none());
        assert_eq!(motors[0].pot(), 0);

        bridge.rebuild(&motors);
        assert!(bridge
            .dispatch(&event(2, JointQuantity::Pot, 3), &mut motors)
            .is_some());
        assert_eq!(motors[0].pot(), 3);

        bridge.unregister(2);
        assert!(bridge
            .dispatch(&event(2, JointQuantity::Pot, 4), &mut motors)
            .is_none());
    }
}
