//! Wrist inverse kinematics
//!
//! The wrist is a spherical parallel mechanism driven by three coaxial servos. Given a roll, pitch
//! and yaw of the tool frame the solver finds the three servo angles in closed form and maps them
//! onto the servos' position units.
//!
//! The tool frame is `Rz(roll) * Ry(pitch) * Rz(yaw)`. Its z axis alone fixes the first two joint
//! angles (`theta1`, `theta3`), the yaw is then recovered by the third joint (`theta5`) from the
//! frame's x axis.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{debug, warn};
use nalgebra::{Matrix3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

use util::maths::{round_half_even, wrap_once};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Angle between the first and third joint axes.
///
/// Units: degrees
pub const ALPHA13_DEG: f64 = 75.0;

/// Angle between the third and fifth joint axes.
///
/// Units: degrees
pub const ALPHA35_DEG: f64 = 52.0;

/// Position units of the first servo per half turn.
pub const SERVO1_UNITS_PER_HALF_TURN: f64 = 251000.0;

/// Position units of the second and third servos per half turn.
pub const SERVO23_UNITS_PER_HALF_TURN: f64 = 151875.0;

/// Half range of the third servo's setpoint, setpoints are wrapped into `[-range, range]`.
pub const SETPOINT3_HALF_RANGE: i32 = 151875;

/// A step of the third setpoint larger than this is taken to be a wrap of the servo rather than a
/// genuine move, and is suppressed.
pub const SETPOINT3_MAX_STEP: i32 = 150000;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A commanded orientation of the wrist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OrientationCmd {
    /// Units: degrees
    pub roll_deg: f64,

    /// Units: degrees
    pub pitch_deg: f64,

    /// Units: degrees
    pub yaw_deg: f64,
}

/// Wrist inverse kinematics solver.
///
/// The solver remembers the last third setpoint it accepted in order to suppress wraps, so each
/// mechanism must own its own solver.
#[derive(Debug, Clone, Default)]
pub struct WristIk {
    prev_setpoint3: i32,
}

/// The result of one solve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IkSolution {
    /// Units: radians
    pub theta1: f64,

    /// Units: radians
    pub theta3: f64,

    /// Units: radians
    pub theta5: f64,

    /// Third joint angle of the same pitch and roll at zero yaw.
    ///
    /// Units: radians
    pub theta50: f64,

    /// Setpoints to send to servos 1, 2 and 3
    pub setpoints: [i32; 3],

    /// Third setpoint computed for this orientation, before wrap suppression
    pub candidate_setpoint3: i32,

    /// True if the candidate third setpoint was rejected as a wrap
    pub wrap_suppressed: bool,

    /// Lowest yaw reachable without wrapping the third servo.
    ///
    /// Units: degrees
    pub yaw_min_deg: f64,

    /// Highest yaw reachable without wrapping the third servo.
    ///
    /// Units: degrees
    pub yaw_max_deg: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl OrientationCmd {
    pub fn new(roll_deg: f64, pitch_deg: f64, yaw_deg: f64) -> Self {
        Self {
            roll_deg,
            pitch_deg,
            yaw_deg,
        }
    }
}

impl WristIk {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last third setpoint the solver accepted.
    pub fn prev_setpoint3(&self) -> i32 {
        self.prev_setpoint3
    }

    /// Solve for the servo setpoints of the given orientation.
    ///
    /// Near singular orientations are not guarded against. Where the target is out of reach the
    /// joint angles are NaN, the first two setpoints are zero, the third holds its last accepted
    /// value, and `IkSolution::is_degenerate` reports it.
    pub fn solve(&mut self, cmd: &OrientationCmd) -> IkSolution {
        let roll = cmd.roll_deg.to_radians();
        let pitch = cmd.pitch_deg.to_radians();
        let yaw = cmd.yaw_deg.to_radians();

        let tilt = rot_z(roll) * Rotation3::from_axis_angle(&Vector3::y_axis(), pitch);
        let frame = (tilt * rot_z(yaw)).into_inner();
        let frame0 = tilt.into_inner();

        let (theta1, theta3) = solve_tilt(&frame);
        let theta5 = solve_yaw(&frame, theta1, theta3);
        let theta50 = solve_yaw(&frame0, theta1, theta3);

        debug!(
            "Wrist IK {:?}: theta1 = {}, theta3 = {}, theta5 = {}, theta50 = {}",
            cmd, theta1, theta3, theta5, theta50
        );

        // Yaw range centred on the third servo's wrap point
        let yaw_offset_deg = theta50.to_degrees() + 180.0;
        let yaw_min_deg = -180.0 + yaw_offset_deg + 1.0;
        let yaw_max_deg = 180.0 + yaw_offset_deg - 1.0;

        let setpoint1 =
            -to_units((theta1.to_degrees() - 90.0) * SERVO1_UNITS_PER_HALF_TURN / 180.0);
        let setpoint2 = to_units(theta3.to_degrees() * SERVO23_UNITS_PER_HALF_TURN / 180.0);
        let candidate_setpoint3 = wrap_once(
            -to_units((theta5.to_degrees() + 180.0) * SERVO23_UNITS_PER_HALF_TURN / 180.0),
            SETPOINT3_HALF_RANGE,
        );

        let degenerate = theta1.is_nan() || theta3.is_nan() || theta5.is_nan();

        let mut wrap_suppressed = false;
        if degenerate {
            warn!(
                "Wrist servo 3 has no solution for {:?}, holding {}",
                cmd, self.prev_setpoint3
            );
            wrap_suppressed = true;
        } else if candidate_setpoint3 != self.prev_setpoint3 {
            if (self.prev_setpoint3 - candidate_setpoint3).abs() > SETPOINT3_MAX_STEP {
                warn!(
                    "Wrist servo 3 would jump from {} to {}, holding",
                    self.prev_setpoint3, candidate_setpoint3
                );
                wrap_suppressed = true;
            } else {
                self.prev_setpoint3 = candidate_setpoint3;
            }
        }

        IkSolution {
            theta1,
            theta3,
            theta5,
            theta50,
            setpoints: [setpoint1, setpoint2, self.prev_setpoint3],
            candidate_setpoint3,
            wrap_suppressed,
            yaw_min_deg,
            yaw_max_deg,
        }
    }
}

impl IkSolution {
    /// True if any joint angle could not be solved.
    pub fn is_degenerate(&self) -> bool {
        self.theta1.is_nan() || self.theta3.is_nan() || self.theta5.is_nan()
    }
}

fn rot_z(angle: f64) -> Rotation3<f64> {
    Rotation3::from_axis_angle(&Vector3::z_axis(), angle)
}

/// Joint angles `(theta1, theta3)` pointing the tool axis along the frame's z axis.
fn solve_tilt(frame: &Matrix3<f64>) -> (f64, f64) {
    let (sa13, ca13) = ALPHA13_DEG.to_radians().sin_cos();
    let (sa35, ca35) = ALPHA35_DEG.to_radians().sin_cos();

    let x = frame[(0, 2)];
    let y = frame[(1, 2)];
    let z = frame[(2, 2)];

    // Only the non-negative root is taken, the mechanism's other elbow configuration is never
    // produced
    let c3 = -(z - ca13 * ca35) / (sa13 * sa35);
    let s3 = (1.0 - c3 * c3).sqrt();
    let theta3 = s3.atan2(c3);

    let p = ca35 * sa13 + theta3.cos() * ca13 * sa35;
    let q = theta3.sin() * sa35;
    let d = p * p + q * q;

    let theta1 = ((p * x + q * y) / d).atan2(-(p * y - q * x) / d);

    (theta1, theta3)
}

/// Third joint angle giving the frame's x axis.
///
/// The result is `atan2(cos, sin)` of the joint angle, the setpoint mapping accounts for it.
fn solve_yaw(frame: &Matrix3<f64>, theta1: f64, theta3: f64) -> f64 {
    let (sa13, ca13) = ALPHA13_DEG.to_radians().sin_cos();
    let (sa35, ca35) = ALPHA35_DEG.to_radians().sin_cos();
    let (s1, c1) = theta1.sin_cos();
    let (s3, c3) = theta3.sin_cos();

    let xx = frame[(0, 0)];
    let yx = frame[(0, 1)];

    let a = c1 * ca35 * s3 - s1 * sa13 * sa35 + c3 * ca13 * ca35 * s1;
    let b = c1 * c3 - ca13 * s1 * s3;
    let d = a * a + b * b;

    ((b * xx - a * yx) / d).atan2(-(b * yx + a * xx) / d)
}

/// Convert to whole servo units, NaN becomes zero.
fn to_units(value: f64) -> i32 {
    round_half_even(value) as i32
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    fn solve(ik: &mut WristIk, roll: f64, pitch: f64, yaw: f64) -> IkSolution {
        ik.solve(&OrientationCmd::new(roll, pitch, yaw))
    }

    #[test]
    fn test_pitch_60_fixture() {
        let mut ik = WristIk::new();
        let s = solve(&mut ik, 0.0, 60.0, 0.0);

        assert_relative_eq!(s.theta1, 0.620303442219119, epsilon = 1e-9);
        assert_relative_eq!(s.theta3, 2.034817077679211, epsilon = 1e-9);
        assert_relative_eq!(s.theta5, -1.4989158457415452, epsilon = 1e-9);
        assert_relative_eq!(s.theta50, s.theta5, epsilon = 1e-12);
        assert_relative_eq!(s.yaw_min_deg, -84.8815518062729, epsilon = 1e-7);
        assert_relative_eq!(s.yaw_max_deg, 273.1184481937271, epsilon = 1e-7);
        assert_eq!(s.setpoints, [75940, 98370, -79412]);
        assert!(!s.wrap_suppressed);
        assert!(!s.is_degenerate());
        assert_eq!(ik.prev_setpoint3(), -79412);
    }

    #[test]
    fn test_roll_and_yaw_fixtures() {
        let mut ik = WristIk::new();

        let s = solve(&mut ik, 30.0, 60.0, 0.0);
        assert_relative_eq!(s.theta1, 1.1439022178174179, epsilon = 1e-9);
        assert_eq!(s.setpoints, [34107, 98370, -79412]);

        let s = solve(&mut ik, 30.0, 60.0, 45.0);
        assert_relative_eq!(s.theta5, -2.2843140091389933, epsilon = 1e-9);
        assert_eq!(s.setpoints, [34107, 98370, -41444]);

        let s = solve(&mut ik, 0.0, 60.0, 170.0);
        assert_eq!(s.setpoints, [75940, 98370, 64025]);
    }

    #[test]
    fn test_wrapped_fixture() {
        let mut ik = WristIk::new();
        let s = solve(&mut ik, -45.0, 100.0, 90.0);

        assert_relative_eq!(s.theta1, -0.017730494530675246, epsilon = 1e-9);
        assert_relative_eq!(s.theta3, 1.1180007418198459, epsilon = 1e-9);
        assert_relative_eq!(s.theta5, 2.650857253542852, epsilon = 1e-9);
        assert_relative_eq!(s.theta50, -2.061531726841838, epsilon = 1e-9);
        assert_relative_eq!(s.yaw_min_deg, -117.1170672803538, epsilon = 1e-7);
        assert_relative_eq!(s.yaw_max_deg, 240.8829327196462, epsilon = 1e-7);

        // The raw third setpoint of -280026 is wrapped once
        assert_eq!(s.setpoints, [126917, 54048, 23724]);
    }

    #[test]
    fn test_negative_yaw_wraps() {
        let mut ik = WristIk::new();
        let s = solve(&mut ik, 0.0, 60.0, -170.0);
        assert_eq!(s.setpoints, [75940, 98370, 80900]);
    }

    #[test]
    fn test_yaw_sweep() {
        let mut ik = WristIk::new();
        let expected = [
            (90.0, -3475),
            (94.0, -100),
            (95.0, 744),
            (96.0, 1588),
            (100.0, 4963),
        ];
        for (yaw, setpoint3) in expected.iter() {
            let s = solve(&mut ik, 0.0, 60.0, *yaw);
            assert_eq!(s.setpoints[2], *setpoint3, "yaw {}", yaw);
        }
    }

    #[test]
    fn test_wrap_suppression() {
        let mut ik = WristIk::new();

        for (yaw, setpoint3) in [(-80.0, -146912), (-84.0, -150287), (-85.0, -151131)].iter() {
            let s = solve(&mut ik, 0.0, 60.0, *yaw);
            assert_eq!(s.setpoints[2], *setpoint3);
            assert!(!s.wrap_suppressed);
        }

        // Crossing the wrap point would jump to the other end of the range
        let s = solve(&mut ik, 0.0, 60.0, -86.0);
        assert!(s.wrap_suppressed);
        assert_eq!(s.setpoints[2], -151131);
        assert!(s.candidate_setpoint3 > 0);

        let s = solve(&mut ik, 0.0, 60.0, -90.0);
        assert!(s.wrap_suppressed);
        assert_eq!(s.setpoints[2], -151131);

        // Coming back is accepted again
        let s = solve(&mut ik, 0.0, 60.0, -84.0);
        assert!(!s.wrap_suppressed);
        assert_eq!(s.setpoints[2], -150287);
    }

    #[test]
    fn test_fresh_solver_suppresses_far_setpoints() {
        for yaw in [-85.0, -86.0].iter() {
            let mut ik = WristIk::new();
            let s = solve(&mut ik, 0.0, 60.0, *yaw);
            assert!(s.wrap_suppressed);
            assert_eq!(s.setpoints[2], 0);
        }
    }

    #[test]
    fn test_determinism() {
        let mut a = WristIk::new();
        let mut b = WristIk::new();
        for yaw in [0.0, 20.0, -40.0, 130.0].iter() {
            assert_eq!(
                solve(&mut a, 10.0, 45.0, *yaw).setpoints,
                solve(&mut b, 10.0, 45.0, *yaw).setpoints
            );
        }
    }

    #[test]
    fn test_degenerate_orientation() {
        let mut ik = WristIk::new();
        let s = solve(&mut ik, 0.0, 0.0, 0.0);

        assert!(s.is_degenerate());
        assert!(s.theta3.is_nan());
        assert_eq!(s.setpoints, [0, 0, 0]);
        assert!(s.setpoints[0].abs() <= 251000);
        assert!(s.setpoints[1].abs() <= 151875);
        assert!(s.setpoints[2].abs() <= SETPOINT3_HALF_RANGE);
    }

    #[test]
    fn test_degenerate_keeps_third_setpoint() {
        let mut ik = WristIk::new();

        let s = solve(&mut ik, 0.0, 60.0, 0.0);
        assert_eq!(s.setpoints[2], -79412);

        let s = solve(&mut ik, 0.0, 0.0, 0.0);
        assert!(s.is_degenerate());
        assert!(s.wrap_suppressed);
        assert_eq!(s.setpoints[2], -79412);
        assert_eq!(ik.prev_setpoint3(), -79412);

        // The next reachable orientation moves on from the last good setpoint
        let s = solve(&mut ik, 0.0, 60.0, -85.0);
        assert!(!s.wrap_suppressed);
        assert_eq!(s.setpoints, [75940, 98370, -151131]);
    }
}
