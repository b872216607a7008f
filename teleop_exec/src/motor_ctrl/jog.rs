//! Jog state machine
//!
//! Combines a direction, an enable flag and a speed into the single velocity command applied to a
//! motor. The command is recomputed whenever any of the three changes.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::eqpt::motor::MotorDemand;
use log::trace;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Jog controller state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JogCtrl {
    /// True for forward
    direction: bool,

    enabled: bool,

    speed: u8,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Visible state of the jog controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JogState {
    Idle,
    JoggingForward,
    JoggingReverse,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl JogCtrl {
    pub fn new(speed: u8) -> Self {
        Self {
            speed: clamp_speed(speed as i32),
            ..Default::default()
        }
    }

    pub fn state(&self) -> JogState {
        match (self.enabled, self.direction) {
            (false, _) => JogState::Idle,
            (true, true) => JogState::JoggingForward,
            (true, false) => JogState::JoggingReverse,
        }
    }

    pub fn direction(&self) -> bool {
        self.direction
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn speed(&self) -> u8 {
        self.speed
    }

    /// The velocity command for the current state.
    pub fn command(&self) -> MotorDemand {
        if self.enabled {
            MotorDemand::Jog {
                speed: self.speed,
                forward: self.direction,
            }
        } else {
            MotorDemand::Jog {
                speed: 0,
                forward: false,
            }
        }
    }

    /// Forward button pressed.
    pub fn forward_down(&mut self) -> Option<MotorDemand> {
        self.set(true, true)
    }

    /// Forward button released.
    pub fn forward_up(&mut self) -> Option<MotorDemand> {
        self.set(true, false)
    }

    /// Reverse button pressed.
    pub fn reverse_down(&mut self) -> Option<MotorDemand> {
        self.set(false, true)
    }

    /// Reverse button released.
    pub fn reverse_up(&mut self) -> Option<MotorDemand> {
        self.set(false, false)
    }

    /// Set the direction, returning the new command if it changed anything.
    pub fn set_direction(&mut self, direction: bool) -> Option<MotorDemand> {
        self.set(direction, self.enabled)
    }

    /// Enable or disable jogging, returning the new command if it changed anything.
    pub fn set_enabled(&mut self, enabled: bool) -> Option<MotorDemand> {
        self.set(self.direction, enabled)
    }

    /// Set the jog speed, clamped into `[0, 254]`.
    pub fn set_speed(&mut self, speed: i32) -> Option<MotorDemand> {
        let speed = clamp_speed(speed);
        if speed == self.speed {
            return None;
        }
        self.speed = speed;
        Some(self.command())
    }

    /// Apply a jog speed value received as a signal.
    ///
    /// Values strictly inside `(0, 255)` are rounded, anything else stops the jog.
    pub fn speed_from_signal(&mut self, value: f64) -> Option<MotorDemand> {
        let speed = if value > 0.0 && value < 255.0 {
            value.round_ties_even() as i32
        } else {
            0
        };
        self.set_speed(speed)
    }

    /// Apply a jog button value received as a signal.
    ///
    /// A value above one half sets the direction and enables the jog, anything else disables it.
    pub fn button_from_signal(&mut self, forward: bool, value: f64) -> Option<MotorDemand> {
        if value > 0.5 {
            self.set(forward, true)
        } else {
            self.set_enabled(false)
        }
    }

    /// Set the direction and enable flag together, emitting at most one command.
    fn set(&mut self, direction: bool, enabled: bool) -> Option<MotorDemand> {
        if direction == self.direction && enabled == self.enabled {
            return None;
        }

        self.direction = direction;
        self.enabled = enabled;

        trace!("Jog state now {:?}", self.state());

        Some(self.command())
    }
}

fn clamp_speed(speed: i32) -> u8 {
    speed.max(0).min(254) as u8
}
