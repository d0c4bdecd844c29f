//! Control inputs and arbitration
//!
//! Human signals and bot actions both reduce to a [`ControlTuple`]; the
//! [`ControlArbiter`] decides which one drives the lander each tick.

pub mod arbiter;
pub mod human;

pub use arbiter::{ControlArbiter, ControlSource};
pub use human::{HumanCommand, HumanController, InputSignals};

use serde::{Deserialize, Serialize};

/// One resolved control vector
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ControlTuple {
    /// Commanded engine level (0..1)
    pub target_thrust: f32,
    /// Commanded tilt from vertical (radians, CCW positive)
    pub target_angle: f32,
    /// Convert credits to fuel while landed
    pub refuel: bool,
}

impl ControlTuple {
    pub fn new(target_thrust: f32, target_angle: f32, refuel: bool) -> Self {
        Self {
            target_thrust: if target_thrust.is_finite() {
                target_thrust.clamp(0.0, 1.0)
            } else {
                0.0
            },
            target_angle: if target_angle.is_finite() {
                crate::normalize_angle(target_angle)
            } else {
                0.0
            },
            refuel,
        }
    }
}
