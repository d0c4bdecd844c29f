//! Keyboard-style human controller
//!
//! Held keys ramp the commanded thrust and attitude. The controller only
//! produces a command; whether it wins is up to the arbiter.

use serde::{Deserialize, Serialize};

use super::ControlTuple;
use crate::consts::ANGLE_SNAP;
use crate::{normalize_angle, snap_angle};

/// Thrust ramp while a thrust key is held (levels per second)
const THRUST_RAMP: f32 = 1.5;
/// Attitude ramp while a rotate key is held
const ROTATE_RAMP: f32 = std::f32::consts::FRAC_PI_2;
/// Idle thrust settles onto this grid
const THRUST_DETENT: f32 = 0.1;

/// Raw input state for one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InputSignals {
    pub thrust_up: bool,
    pub thrust_down: bool,
    /// Counter-clockwise
    pub rotate_left: bool,
    pub rotate_right: bool,
    pub refuel: bool,
}

impl InputSignals {
    /// True if any key is held
    pub fn any(&self) -> bool {
        self.thrust_up || self.thrust_down || self.rotate_left || self.rotate_right || self.refuel
    }

    pub fn directional(&self) -> bool {
        self.rotate_left || self.rotate_right
    }
}

/// Human output for one tick
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HumanCommand {
    pub controls: ControlTuple,
    /// Some key was held this tick
    pub active: bool,
    /// A rotate key was held this tick
    pub directional: bool,
}

#[derive(Debug, Clone, Default)]
pub struct HumanController {
    thrust: f32,
    raw_angle: f32,
}

impl HumanController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn thrust(&self) -> f32 {
        self.thrust
    }

    /// Unsnapped attitude accumulated from held rotate keys
    pub fn raw_angle(&self) -> f32 {
        self.raw_angle
    }

    pub fn update(&mut self, signals: &InputSignals, dt: f32) -> HumanCommand {
        let dt = dt.max(0.0);
        if signals.thrust_up {
            self.thrust += THRUST_RAMP * dt;
        }
        if signals.thrust_down {
            self.thrust -= THRUST_RAMP * dt;
        }
        if !signals.thrust_up && !signals.thrust_down {
            self.thrust = (self.thrust / THRUST_DETENT).round() * THRUST_DETENT;
        }
        self.thrust = self.thrust.clamp(0.0, 1.0);

        if signals.rotate_left {
            self.raw_angle += ROTATE_RAMP * dt;
        }
        if signals.rotate_right {
            self.raw_angle -= ROTATE_RAMP * dt;
        }
        if signals.directional() {
            self.raw_angle = normalize_angle(self.raw_angle);
        } else {
            // Released: settle onto the nearest detent
            self.raw_angle = snap_angle(self.raw_angle, ANGLE_SNAP);
        }

        HumanCommand {
            controls: ControlTuple {
                target_thrust: self.thrust,
                target_angle: self.raw_angle,
                refuel: signals.refuel,
            },
            active: signals.any(),
            directional: signals.directional(),
        }
    }

    /// Follow the applied controls while someone else is driving
    pub fn sync(&mut self, applied: &ControlTuple) {
        self.thrust = applied.target_thrust;
        self.raw_angle = applied.target_angle;
    }

    /// Zero the throttle, e.g. after touchdown
    pub fn cut_thrust(&mut self) {
        self.thrust = 0.0;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
