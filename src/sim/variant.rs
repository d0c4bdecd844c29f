//! Lander propulsion variants
//!
//! Every variant turns the same (thrust, attitude) command into engine forces,
//! torque or a kinematic attitude on the rigid body. The adapter picks one at
//! construction and dispatches through [`ThrusterControl`] without knowing
//! which it holds.

use rapier2d::prelude::*;

use crate::config::{LanderKind, LanderSpec};
use crate::{body_up, normalize_angle};

/// Attitude error to desired rotation rate (1/s)
const ATTITUDE_GAIN: f32 = 4.0;
/// Rotation-rate error to differential thrust fraction (s/rad)
const RATE_GAIN: f32 = 1.5;

/// Per-sub-step command handed to a variant
#[derive(Debug, Clone, Copy)]
pub struct ControlInput {
    /// Commanded thrust level (0..1)
    pub target_thrust: f32,
    /// Commanded tilt from vertical (radians, CCW positive)
    pub target_angle: f32,
    /// False once the tank is empty; all thrust is cut
    pub fuel_available: bool,
    pub dt: f32,
}

/// Shared control-application interface of the lander variants
pub trait ThrusterControl: Send + std::fmt::Debug {
    fn kind(&self) -> LanderKind;

    /// Apply the command to the body and return the engine output level (0..1)
    fn apply_controls(&mut self, body: &mut RigidBody, input: &ControlInput) -> f32;

    /// Drop all spooled thrust immediately
    fn cut(&mut self);
}

/// Build the thruster model for a lander
pub fn thrusters_for(spec: &LanderSpec) -> Box<dyn ThrusterControl> {
    match spec.kind {
        LanderKind::Classic => Box::new(ClassicThruster::new(*spec)),
        LanderKind::Differential => Box::new(DifferentialThrusters::new(*spec)),
        LanderKind::Simple => Box::new(SimpleThruster::new(*spec)),
    }
}

/// Move `current` toward `target` at the spool-up or spool-down rate
pub fn spool(current: f32, target: f32, up_rate: f32, down_rate: f32, dt: f32) -> f32 {
    if target > current {
        (current + up_rate * dt).min(target)
    } else {
        (current - down_rate * dt).max(target)
    }
}

/// Rotate `current` toward `target`, easing off within `ease_band`
pub fn slew(current: f32, target: f32, max_rate: f32, ease_band: f32, dt: f32) -> f32 {
    let err = normalize_angle(target - current);
    let rate = if ease_band > 0.0 && err.abs() < ease_band {
        max_rate * (err.abs() / ease_band).max(0.1)
    } else {
        max_rate
    };
    let delta = (rate * dt).min(err.abs()) * err.signum();
    normalize_angle(current + delta)
}

fn clear_forces(body: &mut RigidBody) {
    body.reset_forces(true);
    body.reset_torques(true);
}

/// Pin the attitude and kill any spin picked up from contacts
fn set_attitude(body: &mut RigidBody, angle: f32) {
    let translation = *body.translation();
    body.set_position(Isometry::new(translation, angle), true);
    body.set_angvel(0.0, true);
}

fn main_engine_force(angle: f32, magnitude: f32) -> Vector<Real> {
    let up = body_up(angle);
    vector![up.x, up.y] * magnitude
}

/// Single main engine; attitude is slewed directly at the rotation rate limit
#[derive(Debug, Clone)]
pub struct ClassicThruster {
    spec: LanderSpec,
    level: f32,
}

impl ClassicThruster {
    pub fn new(spec: LanderSpec) -> Self {
        Self { spec, level: 0.0 }
    }
}

impl ThrusterControl for ClassicThruster {
    fn kind(&self) -> LanderKind {
        LanderKind::Classic
    }

    fn apply_controls(&mut self, body: &mut RigidBody, input: &ControlInput) -> f32 {
        self.level = if input.fuel_available {
            spool(
                self.level,
                input.target_thrust.clamp(0.0, 1.0),
                self.spec.thrust_increase_rate,
                self.spec.thrust_decrease_rate,
                input.dt,
            )
        } else {
            0.0
        };

        let angle = slew(
            body.rotation().angle(),
            input.target_angle,
            self.spec.max_rotation_rate,
            self.spec.rotation_ease_band,
            input.dt,
        );
        set_attitude(body, angle);

        clear_forces(body);
        body.add_force(main_engine_force(angle, self.level * self.spec.max_power), true);
        self.level
    }

    fn cut(&mut self) {
        self.level = 0.0;
    }
}

/// Left and right engines at the legs; attitude comes from their imbalance
#[derive(Debug, Clone)]
pub struct DifferentialThrusters {
    spec: LanderSpec,
    left: f32,
    right: f32,
}

impl DifferentialThrusters {
    pub fn new(spec: LanderSpec) -> Self {
        Self {
            spec,
            left: 0.0,
            right: 0.0,
        }
    }

    pub fn levels(&self) -> (f32, f32) {
        (self.left, self.right)
    }
}

impl ThrusterControl for DifferentialThrusters {
    fn kind(&self) -> LanderKind {
        LanderKind::Differential
    }

    fn apply_controls(&mut self, body: &mut RigidBody, input: &ControlInput) -> f32 {
        let spec = &self.spec;
        let angle = body.rotation().angle();
        let err = normalize_angle(input.target_angle - angle);
        let desired_rate =
            (err * ATTITUDE_GAIN).clamp(-spec.max_rotation_rate, spec.max_rotation_rate);
        let diff = ((desired_rate - body.angvel()) * RATE_GAIN).clamp(-1.0, 1.0);

        let (left_target, right_target) = if input.fuel_available {
            let base = input.target_thrust.clamp(0.0, 1.0);
            (
                (base - diff * 0.5).clamp(0.0, 1.0),
                (base + diff * 0.5).clamp(0.0, 1.0),
            )
        } else {
            (0.0, 0.0)
        };
        let (up, down) = (spec.thrust_increase_rate, spec.thrust_decrease_rate);
        self.left = spool(self.left, left_target, up, down, input.dt);
        self.right = spool(self.right, right_target, up, down, input.dt);
        if !input.fuel_available {
            self.left = 0.0;
            self.right = 0.0;
        }

        let per_engine = spec.max_power * 0.5;
        let (hw, hh) = (spec.half_width(), spec.half_height());
        let position = *body.position();
        let left_point = position * point![-hw, -hh];
        let right_point = position * point![hw, -hh];

        clear_forces(body);
        body.add_force_at_point(main_engine_force(angle, self.left * per_engine), left_point, true);
        body.add_force_at_point(main_engine_force(angle, self.right * per_engine), right_point, true);
        (self.left + self.right) * 0.5
    }

    fn cut(&mut self) {
        self.left = 0.0;
        self.right = 0.0;
    }
}

/// Attitude set kinematically and thrust applied without spool lag
#[derive(Debug, Clone)]
pub struct SimpleThruster {
    spec: LanderSpec,
}

impl SimpleThruster {
    pub fn new(spec: LanderSpec) -> Self {
        Self { spec }
    }
}

impl ThrusterControl for SimpleThruster {
    fn kind(&self) -> LanderKind {
        LanderKind::Simple
    }

    fn apply_controls(&mut self, body: &mut RigidBody, input: &ControlInput) -> f32 {
        let level = if input.fuel_available {
            input.target_thrust.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let angle = normalize_angle(input.target_angle);
        set_attitude(body, angle);
        clear_forces(body);
        body.add_force(main_engine_force(angle, level * self.spec.max_power), true);
        level
    }

    fn cut(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body() -> RigidBody {
        RigidBodyBuilder::dynamic().build()
    }

    fn input(target_thrust: f32, target_angle: f32) -> ControlInput {
        ControlInput {
            target_thrust,
            target_angle,
            fuel_available: true,
            dt: 0.1,
        }
    }

    #[test]
    fn test_spool_rates() {
        assert!((spool(0.0, 1.0, 2.0, 4.0, 0.1) - 0.2).abs() < 1e-6);
        assert!((spool(1.0, 0.0, 2.0, 4.0, 0.1) - 0.6).abs() < 1e-6);
        assert_eq!(spool(0.5, 0.55, 2.0, 4.0, 0.1), 0.55);
    }

    #[test]
    fn test_slew_limits_rate_and_settles() {
        let rate = 90f32.to_radians();
        let band = 15f32.to_radians();
        let a = slew(0.0, 1.0, rate, band, 0.1);
        assert!((a - rate * 0.1).abs() < 1e-6);
        let mut angle = 0.0;
        for _ in 0..100 {
            angle = slew(angle, 0.5, rate, band, 0.05);
        }
        assert!((angle - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_classic_spools_and_slews() {
        let mut thruster = ClassicThruster::new(LanderSpec::default());
        let mut rb = body();
        let level = thruster.apply_controls(&mut rb, &input(1.0, 1.0));
        assert!((level - 0.2).abs() < 1e-6);
        let expected = 90f32.to_radians() * 0.1;
        assert!((rb.rotation().angle() - expected).abs() < 1e-5);
        assert_eq!(rb.angvel(), 0.0);
    }

    #[test]
    fn test_no_fuel_cuts_thrust() {
        let mut rb = body();
        for spec in [
            LanderKind::Classic.spec(),
            LanderKind::Differential.spec(),
            LanderKind::Simple.spec(),
        ] {
            let mut thruster = thrusters_for(&spec);
            thruster.apply_controls(&mut rb, &input(1.0, 0.0));
            let mut dry = input(1.0, 0.0);
            dry.fuel_available = false;
            assert_eq!(thruster.apply_controls(&mut rb, &dry), 0.0, "{:?}", spec.kind);
        }
    }

    #[test]
    fn test_simple_is_instant() {
        let mut thruster = SimpleThruster::new(LanderKind::Simple.spec());
        let mut rb = body();
        assert_eq!(thruster.apply_controls(&mut rb, &input(0.7, -0.4)), 0.7);
        assert!((rb.rotation().angle() + 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_differential_fires_right_engine_to_turn_ccw() {
        let mut thrusters = DifferentialThrusters::new(LanderKind::Differential.spec());
        let mut rb = body();
        thrusters.apply_controls(&mut rb, &input(0.5, 0.5));
        let (left, right) = thrusters.levels();
        assert!(right > left);
    }

    #[test]
    fn test_variant_dispatch() {
        for kind in [LanderKind::Classic, LanderKind::Differential, LanderKind::Simple] {
            assert_eq!(thrusters_for(&kind.spec()).kind(), kind);
        }
    }
}
