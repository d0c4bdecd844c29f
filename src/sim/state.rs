//! Lander state and simulation events

use glam::Vec2;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::config::LevelConfig;

/// Lifecycle of the lander
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// Physics owns pose and velocity
    #[default]
    Flying,
    /// At rest on a target
    Landed,
    /// At rest after an illegal contact or a blown-up integration
    Crashed,
}

impl Lifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::Flying => "flying",
            Lifecycle::Landed => "landed",
            Lifecycle::Crashed => "crashed",
        }
    }

    /// Landed and Crashed both pin the body in place
    pub fn is_at_rest(&self) -> bool {
        !matches!(self, Lifecycle::Flying)
    }
}

/// Why a run ended badly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Contact was too fast, too tilted, or off every target
    Crash,
    /// Non-finite or runaway state from the integrator
    PhysicsInstability,
    OutOfFuel,
    StepBudget,
    TimeBudget,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::Crash => "crash",
            FailureReason::PhysicsInstability => "physics_instability",
            FailureReason::OutOfFuel => "out_of_fuel",
            FailureReason::StepBudget => "step_budget",
            FailureReason::TimeBudget => "time_budget",
        }
    }
}

/// Position and tilt of the lander body
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec2,
    /// Radians from vertical, counter-clockwise positive
    pub angle: f32,
}

impl Pose {
    pub fn new(position: Vec2, angle: f32) -> Self {
        Self { position, angle }
    }
}

/// Linear and angular velocity of the lander body
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Velocity {
    pub linear: Vec2,
    pub angular: f32,
}

impl Velocity {
    pub const ZERO: Self = Self {
        linear: Vec2::ZERO,
        angular: 0.0,
    };

    pub fn speed(&self) -> f32 {
        self.linear.length()
    }
}

/// Logical lander state.
///
/// Pose and velocity are copied in from the physics adapter while Flying; the
/// contact resolver owns everything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanderState {
    pub pose: Pose,
    pub velocity: Velocity,
    /// Current engine output (0..1)
    pub thrust_level: f32,
    pub fuel: f32,
    pub max_fuel: f32,
    pub credits: f32,
    pub lifecycle: Lifecycle,
    /// Target the lander is resting on while Landed
    pub landed_target: Option<usize>,
    pub failure_reason: Option<FailureReason>,
    pub landing_count: u32,
    pub crash_count: u32,
}

impl LanderState {
    pub fn new(level: &LevelConfig, spawn: Pose) -> Self {
        Self {
            pose: spawn,
            velocity: Velocity {
                linear: level.start.velocity,
                angular: 0.0,
            },
            thrust_level: 0.0,
            fuel: level.start_fuel(),
            max_fuel: level.lander.max_fuel,
            credits: level.start.credits.max(0.0),
            lifecycle: Lifecycle::Flying,
            landed_target: None,
            failure_reason: None,
            landing_count: 0,
            crash_count: 0,
        }
    }

    pub fn position(&self) -> Vec2 {
        self.pose.position
    }

    pub fn fuel_fraction(&self) -> f32 {
        if self.max_fuel > 0.0 {
            (self.fuel / self.max_fuel).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    pub fn is_out_of_fuel(&self) -> bool {
        self.fuel <= 0.0
    }
}

/// Something worth telling collaborators about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SimEvent {
    Landed {
        target: usize,
        awarded: f32,
    },
    Crashed {
        reason: FailureReason,
        impact_speed: f32,
    },
    TookOff {
        target: Option<usize>,
    },
    Refueled {
        units: f32,
        cost: f32,
    },
    FuelExhausted,
    Reset,
}

/// RNG state wrapper for serialization
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RngState {
    pub seed: u64,
    pub stream: u64,
}

impl RngState {
    pub fn new(seed: u64) -> Self {
        Self { seed, stream: 0 }
    }

    /// Independent sequence from the same seed
    pub fn with_stream(self, stream: u64) -> Self {
        Self { stream, ..self }
    }

    pub fn to_rng(&self) -> Pcg32 {
        Pcg32::new(self.seed, self.stream)
    }
}
