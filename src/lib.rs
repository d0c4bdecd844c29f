//! Lunar Lander - terrain-relative lander simulation core
//!
//! Core modules:
//! - `sim`: Deterministic simulation (terrain, physics adapter, contact resolution, sensors)
//! - `control`: Human/bot control arbitration
//! - `bot`: Scripted pilot interface and the built-in autopilot
//! - `config`: Data-driven level configuration
//! - `runner`: Headless single-run evaluation

pub mod bot;
pub mod config;
pub mod control;
pub mod error;
pub mod runner;
pub mod sim;

pub use config::{LanderKind, LanderSpec, LevelConfig};
pub use error::{BotError, ConfigError, SyncViolation};

/// Simulation configuration constants
pub mod consts {
    /// Fixed physics timestep (120 Hz)
    pub const PHYSICS_DT: f32 = 1.0 / 120.0;
    /// Default bot update interval (60 Hz)
    pub const BOT_DT: f32 = 1.0 / 60.0;
    /// Maximum substeps per frame to prevent spiral of death
    pub const MAX_SUBSTEPS: u32 = 8;
    /// Longest frame the clock will account for (seconds)
    pub const MAX_FRAME_DT: f32 = 0.1;

    /// Gravitational acceleration (y-up, units/s²)
    pub const GRAVITY: f32 = -9.8;

    /// Landing is legal below this impact speed
    pub const SAFE_LANDING_SPEED: f32 = 15.0;
    /// Landing is legal below this tilt from vertical (radians, 20°)
    pub const SAFE_LANDING_ANGLE: f32 = 20.0 * std::f32::consts::PI / 180.0;

    /// Fuel units transferred per second while refuelling
    pub const REFUEL_RATE: f32 = 1.0;
    /// Credits charged per fuel unit
    pub const CREDITS_PER_FUEL_UNIT: f32 = 10.0;

    /// Seconds after the last human input before the bot regains control
    pub const OVERRIDE_TIMEOUT: f32 = 1.0;
    /// Human attitude commands snap to this increment (45°)
    pub const ANGLE_SNAP: f32 = std::f32::consts::FRAC_PI_4;

    /// Sensor argument limits
    pub const MAX_RAYCAST_RANGE: f32 = 10_000.0;
    pub const MAX_PROFILE_SAMPLES: usize = 4096;

    /// Any speed above this is treated as a blown-up integration
    pub const MAX_STABLE_SPEED: f32 = 5_000.0;
}

/// Normalized angle to [-π, π)
#[inline]
pub fn normalize_angle(mut angle: f32) -> f32 {
    use std::f32::consts::PI;
    while angle >= PI {
        angle -= 2.0 * PI;
    }
    while angle < -PI {
        angle += 2.0 * PI;
    }
    angle
}

/// Snap an angle to the nearest multiple of `step`
#[inline]
pub fn snap_angle(angle: f32, step: f32) -> f32 {
    normalize_angle((angle / step).round() * step)
}

/// Unit vector along the body "up" axis for a CCW-positive tilt from vertical
#[inline]
pub fn body_up(angle: f32) -> glam::Vec2 {
    glam::Vec2::new(-angle.sin(), angle.cos())
}
