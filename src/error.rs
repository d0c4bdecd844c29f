//! Error types
//!
//! Configuration problems are fatal and surface before a simulation starts.
//! Bot failures are recovered at the arbiter boundary. A sync violation is a
//! programming error and is raised as a panic by the contact resolver.

use thiserror::Error;

/// Invalid terrain, target or level parameters.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be positive (got {value})")]
    NonPositive { field: &'static str, value: f32 },
    #[error("{field} must be finite")]
    NonFinite { field: &'static str },
    #[error("world bounds are empty: {axis} min {min} >= max {max}")]
    EmptyWorld { axis: &'static str, min: f32, max: f32 },
    #[error("start x {x} lies outside the world [{min}, {max}]")]
    StartOutsideWorld { x: f32, min: f32, max: f32 },
    #[error("target spacing {spacing} cannot fit pads of width {width} with jitter {jitter}")]
    TargetsOverlap { spacing: f32, width: f32, jitter: f32 },
    #[error("explicit target at x={x} overlaps or crowds its neighbour")]
    ExplicitTargetsOverlap { x: f32 },
    #[error("parameters yield zero placeable landing targets")]
    NoPlaceableTargets,
    #[error("bot rate {bot_hz} Hz exceeds physics rate {physics_hz} Hz")]
    BotRateTooHigh { bot_hz: f32, physics_hz: f32 },
    #[error("noise octaves must be between 1 and {max} (got {value})")]
    Octaves { value: u32, max: u32 },
    #[error("invalid level json: {0}")]
    Json(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Json(err.to_string())
    }
}

/// A bot failed to produce an action for one tick.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BotError {
    #[error("bot update failed: {0}")]
    Failed(String),
    #[error("bot panicked: {0}")]
    Panicked(String),
}

/// The physics body disagrees with the resolved logical state.
#[derive(Debug, Error, Clone, PartialEq)]
#[error(
    "engine/state desync: expected rest at ({expected_x}, {expected_y}) angle {expected_angle}, \
     engine at ({actual_x}, {actual_y}) angle {actual_angle} speed {actual_speed}"
)]
pub struct SyncViolation {
    pub expected_x: f32,
    pub expected_y: f32,
    pub expected_angle: f32,
    pub actual_x: f32,
    pub actual_y: f32,
    pub actual_angle: f32,
    pub actual_speed: f32,
}
