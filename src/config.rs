//! Level configuration
//!
//! Everything that shapes one simulation instance: world bounds, terrain noise,
//! target placement, lander variant and starting conditions. Defaults come from
//! [`crate::consts`]; levels can also be loaded from JSON.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::consts::{
    BOT_DT, CREDITS_PER_FUEL_UNIT, GRAVITY, OVERRIDE_TIMEOUT, PHYSICS_DT, REFUEL_RATE,
    SAFE_LANDING_ANGLE, SAFE_LANDING_SPEED,
};
use crate::error::ConfigError;

/// Upper bound on noise octaves
pub const MAX_OCTAVES: u32 = 16;

/// Lander variant, selected once at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LanderKind {
    /// Single main thruster, attitude slewed directly
    #[default]
    Classic,
    /// Independent left/right thrusters, attitude from thrust imbalance
    Differential,
    /// Kinematic attitude and instant thrust response
    Simple,
}

impl LanderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LanderKind::Classic => "classic",
            LanderKind::Differential => "differential",
            LanderKind::Simple => "simple",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "classic" => Some(LanderKind::Classic),
            "differential" | "diff" => Some(LanderKind::Differential),
            "simple" => Some(LanderKind::Simple),
            _ => None,
        }
    }

    /// Stock vehicle parameters for this variant
    pub fn spec(&self) -> LanderSpec {
        let base = LanderSpec::default();
        match self {
            LanderKind::Classic => base,
            LanderKind::Differential => LanderSpec {
                kind: LanderKind::Differential,
                width: 10.0,
                height: 7.0,
                ..base
            },
            LanderKind::Simple => LanderSpec {
                kind: LanderKind::Simple,
                hull: HullShape::Box,
                width: 8.0,
                height: 10.0,
                ..base
            },
        }
    }
}

/// Collision hull of the lander body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HullShape {
    /// Apex up, legs at the two base corners
    #[default]
    Triangle,
    Box,
}

/// Physical and operational limits of one lander
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LanderSpec {
    pub kind: LanderKind,
    pub hull: HullShape,
    /// Footprint width (distance between the legs)
    pub width: f32,
    pub height: f32,
    pub dry_mass: f32,
    pub max_fuel: f32,
    /// Mass per fuel unit
    pub fuel_density: f32,
    /// Fuel units per second at full thrust
    pub burn_rate: f32,
    /// Force at full thrust
    pub max_power: f32,
    /// Spool-up rate (thrust level per second)
    pub thrust_increase_rate: f32,
    /// Spool-down rate (thrust level per second)
    pub thrust_decrease_rate: f32,
    /// Radians per second
    pub max_rotation_rate: f32,
    /// Within this angular error the slew rate eases off linearly
    pub rotation_ease_band: f32,
    pub safe_landing_speed: f32,
    pub safe_landing_angle: f32,
    pub radar_inner_range: f32,
    pub radar_outer_range: f32,
    pub proximity_range: f32,
}

impl Default for LanderSpec {
    fn default() -> Self {
        Self {
            kind: LanderKind::Classic,
            hull: HullShape::Triangle,
            width: 8.0,
            height: 8.0,
            dry_mass: 1.0,
            max_fuel: 100.0,
            fuel_density: 0.01,
            burn_rate: 1.0,
            max_power: 50.0,
            thrust_increase_rate: 2.0,
            thrust_decrease_rate: 4.0,
            max_rotation_rate: 90f32.to_radians(),
            rotation_ease_band: 15f32.to_radians(),
            safe_landing_speed: SAFE_LANDING_SPEED,
            safe_landing_angle: SAFE_LANDING_ANGLE,
            radar_inner_range: 2000.0,
            radar_outer_range: 5000.0,
            proximity_range: 500.0,
        }
    }
}

impl LanderSpec {
    pub fn half_width(&self) -> f32 {
        self.width / 2.0
    }

    pub fn half_height(&self) -> f32 {
        self.height / 2.0
    }

    /// Total mass with the given fuel load
    pub fn mass_with_fuel(&self, fuel: f32) -> f32 {
        self.dry_mass + fuel.max(0.0) * self.fuel_density
    }

    fn validate(&self) -> Result<(), ConfigError> {
        positive("lander.width", self.width)?;
        positive("lander.height", self.height)?;
        positive("lander.dry_mass", self.dry_mass)?;
        positive("lander.max_fuel", self.max_fuel)?;
        positive("lander.max_power", self.max_power)?;
        positive("lander.thrust_increase_rate", self.thrust_increase_rate)?;
        positive("lander.thrust_decrease_rate", self.thrust_decrease_rate)?;
        positive("lander.max_rotation_rate", self.max_rotation_rate)?;
        positive("lander.safe_landing_speed", self.safe_landing_speed)?;
        positive("lander.safe_landing_angle", self.safe_landing_angle)?;
        positive("lander.radar_outer_range", self.radar_outer_range)?;
        positive("lander.proximity_range", self.proximity_range)?;
        finite("lander.fuel_density", self.fuel_density)?;
        finite("lander.burn_rate", self.burn_rate)?;
        finite("lander.rotation_ease_band", self.rotation_ease_band)?;
        finite("lander.radar_inner_range", self.radar_inner_range)?;
        Ok(())
    }
}

/// Axis-aligned world rectangle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldBounds {
    pub x_min: f32,
    pub x_max: f32,
    pub y_min: f32,
    pub y_max: f32,
}

impl Default for WorldBounds {
    fn default() -> Self {
        Self {
            x_min: -2000.0,
            x_max: 2000.0,
            y_min: -500.0,
            y_max: 1500.0,
        }
    }
}

impl WorldBounds {
    pub fn width(&self) -> f32 {
        self.x_max - self.x_min
    }

    pub fn clamp_x(&self, x: f32) -> f32 {
        x.clamp(self.x_min, self.x_max)
    }

    pub fn clamp_y(&self, y: f32) -> f32 {
        y.clamp(self.y_min, self.y_max)
    }
}

/// Multi-octave noise shaping the height field
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseParams {
    pub octaves: u32,
    /// Cycles per world unit of the first octave
    pub frequency: f32,
    /// Peak deviation from `base_height`
    pub amplitude: f32,
    /// Amplitude multiplier per octave
    pub persistence: f32,
    /// Frequency multiplier per octave
    pub lacunarity: f32,
    pub base_height: f32,
    /// Linear ramp added to the noise, as height per unit of x
    pub slope: f32,
}

impl Default for NoiseParams {
    fn default() -> Self {
        Self {
            octaves: 4,
            frequency: 0.002,
            amplitude: 120.0,
            persistence: 0.5,
            lacunarity: 2.0,
            base_height: 0.0,
            slope: 0.0,
        }
    }
}

/// A hand-placed landing target
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetSpec {
    pub center_x: f32,
    pub width: f32,
    /// Unset means the pad pays nothing
    #[serde(default)]
    pub credit_value: Option<f32>,
    /// Height of the pad above the levelled ground; zero is flush
    #[serde(default)]
    pub elevation: f32,
}

impl TargetSpec {
    pub fn new(center_x: f32, width: f32) -> Self {
        Self {
            center_x,
            width,
            credit_value: None,
            elevation: 0.0,
        }
    }

    pub fn with_credit(mut self, credit_value: f32) -> Self {
        self.credit_value = Some(credit_value);
        self
    }

    pub fn with_elevation(mut self, elevation: f32) -> Self {
        self.elevation = elevation;
        self
    }

    pub fn x_start(&self) -> f32 {
        self.center_x - self.width / 2.0
    }

    pub fn x_end(&self) -> f32 {
        self.center_x + self.width / 2.0
    }
}

/// How landing targets are laid out along the terrain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetPolicy {
    /// Distance between neighbouring pad centres
    pub spacing: f32,
    /// Pad width
    pub width: f32,
    /// Maximum seeded offset applied to each pad centre
    pub jitter: f32,
    /// Pads never come closer than this to the world edge
    pub edge_margin: f32,
    /// Place an unjittered pad directly under the start position
    pub home_pad: bool,
    pub base_credit: f32,
    /// Extra credits per unit of distance from the start x
    pub credit_per_unit: f32,
    /// When non-empty, replaces generated placement
    pub explicit: Vec<TargetSpec>,
}

impl Default for TargetPolicy {
    fn default() -> Self {
        Self {
            spacing: 600.0,
            width: 80.0,
            jitter: 100.0,
            edge_margin: 100.0,
            home_pad: true,
            base_credit: 100.0,
            credit_per_unit: 0.2,
            explicit: Vec::new(),
        }
    }
}

/// Inputs to terrain generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainParams {
    pub world: WorldBounds,
    pub noise: NoiseParams,
    /// Horizontal distance between control points
    pub resolution: f32,
    pub targets: TargetPolicy,
}

impl Default for TerrainParams {
    fn default() -> Self {
        Self {
            world: WorldBounds::default(),
            noise: NoiseParams::default(),
            resolution: 10.0,
            targets: TargetPolicy::default(),
        }
    }
}

/// Lander spawn conditions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartState {
    pub x: f32,
    /// Height of the lander centre above the terrain at `x`
    pub altitude: f32,
    pub velocity: Vec2,
    pub angle: f32,
    /// `None` starts with a full tank
    pub fuel: Option<f32>,
    pub credits: f32,
}

impl Default for StartState {
    fn default() -> Self {
        Self {
            x: 0.0,
            altitude: 100.0,
            velocity: Vec2::ZERO,
            angle: 0.0,
            fuel: None,
            credits: 0.0,
        }
    }
}

/// Named level presets
///
/// `Flat`, `Hills` and `Mountains` lay out a row of seeded pads. The others
/// are fixed scenarios with one pad at a set distance from the start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LevelPreset {
    Flat,
    #[default]
    Hills,
    Mountains,
    /// Short hop across flat ground
    Drift,
    /// Long hop across flat ground
    Ferry,
    /// Low spawn straight over the pad
    Drop,
    /// High spawn straight over the pad
    Plunge,
    /// Uphill hop onto a raised pad
    Climb,
    /// Rough terrain with a raised pad behind it
    Obstacles,
}

/// Credits paid by the single pad of a scenario preset
const SCENARIO_CREDIT: f32 = 200.0;

impl LevelPreset {
    pub const ALL: [LevelPreset; 9] = [
        LevelPreset::Flat,
        LevelPreset::Hills,
        LevelPreset::Mountains,
        LevelPreset::Drift,
        LevelPreset::Ferry,
        LevelPreset::Drop,
        LevelPreset::Plunge,
        LevelPreset::Climb,
        LevelPreset::Obstacles,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LevelPreset::Flat => "flat",
            LevelPreset::Hills => "hills",
            LevelPreset::Mountains => "mountains",
            LevelPreset::Drift => "drift",
            LevelPreset::Ferry => "ferry",
            LevelPreset::Drop => "drop",
            LevelPreset::Plunge => "plunge",
            LevelPreset::Climb => "climb",
            LevelPreset::Obstacles => "obstacles",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "mountain" => Some(LevelPreset::Mountains),
            name => Self::ALL.into_iter().find(|p| p.as_str() == name),
        }
    }

    fn noise(&self) -> NoiseParams {
        let flat = NoiseParams {
            octaves: 1,
            amplitude: 0.0,
            ..NoiseParams::default()
        };
        match self {
            LevelPreset::Flat
            | LevelPreset::Drift
            | LevelPreset::Ferry
            | LevelPreset::Drop
            | LevelPreset::Plunge => flat,
            LevelPreset::Hills => NoiseParams::default(),
            LevelPreset::Mountains => NoiseParams {
                octaves: 6,
                frequency: 0.003,
                amplitude: 400.0,
                persistence: 0.55,
                ..NoiseParams::default()
            },
            LevelPreset::Climb => NoiseParams {
                base_height: -80.0,
                slope: 0.04,
                ..flat
            },
            LevelPreset::Obstacles => NoiseParams {
                octaves: 6,
                frequency: 0.002,
                amplitude: 450.0,
                persistence: 0.3,
                lacunarity: 3.0,
                ..NoiseParams::default()
            },
        }
    }

    /// Start x, spawn altitude and the pad of a scenario preset
    fn scenario(&self) -> Option<(f32, f32, TargetSpec)> {
        let (start_x, altitude, pad) = match self {
            LevelPreset::Flat | LevelPreset::Hills | LevelPreset::Mountains => return None,
            LevelPreset::Drift => (0.0, 100.0, TargetSpec::new(900.0, 100.0)),
            LevelPreset::Ferry => (0.0, 120.0, TargetSpec::new(1800.0, 105.0)),
            LevelPreset::Drop => (0.0, 70.0, TargetSpec::new(0.0, 110.0)),
            LevelPreset::Plunge => (0.0, 220.0, TargetSpec::new(0.0, 110.0)),
            LevelPreset::Climb => (0.0, 70.0, TargetSpec::new(900.0, 90.0).with_elevation(90.0)),
            LevelPreset::Obstacles => (
                -150.0,
                120.0,
                TargetSpec::new(1300.0, 85.0).with_elevation(100.0),
            ),
        };
        Some((start_x, altitude, pad.with_credit(SCENARIO_CREDIT)))
    }
}

/// Complete description of one level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelConfig {
    pub name: String,
    pub terrain: TerrainParams,
    pub lander: LanderSpec,
    pub start: StartState,
    /// Vertical acceleration (negative is down)
    pub gravity: f32,
    pub physics_hz: f32,
    pub bot_hz: f32,
    /// Seconds of human inactivity before the bot regains control
    pub override_timeout: f32,
    pub refuel_rate: f32,
    pub credits_per_fuel_unit: f32,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            name: LevelPreset::Hills.as_str().to_string(),
            terrain: TerrainParams::default(),
            lander: LanderSpec::default(),
            start: StartState::default(),
            gravity: GRAVITY,
            physics_hz: 1.0 / PHYSICS_DT,
            bot_hz: 1.0 / BOT_DT,
            override_timeout: OVERRIDE_TIMEOUT,
            refuel_rate: REFUEL_RATE,
            credits_per_fuel_unit: CREDITS_PER_FUEL_UNIT,
        }
    }
}

impl LevelConfig {
    /// Create a level from a preset (applies preset terrain)
    pub fn from_preset(preset: LevelPreset) -> Self {
        let mut level = Self::default();
        level.name = preset.as_str().to_string();
        level.terrain.noise = preset.noise();
        if let Some((start_x, altitude, pad)) = preset.scenario() {
            level.start.x = start_x;
            level.start.altitude = altitude;
            level.terrain.targets.explicit = vec![pad];
        }
        level
    }

    /// Use a different lander variant with its stock parameters
    pub fn with_lander(mut self, kind: LanderKind) -> Self {
        self.lander = kind.spec();
        self
    }

    /// Parse and validate a level from JSON
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let level: Self = serde_json::from_str(json)?;
        level.validate()?;
        log::info!("Loaded level '{}'", level.name);
        Ok(level)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn physics_dt(&self) -> f32 {
        1.0 / self.physics_hz
    }

    pub fn bot_dt(&self) -> f32 {
        1.0 / self.bot_hz
    }

    /// Starting fuel after applying the tank limit
    pub fn start_fuel(&self) -> f32 {
        self.start
            .fuel
            .unwrap_or(self.lander.max_fuel)
            .clamp(0.0, self.lander.max_fuel)
    }

    /// Reject parameters the simulation cannot run with.
    ///
    /// Target placeability is checked by the terrain generator, which is the
    /// only place that knows how many pads actually fit.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let world = &self.terrain.world;
        for (field, value) in [
            ("world.x_min", world.x_min),
            ("world.x_max", world.x_max),
            ("world.y_min", world.y_min),
            ("world.y_max", world.y_max),
        ] {
            finite(field, value)?;
        }
        if world.x_min >= world.x_max {
            return Err(ConfigError::EmptyWorld {
                axis: "x",
                min: world.x_min,
                max: world.x_max,
            });
        }
        if world.y_min >= world.y_max {
            return Err(ConfigError::EmptyWorld {
                axis: "y",
                min: world.y_min,
                max: world.y_max,
            });
        }

        let noise = &self.terrain.noise;
        if noise.octaves == 0 || noise.octaves > MAX_OCTAVES {
            return Err(ConfigError::Octaves {
                value: noise.octaves,
                max: MAX_OCTAVES,
            });
        }
        positive("noise.frequency", noise.frequency)?;
        finite("noise.amplitude", noise.amplitude)?;
        finite("noise.persistence", noise.persistence)?;
        positive("noise.lacunarity", noise.lacunarity)?;
        finite("noise.base_height", noise.base_height)?;
        finite("noise.slope", noise.slope)?;
        positive("terrain.resolution", self.terrain.resolution)?;

        let targets = &self.terrain.targets;
        if targets.explicit.is_empty() {
            positive("targets.spacing", targets.spacing)?;
            positive("targets.width", targets.width)?;
            finite("targets.jitter", targets.jitter)?;
            // Pads are flattened one control point beyond each edge and blended one more
            let flatten_margin = 4.0 * self.terrain.resolution;
            if targets.jitter < 0.0
                || 2.0 * targets.jitter + targets.width + flatten_margin >= targets.spacing
            {
                return Err(ConfigError::TargetsOverlap {
                    spacing: targets.spacing,
                    width: targets.width,
                    jitter: targets.jitter,
                });
            }
        } else {
            for spec in &targets.explicit {
                finite("target.center_x", spec.center_x)?;
                positive("target.width", spec.width)?;
                finite("target.elevation", spec.elevation)?;
            }
            let mut specs = targets.explicit.clone();
            specs.sort_by(|a, b| a.center_x.total_cmp(&b.center_x));
            // Same clearance as generated pads so one pad's skirt never re-levels another
            let min_gap = 4.0 * self.terrain.resolution;
            if let Some(pair) = specs.windows(2).find(|p| p[1].x_start() - p[0].x_end() < min_gap) {
                return Err(ConfigError::ExplicitTargetsOverlap { x: pair[1].center_x });
            }
        }
        finite("targets.base_credit", targets.base_credit)?;
        finite("targets.credit_per_unit", targets.credit_per_unit)?;

        self.lander.validate()?;

        let start = &self.start;
        finite("start.x", start.x)?;
        finite("start.altitude", start.altitude)?;
        finite("start.velocity", start.velocity.x + start.velocity.y)?;
        finite("start.angle", start.angle)?;
        finite("start.credits", start.credits)?;
        if start.x < world.x_min || start.x > world.x_max {
            return Err(ConfigError::StartOutsideWorld {
                x: start.x,
                min: world.x_min,
                max: world.x_max,
            });
        }

        finite("gravity", self.gravity)?;
        positive("physics_hz", self.physics_hz)?;
        positive("bot_hz", self.bot_hz)?;
        if self.bot_hz > self.physics_hz {
            return Err(ConfigError::BotRateTooHigh {
                bot_hz: self.bot_hz,
                physics_hz: self.physics_hz,
            });
        }
        finite("override_timeout", self.override_timeout)?;
        positive("refuel_rate", self.refuel_rate)?;
        positive("credits_per_fuel_unit", self.credits_per_fuel_unit)?;
        Ok(())
    }
}

fn finite(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NonFinite { field })
    }
}

fn positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    finite(field, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { field, value })
    }
}
