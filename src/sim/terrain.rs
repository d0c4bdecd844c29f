//! Procedural terrain and landing targets
//!
//! The height field is a polyline of uniformly spaced control points sampled
//! from seeded fractal noise. Landing targets are flat pads carved into it.
//! Generation is a pure function of (seed, params, start x).

use glam::Vec2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{TargetSpec, TerrainParams, WorldBounds};
use crate::error::ConfigError;

use super::noise::FractalNoise;
use super::state::RngState;

/// RNG stream used for target jitter (noise uses its own seeding)
const TARGET_STREAM: u64 = 1;

/// A landing pad
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: usize,
    pub x_start: f32,
    pub x_end: f32,
    /// Surface height of the pad
    pub height: f32,
    pub credit_value: f32,
    pub collected: bool,
}

impl Target {
    pub fn center(&self) -> Vec2 {
        Vec2::new((self.x_start + self.x_end) * 0.5, self.height)
    }

    pub fn width(&self) -> f32 {
        self.x_end - self.x_start
    }

    /// Both feet inside the pad's x-range widened by `tolerance` on each side
    pub fn accepts_footprint(&self, left_x: f32, right_x: f32, tolerance: f32) -> bool {
        let lo = self.x_start - tolerance;
        let hi = self.x_end + tolerance;
        (lo..=hi).contains(&left_x) && (lo..=hi).contains(&right_x)
    }
}

/// Generated height field plus its targets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Terrain {
    seed: u64,
    world: WorldBounds,
    /// Horizontal distance between control points
    step: f32,
    points: Vec<Vec2>,
    targets: Vec<Target>,
    start_x: f32,
}

impl Terrain {
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn world(&self) -> &WorldBounds {
        &self.world
    }

    pub fn start_x(&self) -> f32 {
        self.start_x
    }

    /// Control points, ordered by x
    pub fn control_points(&self) -> &[Vec2] {
        &self.points
    }

    /// Targets, ordered by x and non-overlapping
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn target(&self, id: usize) -> Option<&Target> {
        self.targets.get(id)
    }

    /// Mark a target collected, returning whether it was fresh
    pub(crate) fn collect(&mut self, id: usize) -> bool {
        match self.targets.get_mut(id) {
            Some(target) if !target.collected => {
                target.collected = true;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn reset_targets(&mut self) {
        for target in &mut self.targets {
            target.collected = false;
        }
    }

    /// Segment index and interpolation parameter for `x` (clamped to the world)
    fn locate(&self, x: f32) -> (usize, f32) {
        let x = if x.is_finite() {
            self.world.clamp_x(x)
        } else {
            self.world.x_min
        };
        let last = self.points.len() - 2;
        let i = (((x - self.world.x_min) / self.step).floor() as usize).min(last);
        let t = ((x - self.points[i].x) / self.step).clamp(0.0, 1.0);
        (i, t)
    }

    /// Height at any x, linearly interpolated between control points
    pub fn terrain_height(&self, x: f32) -> f32 {
        let (i, t) = self.locate(x);
        let a = self.points[i].y;
        let b = self.points[i + 1].y;
        a + (b - a) * t
    }

    /// dy/dx of the interpolated height at x
    pub fn terrain_slope(&self, x: f32) -> f32 {
        let (i, _) = self.locate(x);
        (self.points[i + 1].y - self.points[i].y) / self.step
    }

    /// Upward unit normal of the surface at x
    pub fn normal(&self, x: f32) -> Vec2 {
        Vec2::new(-self.terrain_slope(x), 1.0).normalize()
    }

    /// Highest surface point over [x0, x1]
    pub fn highest_between(&self, x0: f32, x1: f32) -> f32 {
        let (lo, hi) = if x0 <= x1 { (x0, x1) } else { (x1, x0) };
        let edges = self.terrain_height(lo).max(self.terrain_height(hi));
        self.points
            .iter()
            .filter(|p| p.x > lo && p.x < hi)
            .map(|p| p.y)
            .fold(edges, f32::max)
    }

    /// First target accepting a footprint with the given feet
    pub fn target_under(&self, left_x: f32, right_x: f32, tolerance: f32) -> Option<usize> {
        self.targets
            .iter()
            .position(|t| t.accepts_footprint(left_x, right_x, tolerance))
    }
}

/// Builds [`Terrain`] from parameters
#[derive(Debug, Clone)]
pub struct TerrainGenerator {
    params: TerrainParams,
}

impl TerrainGenerator {
    pub fn new(params: TerrainParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &TerrainParams {
        &self.params
    }

    /// Generate the terrain for `seed` with pad credits measured from `start_x`.
    ///
    /// Identical inputs always produce identical output.
    pub fn generate(&self, seed: u64, start_x: f32) -> Result<Terrain, ConfigError> {
        let world = self.params.world;
        if world.x_min >= world.x_max {
            return Err(ConfigError::EmptyWorld {
                axis: "x",
                min: world.x_min,
                max: world.x_max,
            });
        }
        if !(self.params.resolution > 0.0) {
            return Err(ConfigError::NonPositive {
                field: "terrain.resolution",
                value: self.params.resolution,
            });
        }

        let segments = (world.width() / self.params.resolution).ceil().max(1.0) as usize;
        let step = world.width() / segments as f32;
        let noise = FractalNoise::new(seed, &self.params.noise);
        let base = self.params.noise.base_height;
        let amplitude = self.params.noise.amplitude;
        let slope = self.params.noise.slope;

        let mut points: Vec<Vec2> = (0..=segments)
            .map(|i| {
                let x = if i == segments {
                    world.x_max
                } else {
                    world.x_min + i as f32 * step
                };
                Vec2::new(x, world.clamp_y(base + slope * x + amplitude * noise.sample(x)))
            })
            .collect();

        let specs = self.place_targets(seed, start_x, step)?;
        let mut targets = Vec::with_capacity(specs.len());
        for (id, (spec, credit_value)) in specs.into_iter().enumerate() {
            let (x_start, x_end) = (spec.x_start(), spec.x_end());
            let height = flatten_pad(&mut points, step, &spec, &world);
            targets.push(Target {
                id,
                x_start,
                x_end,
                height,
                credit_value,
                collected: false,
            });
        }

        log::info!(
            "Generated terrain seed={} points={} targets={}",
            seed,
            points.len(),
            targets.len()
        );

        Ok(Terrain {
            seed,
            world,
            step,
            points,
            targets,
            start_x,
        })
    }

    /// Pad specs with their credit values, sorted by x
    fn place_targets(
        &self,
        seed: u64,
        start_x: f32,
        step: f32,
    ) -> Result<Vec<(TargetSpec, f32)>, ConfigError> {
        let policy = &self.params.targets;
        let world = &self.params.world;

        if !policy.explicit.is_empty() {
            let mut specs: Vec<TargetSpec> = policy
                .explicit
                .iter()
                .copied()
                .filter(|s| s.x_start() >= world.x_min && s.x_end() <= world.x_max)
                .collect();
            specs.sort_by(|a, b| a.center_x.total_cmp(&b.center_x));
            // Each pad levels two control steps past its edges
            for pair in specs.windows(2) {
                if pair[1].x_start() - pair[0].x_end() < 4.0 * step {
                    return Err(ConfigError::ExplicitTargetsOverlap { x: pair[1].center_x });
                }
            }
            if specs.is_empty() {
                return Err(ConfigError::NoPlaceableTargets);
            }
            return Ok(specs
                .into_iter()
                .map(|s| (s, s.credit_value.unwrap_or(0.0)))
                .collect());
        }

        if !(policy.spacing > 0.0 && policy.width > 0.0) {
            return Err(ConfigError::NoPlaceableTargets);
        }

        // Keep every jittered pad plus its flattened skirt inside the margins
        let reach = policy.width / 2.0 + policy.jitter.max(0.0) + 2.0 * step;
        let lo = world.x_min + policy.edge_margin + reach;
        let hi = world.x_max - policy.edge_margin - reach;
        if lo > hi {
            return Err(ConfigError::NoPlaceableTargets);
        }
        let k_min = ((lo - start_x) / policy.spacing).ceil() as i64;
        let k_max = ((hi - start_x) / policy.spacing).floor() as i64;

        let mut rng = RngState::new(seed).with_stream(TARGET_STREAM).to_rng();
        let mut specs = Vec::new();
        for k in k_min..=k_max {
            let jitter = if policy.jitter > 0.0 {
                rng.random_range(-policy.jitter..=policy.jitter)
            } else {
                0.0
            };
            if k == 0 && !policy.home_pad {
                continue;
            }
            let center_x = start_x + k as f32 * policy.spacing + if k == 0 { 0.0 } else { jitter };
            let credit =
                (policy.base_credit + policy.credit_per_unit * (center_x - start_x).abs()).max(0.0);
            specs.push((
                TargetSpec::new(center_x, policy.width).with_credit(credit),
                credit,
            ));
        }

        if specs.is_empty() {
            return Err(ConfigError::NoPlaceableTargets);
        }
        Ok(specs)
    }
}

/// Level the ground under a pad and return the pad height.
///
/// Points within one step of the pad edges are set flat so the whole x-range
/// interpolates to the pad height; the next point out is blended halfway. A
/// raised pad sits `elevation` above the mean ground as a steep-sided mesa.
fn flatten_pad(points: &mut [Vec2], step: f32, spec: &TargetSpec, world: &WorldBounds) -> f32 {
    let (x_start, x_end) = (spec.x_start(), spec.x_end());
    let inside: Vec<f32> = points
        .iter()
        .filter(|p| p.x >= x_start && p.x <= x_end)
        .map(|p| p.y)
        .collect();
    let height = if inside.is_empty() {
        let center = (x_start + x_end) * 0.5;
        points
            .iter()
            .min_by(|a, b| (a.x - center).abs().total_cmp(&(b.x - center).abs()))
            .map_or(0.0, |p| p.y)
    } else {
        inside.iter().sum::<f32>() / inside.len() as f32
    };
    let height = world.clamp_y(height + spec.elevation);

    let flat_lo = x_start - step;
    let flat_hi = x_end + step;
    for point in points.iter_mut() {
        if point.x >= flat_lo && point.x <= flat_hi {
            point.y = height;
        } else if point.x >= flat_lo - step && point.x <= flat_hi + step {
            point.y = (point.y + height) * 0.5;
        }
    }
    height
}
