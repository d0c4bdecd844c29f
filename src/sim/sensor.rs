//! Sensor model
//!
//! Passive sensors are recomputed every tick whether anyone reads them or not.
//! Active sensors are queries a pilot pays for per call: raycasts, point height
//! lookups and terrain profiles. Bad query arguments are clamped, never fatal.
//!
//! Height lookups are memoized in a [`HeightCache`] owned by one
//! [`SensorModel`]; nothing is shared between simulation instances.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::f32::consts::FRAC_PI_2;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::config::{LanderKind, LanderSpec, LevelConfig};
use crate::consts::{MAX_PROFILE_SAMPLES, MAX_RAYCAST_RANGE};

use super::physics::PhysicsEngineAdapter;
use super::state::{LanderState, Lifecycle};
use super::terrain::Terrain;

/// A landing target seen by the radar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadarContact {
    pub target: usize,
    /// Target centre relative to the lander
    pub offset: Vec2,
    pub distance: f32,
    /// World-space direction to the target (radians, 0 = +x)
    pub bearing: f32,
    /// Within the inner (precision) radar range
    pub inner_lock: bool,
    pub credit_value: f32,
    pub collected: bool,
}

/// Closest terrain point within proximity range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProximityContact {
    pub point: Vec2,
    pub distance: f32,
    /// World-space direction from the lander to the point
    pub bearing: f32,
    pub normal: Vec2,
    pub slope: f32,
}

/// Static facts about the vehicle a pilot may plan with
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleInfo {
    pub kind: LanderKind,
    pub width: f32,
    pub height: f32,
    /// Force at full thrust
    pub max_thrust: f32,
    pub max_fuel: f32,
    pub gravity: f32,
    pub safe_landing_speed: f32,
    pub safe_landing_angle: f32,
    pub max_rotation_rate: f32,
}

/// Always-on readings for one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassiveSensors {
    pub time: f32,
    pub position: Vec2,
    /// Height of the lander centre above the terrain directly below
    pub altitude: f32,
    /// Terrain slope directly below
    pub slope: f32,
    pub velocity: Vec2,
    pub angle: f32,
    pub angular_velocity: f32,
    pub mass: f32,
    pub thrust_level: f32,
    pub fuel: f32,
    pub fuel_fraction: f32,
    pub credits: f32,
    pub lifecycle: Lifecycle,
    /// Targets within outer radar range, nearest first
    pub radar: Vec<RadarContact>,
    pub proximity: Option<ProximityContact>,
}

impl PassiveSensors {
    pub fn speed(&self) -> f32 {
        self.velocity.length()
    }

    /// Nearest radar contact not yet collected
    pub fn nearest_fresh_target(&self) -> Option<&RadarContact> {
        self.radar.iter().find(|c| !c.collected)
    }
}

/// Per-instance memo of terrain height lookups, cleared every tick
#[derive(Debug, Default)]
pub struct HeightCache {
    heights: RefCell<HashMap<u32, f32>>,
    hits: Cell<u64>,
}

impl HeightCache {
    pub fn height(&self, terrain: &Terrain, x: f32) -> f32 {
        let key = x.to_bits();
        if let Some(&h) = self.heights.borrow().get(&key) {
            self.hits.set(self.hits.get() + 1);
            return h;
        }
        let h = terrain.terrain_height(x);
        self.heights.borrow_mut().insert(key, h);
        h
    }

    pub fn clear(&mut self) {
        self.heights.get_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.heights.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits.get()
    }
}

/// Computes sensor snapshots for one simulation instance
#[derive(Debug)]
pub struct SensorModel {
    spec: LanderSpec,
    vehicle: VehicleInfo,
    radar_inner_range: f32,
    radar_outer_range: f32,
    proximity_range: f32,
    cache: HeightCache,
}

impl SensorModel {
    pub fn new(level: &LevelConfig) -> Self {
        let spec = &level.lander;
        Self {
            spec: *spec,
            vehicle: VehicleInfo {
                kind: spec.kind,
                width: spec.width,
                height: spec.height,
                max_thrust: spec.max_power,
                max_fuel: spec.max_fuel,
                gravity: level.gravity,
                safe_landing_speed: spec.safe_landing_speed,
                safe_landing_angle: spec.safe_landing_angle,
                max_rotation_rate: spec.max_rotation_rate,
            },
            radar_inner_range: spec.radar_inner_range,
            radar_outer_range: spec.radar_outer_range,
            proximity_range: spec.proximity_range,
            cache: HeightCache::default(),
        }
    }

    pub fn vehicle(&self) -> &VehicleInfo {
        &self.vehicle
    }

    pub fn cache(&self) -> &HeightCache {
        &self.cache
    }

    /// Drop memoized heights; called at the start of every tick
    pub fn begin_tick(&mut self) {
        self.cache.clear();
    }

    pub fn passive(
        &self,
        time: f32,
        lander: &LanderState,
        terrain: &Terrain,
        physics: &PhysicsEngineAdapter,
    ) -> PassiveSensors {
        let position = lander.position();
        let ground = self.cache.height(terrain, position.x);

        let mut radar: Vec<RadarContact> = terrain
            .targets()
            .iter()
            .filter_map(|target| {
                let offset = target.center() - position;
                let distance = offset.length();
                (distance <= self.radar_outer_range).then(|| RadarContact {
                    target: target.id,
                    offset,
                    distance,
                    bearing: offset.y.atan2(offset.x),
                    inner_lock: distance <= self.radar_inner_range,
                    credit_value: target.credit_value,
                    collected: target.collected,
                })
            })
            .collect();
        radar.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.target.cmp(&b.target)));

        let proximity = physics
            .closest_point(position, self.proximity_range)
            .map(|hit| {
                let towards = hit.point - position;
                ProximityContact {
                    point: hit.point,
                    distance: hit.distance,
                    bearing: towards.y.atan2(towards.x),
                    normal: terrain.normal(hit.point.x),
                    slope: terrain.terrain_slope(hit.point.x),
                }
            });

        PassiveSensors {
            time,
            position,
            altitude: position.y - ground,
            slope: terrain.terrain_slope(position.x),
            velocity: lander.velocity.linear,
            angle: lander.pose.angle,
            angular_velocity: lander.velocity.angular,
            mass: self.spec.mass_with_fuel(lander.fuel),
            thrust_level: lander.thrust_level,
            fuel: lander.fuel,
            fuel_fraction: lander.fuel_fraction(),
            credits: lander.credits,
            lifecycle: lander.lifecycle,
            radar,
            proximity,
        }
    }

    pub fn active<'a>(
        &'a self,
        lander: &LanderState,
        terrain: &'a Terrain,
        physics: &'a PhysicsEngineAdapter,
    ) -> ActiveSensors<'a> {
        ActiveSensors {
            origin: lander.position(),
            vehicle: &self.vehicle,
            terrain,
            physics,
            cache: &self.cache,
        }
    }
}

/// On-demand queries from the lander's current position
#[derive(Debug, Clone, Copy)]
pub struct ActiveSensors<'a> {
    origin: Vec2,
    vehicle: &'a VehicleInfo,
    terrain: &'a Terrain,
    physics: &'a PhysicsEngineAdapter,
    cache: &'a HeightCache,
}

impl<'a> ActiveSensors<'a> {
    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    pub fn vehicle(&self) -> &'a VehicleInfo {
        self.vehicle
    }

    /// Distance to the first terrain hit along a world-space direction, or the
    /// (clamped) range when nothing is hit
    pub fn raycast(&self, angle: f32, max_range: f32) -> f32 {
        let angle = if angle.is_finite() { angle } else { -FRAC_PI_2 };
        let range = if max_range.is_finite() {
            max_range.clamp(0.0, MAX_RAYCAST_RANGE)
        } else {
            MAX_RAYCAST_RANGE
        };
        if range == 0.0 {
            return 0.0;
        }
        self.physics
            .raycast(self.origin, angle, range)
            .map_or(range, |d| d.min(range))
    }

    pub fn terrain_height(&self, x: f32) -> f32 {
        self.cache.height(self.terrain, x)
    }

    /// Evenly spaced (x, height) samples from `x_start` to `x_end`
    pub fn terrain_profile(&self, x_start: f32, x_end: f32, samples: usize) -> TerrainProfile<'a> {
        let world = self.terrain.world();
        let fix = |x: f32| {
            if x.is_finite() {
                world.clamp_x(x)
            } else {
                world.clamp_x(self.origin.x)
            }
        };
        TerrainProfile {
            terrain: self.terrain,
            x_start: fix(x_start),
            x_end: fix(x_end),
            samples: samples.clamp(1, MAX_PROFILE_SAMPLES),
        }
    }
}

/// A restartable terrain profile; every iteration recomputes from the terrain
#[derive(Debug, Clone, Copy)]
pub struct TerrainProfile<'a> {
    terrain: &'a Terrain,
    x_start: f32,
    x_end: f32,
    samples: usize,
}

impl<'a> TerrainProfile<'a> {
    pub fn len(&self) -> usize {
        self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.samples == 0
    }

    pub fn iter(&self) -> ProfileIter<'a> {
        ProfileIter {
            profile: *self,
            index: 0,
        }
    }
}

impl<'a> IntoIterator for &TerrainProfile<'a> {
    type Item = Vec2;
    type IntoIter = ProfileIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a [`TerrainProfile`]
#[derive(Debug, Clone)]
pub struct ProfileIter<'a> {
    profile: TerrainProfile<'a>,
    index: usize,
}

impl Iterator for ProfileIter<'_> {
    type Item = Vec2;

    fn next(&mut self) -> Option<Vec2> {
        let p = &self.profile;
        if self.index >= p.samples {
            return None;
        }
        let x = if p.samples == 1 {
            p.x_start
        } else {
            p.x_start + (p.x_end - p.x_start) * self.index as f32 / (p.samples - 1) as f32
        };
        self.index += 1;
        Some(Vec2::new(x, p.terrain.terrain_height(x)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.profile.samples - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ProfileIter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LevelPreset;
    use crate::sim::state::Pose;
    use crate::sim::terrain::TerrainGenerator;

    struct World {
        level: LevelConfig,
        terrain: Terrain,
        physics: PhysicsEngineAdapter,
        lander: LanderState,
    }

    fn world(preset: LevelPreset, position: Vec2) -> World {
        let level = LevelConfig::from_preset(preset);
        let terrain = TerrainGenerator::new(level.terrain.clone())
            .generate(4, level.start.x)
            .unwrap();
        let spawn = Pose::new(position, 0.0);
        let physics = PhysicsEngineAdapter::new(&level, &terrain, spawn, Vec2::new(1.0, -2.0), 100.0);
        let mut lander = LanderState::new(&level, spawn);
        lander.velocity.linear = Vec2::new(1.0, -2.0);
        World {
            level,
            terrain,
            physics,
            lander,
        }
    }

    #[test]
    fn test_passive_altitude_and_state() {
        let w = world(LevelPreset::Hills, Vec2::new(123.0, 400.0));
        let sensors = SensorModel::new(&w.level);
        let passive = sensors.passive(2.5, &w.lander, &w.terrain, &w.physics);
        let ground = w.terrain.terrain_height(123.0);
        assert!((passive.altitude - (400.0 - ground)).abs() < 1e-4);
        assert_eq!(passive.slope, w.terrain.terrain_slope(123.0));
        assert_eq!(passive.velocity, Vec2::new(1.0, -2.0));
        assert_eq!(passive.fuel_fraction, 1.0);
        assert_eq!(passive.lifecycle, Lifecycle::Flying);
        assert_eq!(passive.time, 2.5);
    }

    #[test]
    fn test_radar_sorted_with_inner_lock() {
        let w = world(LevelPreset::Flat, Vec2::new(0.0, 100.0));
        let sensors = SensorModel::new(&w.level);
        let passive = sensors.passive(0.0, &w.lander, &w.terrain, &w.physics);
        assert!(!passive.radar.is_empty());
        assert!(passive.radar.windows(2).all(|p| p[0].distance <= p[1].distance));
        let home = &passive.radar[0];
        assert!((home.distance - 100.0).abs() < 1e-3);
        assert!(home.inner_lock);
        assert!(passive.radar.iter().all(|c| c.distance <= w.level.lander.radar_outer_range));
        assert!(passive.nearest_fresh_target().is_some());
    }

    #[test]
    fn test_proximity_within_range_only() {
        let w = world(LevelPreset::Flat, Vec2::new(0.0, 100.0));
        let sensors = SensorModel::new(&w.level);
        let near = sensors.passive(0.0, &w.lander, &w.terrain, &w.physics);
        let contact = near.proximity.unwrap();
        assert!((contact.distance - 100.0).abs() < 1e-3);
        assert!((contact.normal - Vec2::Y).length() < 1e-5);
        assert!((contact.bearing + FRAC_PI_2).abs() < 1e-4);

        let w = world(LevelPreset::Flat, Vec2::new(0.0, 800.0));
        let far = sensors.passive(0.0, &w.lander, &w.terrain, &w.physics);
        assert!(far.proximity.is_none());
    }

    #[test]
    fn test_raycast_hits_and_clamps() {
        let w = world(LevelPreset::Flat, Vec2::new(0.0, 100.0));
        let sensors = SensorModel::new(&w.level);
        let active = sensors.active(&w.lander, &w.terrain, &w.physics);
        assert!((active.raycast(-FRAC_PI_2, 1000.0) - 100.0).abs() < 1e-3);
        // Nothing above: the range comes back
        assert_eq!(active.raycast(FRAC_PI_2, 250.0), 250.0);
        assert_eq!(active.raycast(-FRAC_PI_2, -5.0), 0.0);
        assert_eq!(active.raycast(FRAC_PI_2, f32::INFINITY), MAX_RAYCAST_RANGE);
        assert!((active.raycast(f32::NAN, 1000.0) - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_profile_length_and_restart() {
        let w = world(LevelPreset::Hills, Vec2::new(0.0, 400.0));
        let sensors = SensorModel::new(&w.level);
        let active = sensors.active(&w.lander, &w.terrain, &w.physics);
        let profile = active.terrain_profile(-100.0, 100.0, 21);
        assert_eq!(profile.len(), 21);
        assert_eq!(profile.iter().len(), 21);
        let first: Vec<Vec2> = profile.iter().collect();
        let second: Vec<Vec2> = (&profile).into_iter().collect();
        assert_eq!(first, second);
        assert_eq!(first[0].x, -100.0);
        assert_eq!(first[20].x, 100.0);
        assert!((first[10].y - w.terrain.terrain_height(0.0)).abs() < 1e-4);
    }

    #[test]
    fn test_profile_arguments_clamped() {
        let w = world(LevelPreset::Hills, Vec2::new(0.0, 400.0));
        let sensors = SensorModel::new(&w.level);
        let active = sensors.active(&w.lander, &w.terrain, &w.physics);
        let world_bounds = *w.terrain.world();

        let single = active.terrain_profile(10.0, 20.0, 0);
        assert_eq!(single.iter().collect::<Vec<_>>().len(), 1);

        let huge = active.terrain_profile(-1e9, 1e9, usize::MAX);
        assert_eq!(huge.len(), MAX_PROFILE_SAMPLES);
        let pts: Vec<Vec2> = huge.iter().collect();
        assert_eq!(pts.first().unwrap().x, world_bounds.x_min);
        assert_eq!(pts.last().unwrap().x, world_bounds.x_max);

        let reversed: Vec<Vec2> = active.terrain_profile(50.0, -50.0, 3).iter().collect();
        assert_eq!(reversed[0].x, 50.0);
        assert_eq!(reversed[2].x, -50.0);
    }

    #[test]
    fn test_height_cache_is_per_instance() {
        let w = world(LevelPreset::Hills, Vec2::new(0.0, 400.0));
        let mut a = SensorModel::new(&w.level);
        let b = SensorModel::new(&w.level);
        {
            let active = a.active(&w.lander, &w.terrain, &w.physics);
            let h1 = active.terrain_height(42.0);
            let h2 = active.terrain_height(42.0);
            assert_eq!(h1, h2);
            assert_eq!(h1, w.terrain.terrain_height(42.0));
        }
        assert_eq!(a.cache().len(), 1);
        assert_eq!(a.cache().hits(), 1);
        assert!(b.cache().is_empty());
        a.begin_tick();
        assert!(a.cache().is_empty());
    }
}
