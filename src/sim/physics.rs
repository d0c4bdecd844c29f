//! Rigid-body engine adapter
//!
//! The only code that talks to rapier. It owns the lander body and the terrain
//! collider, steps the engine, and answers geometric queries. It never writes
//! [`LanderState`](super::state::LanderState); callers copy pose and velocity
//! out after each step.

use glam::Vec2;
use rapier2d::parry::query::Ray;
use rapier2d::prelude::*;

use crate::config::{HullShape, LanderSpec, LevelConfig};
use crate::error::SyncViolation;

use super::state::{Pose, Velocity};
use super::terrain::Terrain;
use super::variant::{ControlInput, ThrusterControl, thrusters_for};

/// Pose tolerance when checking the body against a resting pose
const REST_TOLERANCE: f32 = 1e-3;

const TERRAIN_FRICTION: f32 = 0.9;
const LANDER_FRICTION: f32 = 0.8;

/// Engine-reported touch between lander and terrain
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerrainContact {
    /// Contact normal, oriented away from the ground
    pub normal: Vec2,
}

/// Outcome of one sub-step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    pub contact: Option<TerrainContact>,
    /// Velocity going into the step, before contact impulses
    pub impact_velocity: Vec2,
}

/// Engine output after applying controls
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AppliedThrust {
    pub thrust_level: f32,
    pub fuel_used: f32,
}

/// Nearest terrain surface point to a query position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfacePoint {
    pub point: Vec2,
    pub distance: f32,
    /// Unit vector from the surface toward the query position
    pub normal: Vec2,
}

#[derive(Debug, Clone, Copy)]
struct LanderHandles {
    body: RigidBodyHandle,
    collider: ColliderHandle,
}

/// Bridge between the simulation and the rigid-body engine
pub struct PhysicsEngineAdapter {
    gravity: Vector<Real>,
    integration_params: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    terrain: ColliderHandle,
    lander: LanderHandles,
    spec: LanderSpec,
    thrusters: Box<dyn ThrusterControl>,
}

impl PhysicsEngineAdapter {
    /// Build the world: terrain as a fixed polyline, lander as a dynamic body
    pub fn new(level: &LevelConfig, terrain: &Terrain, spawn: Pose, velocity: Vec2, fuel: f32) -> Self {
        let mut integration_params = IntegrationParameters::default();
        integration_params.dt = level.physics_dt();

        let mut bodies = RigidBodySet::new();
        let mut colliders = ColliderSet::new();

        let vertices: Vec<Point<Real>> = terrain
            .control_points()
            .iter()
            .map(|p| point![p.x, p.y])
            .collect();
        let ground = ColliderBuilder::polyline(vertices, None)
            .friction(TERRAIN_FRICTION)
            .restitution(0.0)
            .build();
        let terrain_handle = colliders.insert(ground);

        let spec = level.lander;
        let lander = spawn_lander(&mut bodies, &mut colliders, &spec, spawn, velocity, fuel);

        log::debug!(
            "Physics world ready: {} terrain vertices, lander {:?}",
            terrain.control_points().len(),
            spec.kind
        );

        Self {
            gravity: vector![0.0, level.gravity],
            integration_params,
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies,
            colliders,
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            terrain: terrain_handle,
            lander,
            thrusters: thrusters_for(&spec),
            spec,
        }
    }

    pub fn spec(&self) -> &LanderSpec {
        &self.spec
    }

    /// Destroy the lander body and create a fresh one
    pub fn reset_lander(&mut self, spawn: Pose, velocity: Vec2, fuel: f32) {
        self.bodies.remove(
            self.lander.body,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
        self.lander = spawn_lander(
            &mut self.bodies,
            &mut self.colliders,
            &self.spec,
            spawn,
            velocity,
            fuel,
        );
        self.thrusters = thrusters_for(&self.spec);
    }

    /// Advance the engine by one fixed sub-step
    pub fn step(&mut self, dt: f32) -> StepReport {
        let impact_velocity = self.get_velocity().linear;
        self.integration_params.dt = dt;
        self.pipeline.step(
            &self.gravity,
            &self.integration_params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            None,
            &(),
            &(),
        );
        StepReport {
            contact: self.terrain_contact(),
            impact_velocity,
        }
    }

    /// Convert a thrust/attitude command into forces via the lander variant.
    ///
    /// Also refreshes the body mass for the current fuel load.
    pub fn apply_controls(&mut self, thrust: f32, angle_target: f32, fuel: f32, dt: f32) -> AppliedThrust {
        let input = ControlInput {
            target_thrust: thrust,
            target_angle: angle_target,
            fuel_available: fuel > 0.0,
            dt,
        };
        let body = &mut self.bodies[self.lander.body];
        body.set_additional_mass(fuel.max(0.0) * self.spec.fuel_density, true);
        let thrust_level = self.thrusters.apply_controls(body, &input);
        AppliedThrust {
            thrust_level,
            fuel_used: (thrust_level * self.spec.burn_rate * dt).min(fuel.max(0.0)),
        }
    }

    /// Zero engine output and forces without touching the pose
    pub fn cut_engines(&mut self) {
        self.thrusters.cut();
        let body = &mut self.bodies[self.lander.body];
        body.reset_forces(true);
        body.reset_torques(true);
    }

    pub fn get_pose(&self) -> Pose {
        let body = &self.bodies[self.lander.body];
        let t = body.translation();
        Pose::new(Vec2::new(t.x, t.y), body.rotation().angle())
    }

    pub fn get_velocity(&self) -> Velocity {
        let body = &self.bodies[self.lander.body];
        let v = body.linvel();
        Velocity {
            linear: Vec2::new(v.x, v.y),
            angular: body.angvel(),
        }
    }

    pub fn mass(&self) -> f32 {
        self.bodies[self.lander.body].mass()
    }

    /// Force the body to an exact pose, optionally zeroing all motion.
    ///
    /// The only sanctioned way to resync the engine after a discrete state
    /// transition.
    pub fn teleport_lander(&mut self, position: Vec2, angle: f32, clear_velocity: bool) {
        let body = &mut self.bodies[self.lander.body];
        body.set_position(Isometry::new(vector![position.x, position.y], angle), true);
        if clear_velocity {
            body.set_linvel(vector![0.0, 0.0], true);
            body.set_angvel(0.0, true);
            body.reset_forces(true);
            body.reset_torques(true);
            self.thrusters.cut();
        }
    }

    /// Check the body sits motionless at `expected`
    pub fn verify_at_rest(&self, expected: &Pose) -> Result<(), SyncViolation> {
        let pose = self.get_pose();
        let velocity = self.get_velocity();
        let displaced = pose.position.distance(expected.position) > REST_TOLERANCE
            || crate::normalize_angle(pose.angle - expected.angle).abs() > REST_TOLERANCE;
        let moving = velocity.linear != Vec2::ZERO || velocity.angular != 0.0;
        if displaced || moving {
            return Err(SyncViolation {
                expected_x: expected.position.x,
                expected_y: expected.position.y,
                expected_angle: expected.angle,
                actual_x: pose.position.x,
                actual_y: pose.position.y,
                actual_angle: pose.angle,
                actual_speed: velocity.speed(),
            });
        }
        Ok(())
    }

    /// Nearest terrain point to `position`, if within `search_radius`
    pub fn closest_point(&self, position: Vec2, search_radius: f32) -> Option<SurfacePoint> {
        let collider = &self.colliders[self.terrain];
        let projection =
            collider
                .shape()
                .project_point(collider.position(), &point![position.x, position.y], true);
        let point = Vec2::new(projection.point.x, projection.point.y);
        let distance = point.distance(position);
        let normal = (position - point).try_normalize().unwrap_or(Vec2::Y);
        (distance <= search_radius).then_some(SurfacePoint {
            point,
            distance,
            normal,
        })
    }

    /// Distance along a world-space ray to the first terrain hit
    pub fn raycast(&self, origin: Vec2, angle: f32, max_range: f32) -> Option<f32> {
        let collider = &self.colliders[self.terrain];
        let ray = Ray::new(point![origin.x, origin.y], vector![angle.cos(), angle.sin()]);
        collider
            .shape()
            .cast_ray(collider.position(), &ray, max_range, true)
    }

    fn terrain_contact(&self) -> Option<TerrainContact> {
        let pair = self
            .narrow_phase
            .contact_pair(self.lander.collider, self.terrain)?;
        if !pair.has_any_active_contact {
            return None;
        }
        let normal = pair
            .manifolds
            .iter()
            .find(|m| !m.points.is_empty())
            .map(|m| Vec2::new(m.data.normal.x, m.data.normal.y))
            .unwrap_or(Vec2::Y);
        Some(TerrainContact {
            normal: if normal.y < 0.0 { -normal } else { normal },
        })
    }
}

impl std::fmt::Debug for PhysicsEngineAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsEngineAdapter")
            .field("pose", &self.get_pose())
            .finish_non_exhaustive()
    }
}

fn spawn_lander(
    bodies: &mut RigidBodySet,
    colliders: &mut ColliderSet,
    spec: &LanderSpec,
    spawn: Pose,
    velocity: Vec2,
    fuel: f32,
) -> LanderHandles {
    let body = RigidBodyBuilder::dynamic()
        .translation(vector![spawn.position.x, spawn.position.y])
        .rotation(spawn.angle)
        .linvel(vector![velocity.x, velocity.y])
        .additional_mass(fuel.max(0.0) * spec.fuel_density)
        .can_sleep(false)
        .ccd_enabled(true)
        .build();
    let body = bodies.insert(body);

    let (hw, hh) = (spec.half_width(), spec.half_height());
    let hull = match spec.hull {
        // Apex up, legs at the base corners
        HullShape::Triangle => {
            ColliderBuilder::triangle(point![0.0, hh], point![-hw, -hh], point![hw, -hh])
        }
        HullShape::Box => ColliderBuilder::cuboid(hw, hh),
    };
    let collider = hull
        .mass(spec.dry_mass)
        .friction(LANDER_FRICTION)
        .restitution(0.0)
        .build();
    let collider = colliders.insert_with_parent(collider, body, bodies);

    LanderHandles { body, collider }
}
