//! Contact resolution state machine
//!
//! Flying -> Landed | Crashed, and back to Flying only through takeoff or a
//! reset. Every entry into Landed or Crashed teleports the physics body to its
//! resting pose with velocity cleared, then checks the engine agrees. The
//! resolver is the single writer of lifecycle, fuel and credits.

use glam::Vec2;

use crate::config::{LanderSpec, LevelConfig};
use crate::consts::MAX_STABLE_SPEED;
use crate::normalize_angle;

use super::physics::{PhysicsEngineAdapter, StepReport};
use super::state::{FailureReason, LanderState, Lifecycle, Pose, SimEvent, Velocity};
use super::terrain::Terrain;

/// Slack on the refuel clock so f32 accumulation of whole seconds still ticks
const REFUEL_CLOCK_EPSILON: f32 = 1e-4;

/// Below this speed a disarmed lander in contact counts as sitting still
const SETTLE_SPEED: f32 = 0.25;
/// Sub-steps a takeoff may sit still in contact before it is abandoned
const SETTLE_STEPS: u32 = 60;

/// World positions of the two leg feet
pub fn feet(pose: &Pose, spec: &LanderSpec) -> (Vec2, Vec2) {
    let (sin, cos) = pose.angle.sin_cos();
    let rotate = |v: Vec2| Vec2::new(v.x * cos - v.y * sin, v.x * sin + v.y * cos);
    let (hw, hh) = (spec.half_width(), spec.half_height());
    (
        pose.position + rotate(Vec2::new(-hw, -hh)),
        pose.position + rotate(Vec2::new(hw, -hh)),
    )
}

/// Touchdown is legal below the safe speed and tilt
pub fn is_legal_touchdown(speed: f32, angle: f32, spec: &LanderSpec) -> bool {
    speed < spec.safe_landing_speed && normalize_angle(angle).abs() < spec.safe_landing_angle
}

/// Non-finite or runaway integrator output
pub fn is_unstable(pose: &Pose, velocity: &Velocity) -> bool {
    !(pose.position.is_finite()
        && pose.angle.is_finite()
        && velocity.linear.is_finite()
        && velocity.angular.is_finite())
        || velocity.speed() > MAX_STABLE_SPEED
}

/// Decides the outcome of ground contact and keeps the engine in sync
#[derive(Debug, Clone)]
pub struct ContactResolver {
    /// False right after takeoff until the lander leaves the ground or settles
    armed: bool,
    /// Consecutive disarmed sub-steps spent still in contact
    settled_steps: u32,
    /// The next landing returns to the pad a takeoff never left
    resettling: bool,
    /// Seconds of refuelling accumulated toward the next unit
    refuel_clock: f32,
    refuel_rate: f32,
    credits_per_unit: f32,
}

impl ContactResolver {
    pub fn new(level: &LevelConfig) -> Self {
        Self {
            armed: true,
            settled_steps: 0,
            resettling: false,
            refuel_clock: 0.0,
            refuel_rate: level.refuel_rate,
            credits_per_unit: level.credits_per_fuel_unit,
        }
    }

    pub fn reset(&mut self) {
        self.armed = true;
        self.settled_steps = 0;
        self.resettling = false;
        self.refuel_clock = 0.0;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Evaluate one sub-step's contact while Flying.
    ///
    /// After a takeoff, contact is ignored until the lander leaves the ground.
    /// A takeoff too weak to lift off re-arms once the lander has sat still in
    /// contact for [`SETTLE_STEPS`] and then lands back on its pad.
    pub fn resolve_step(
        &mut self,
        report: &StepReport,
        lander: &mut LanderState,
        terrain: &mut Terrain,
        physics: &mut PhysicsEngineAdapter,
    ) -> Option<SimEvent> {
        if lander.lifecycle != Lifecycle::Flying {
            return None;
        }
        let Some(contact) = report.contact else {
            self.armed = true;
            self.settled_steps = 0;
            self.resettling = false;
            return None;
        };
        if !self.armed {
            if report.impact_velocity.length() < SETTLE_SPEED {
                self.settled_steps += 1;
            } else {
                self.settled_steps = 0;
            }
            if self.settled_steps < SETTLE_STEPS {
                return None;
            }
            log::info!("Takeoff never left the ground; settling back");
            self.armed = true;
            self.settled_steps = 0;
            self.resettling = true;
        }
        // Separating contacts are not touchdowns
        if report.impact_velocity.dot(contact.normal) > 0.0 {
            return None;
        }

        let spec = *physics.spec();
        let pose = physics.get_pose();
        let speed = report.impact_velocity.length();
        let (left, right) = feet(&pose, &spec);
        let target = terrain.target_under(left.x, right.x, spec.width);

        match target {
            Some(id) if is_legal_touchdown(speed, pose.angle, &spec) => {
                Some(self.land(id, &pose, lander, terrain, physics))
            }
            _ => {
                log::info!(
                    "Touchdown rejected: speed={:.2} angle={:.1}deg target={:?}",
                    speed,
                    pose.angle.to_degrees(),
                    target
                );
                Some(self.crash(FailureReason::Crash, pose, speed, lander, physics))
            }
        }
    }

    fn land(
        &mut self,
        id: usize,
        pose: &Pose,
        lander: &mut LanderState,
        terrain: &mut Terrain,
        physics: &mut PhysicsEngineAdapter,
    ) -> SimEvent {
        let spec = *physics.spec();
        let x = pose.position.x;
        let ground = terrain.highest_between(x - spec.half_width(), x + spec.half_width());
        let rest = Pose::new(Vec2::new(x, ground + spec.half_height()), 0.0);

        let fresh = terrain.collect(id);
        let awarded = match terrain.target(id) {
            Some(target) if fresh => target.credit_value,
            _ => 0.0,
        };

        lander.credits += awarded;
        lander.lifecycle = Lifecycle::Landed;
        lander.landed_target = Some(id);
        if !self.resettling {
            lander.landing_count += 1;
        }
        self.resettling = false;
        self.refuel_clock = 0.0;
        settle(lander, physics, rest);

        log::info!("Landed on target {} (awarded {:.0})", id, awarded);
        SimEvent::Landed {
            target: id,
            awarded,
        }
    }

    /// Enter Crashed and pin the body at `rest`
    pub fn crash(
        &mut self,
        reason: FailureReason,
        rest: Pose,
        impact_speed: f32,
        lander: &mut LanderState,
        physics: &mut PhysicsEngineAdapter,
    ) -> SimEvent {
        lander.lifecycle = Lifecycle::Crashed;
        lander.landed_target = None;
        lander.failure_reason = Some(reason);
        lander.crash_count += 1;
        self.resettling = false;
        self.refuel_clock = 0.0;
        settle(lander, physics, rest);

        log::info!("Crashed ({}) at impact speed {:.2}", reason.as_str(), impact_speed);
        SimEvent::Crashed {
            reason,
            impact_speed,
        }
    }

    /// Convert credits to fuel while Landed.
    ///
    /// Whole units transfer once per `1 / refuel_rate` seconds while credits
    /// cover the cost; the last unit may be partial to top the tank off.
    pub fn refuel(&mut self, dt: f32, requested: bool, lander: &mut LanderState) -> Option<SimEvent> {
        if !requested || lander.lifecycle != Lifecycle::Landed {
            self.refuel_clock = 0.0;
            return None;
        }

        self.refuel_clock += dt * self.refuel_rate;
        let mut units = 0.0;
        let mut cost = 0.0;
        while self.refuel_clock + REFUEL_CLOCK_EPSILON >= 1.0 {
            let amount = (lander.max_fuel - lander.fuel).min(1.0);
            let price = amount * self.credits_per_unit;
            if amount <= 0.0 || lander.credits < price {
                self.refuel_clock = 0.0;
                break;
            }
            lander.fuel += amount;
            lander.credits -= price;
            units += amount;
            cost += price;
            self.refuel_clock -= 1.0;
        }

        if units > 0.0 {
            log::debug!("Refuelled {:.1} units for {:.0} credits", units, cost);
            Some(SimEvent::Refueled { units, cost })
        } else {
            None
        }
    }

    /// Landed -> Flying. The body resumes from its resting pose.
    pub fn takeoff(&mut self, lander: &mut LanderState) -> Option<SimEvent> {
        if lander.lifecycle != Lifecycle::Landed {
            return None;
        }
        lander.lifecycle = Lifecycle::Flying;
        self.armed = false;
        self.settled_steps = 0;
        self.refuel_clock = 0.0;
        let target = lander.landed_target.take();
        log::info!("Takeoff from target {:?}", target);
        Some(SimEvent::TookOff { target })
    }
}

/// Teleport to `rest` with motion cleared and mirror it into the lander state.
///
/// A mismatch afterwards means the engine and the logical state diverged,
/// which no caller can recover from.
fn settle(lander: &mut LanderState, physics: &mut PhysicsEngineAdapter, rest: Pose) {
    physics.teleport_lander(rest.position, rest.angle, true);
    if let Err(violation) = physics.verify_at_rest(&rest) {
        log::error!("{violation}");
        panic!("{violation}");
    }
    lander.pose = rest;
    lander.velocity = Velocity::ZERO;
    lander.thrust_level = 0.0;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LanderKind, LevelPreset};
    use crate::sim::terrain::TerrainGenerator;
    use proptest::prelude::*;

    const DT: f32 = 1.0 / 120.0;

    struct Rig {
        lander: LanderState,
        terrain: Terrain,
        physics: PhysicsEngineAdapter,
        resolver: ContactResolver,
    }

    impl Rig {
        fn new(position: Vec2, angle: f32, velocity: Vec2) -> Self {
            let level = LevelConfig::from_preset(LevelPreset::Flat).with_lander(LanderKind::Classic);
            let terrain = TerrainGenerator::new(level.terrain.clone())
                .generate(0, level.start.x)
                .unwrap();
            let spawn = Pose::new(position, angle);
            let physics = PhysicsEngineAdapter::new(&level, &terrain, spawn, velocity, 100.0);
            let mut lander = LanderState::new(&level, spawn);
            lander.velocity.linear = velocity;
            Self {
                lander,
                terrain,
                physics,
                resolver: ContactResolver::new(&level),
            }
        }

        /// Step until the resolver reports something (or give up after 2s)
        fn run_until_event(&mut self) -> Option<SimEvent> {
            for _ in 0..240 {
                let report = self.physics.step(DT);
                self.lander.pose = self.physics.get_pose();
                self.lander.velocity = self.physics.get_velocity();
                let event = self.resolver.resolve_step(
                    &report,
                    &mut self.lander,
                    &mut self.terrain,
                    &mut self.physics,
                );
                if event.is_some() {
                    return event;
                }
            }
            None
        }

        fn assert_synced(&self) {
            assert_eq!(self.physics.get_velocity(), Velocity::ZERO);
            assert_eq!(self.physics.verify_at_rest(&self.lander.pose), Ok(()));
            assert_eq!(self.lander.velocity, Velocity::ZERO);
        }
    }

    #[test]
    fn test_soft_landing_on_home_pad() {
        let mut rig = Rig::new(Vec2::new(0.0, 4.3), 0.0, Vec2::new(0.0, -3.0));
        let credit = rig.terrain.targets().iter().find(|t| t.x_start < 0.0 && t.x_end > 0.0).unwrap().credit_value;
        let event = rig.run_until_event();
        match event {
            Some(SimEvent::Landed { awarded, .. }) => assert_eq!(awarded, credit),
            other => panic!("expected landing, got {other:?}"),
        }
        assert_eq!(rig.lander.lifecycle, Lifecycle::Landed);
        assert_eq!(rig.lander.credits, credit);
        assert_eq!(rig.lander.landing_count, 1);
        assert_eq!(rig.lander.pose.angle, 0.0);
        assert!((rig.lander.pose.position.y - 4.0).abs() < 1e-4);
        rig.assert_synced();
    }

    #[test]
    fn test_hard_impact_crashes() {
        let mut rig = Rig::new(Vec2::new(0.0, 4.3), 0.0, Vec2::new(0.0, -20.0));
        assert!(matches!(
            rig.run_until_event(),
            Some(SimEvent::Crashed { reason: FailureReason::Crash, .. })
        ));
        assert_eq!(rig.lander.lifecycle, Lifecycle::Crashed);
        assert_eq!(rig.lander.failure_reason, Some(FailureReason::Crash));
        assert_eq!(rig.lander.credits, 0.0);
        rig.assert_synced();
    }

    #[test]
    fn test_small_tilt_lands_large_tilt_crashes() {
        let small = 10f32.to_radians();
        let mut rig = Rig::new(Vec2::new(0.0, 4.95), small, Vec2::new(0.0, -2.0));
        assert!(matches!(rig.run_until_event(), Some(SimEvent::Landed { .. })));
        assert_eq!(rig.lander.pose.angle, 0.0);
        rig.assert_synced();

        let large = 30f32.to_radians();
        let mut rig = Rig::new(Vec2::new(0.0, 5.8), large, Vec2::new(0.0, -2.0));
        assert!(matches!(rig.run_until_event(), Some(SimEvent::Crashed { .. })));
        rig.assert_synced();
    }

    #[test]
    fn test_off_target_contact_crashes() {
        let mut rig = Rig::new(Vec2::new(300.0, 4.3), 0.0, Vec2::new(0.0, -2.0));
        assert!(matches!(rig.run_until_event(), Some(SimEvent::Crashed { .. })));
        rig.assert_synced();
    }

    #[test]
    fn test_pad_edge_within_footprint_tolerance_lands() {
        let edge = {
            let rig = Rig::new(Vec2::new(0.0, 50.0), 0.0, Vec2::ZERO);
            rig.terrain.targets().iter().find(|t| t.x_start < 0.0 && t.x_end > 0.0).unwrap().x_end
        };
        // Right foot overhangs the pad by 7 units
        let mut rig = Rig::new(Vec2::new(edge + 3.0, 4.3), 0.0, Vec2::new(0.0, -2.0));
        assert!(matches!(rig.run_until_event(), Some(SimEvent::Landed { .. })));
    }

    #[test]
    fn test_collected_target_not_reawarded() {
        let mut rig = Rig::new(Vec2::new(0.0, 4.3), 0.0, Vec2::new(0.0, -2.0));
        let id = rig.terrain.target_under(-4.0, 4.0, 8.0).unwrap();
        assert!(rig.terrain.collect(id));
        assert!(matches!(
            rig.run_until_event(),
            Some(SimEvent::Landed { awarded, .. }) if awarded == 0.0
        ));
        assert_eq!(rig.lander.credits, 0.0);
        assert_eq!(rig.lander.lifecycle, Lifecycle::Landed);
    }

    #[test]
    fn test_takeoff_keeps_pose_and_disarms() {
        let mut rig = Rig::new(Vec2::new(0.0, 4.3), 0.0, Vec2::new(0.0, -2.0));
        rig.run_until_event();
        let rest = rig.lander.pose;
        assert!(matches!(rig.resolver.takeoff(&mut rig.lander), Some(SimEvent::TookOff { .. })));
        assert_eq!(rig.lander.lifecycle, Lifecycle::Flying);
        assert_eq!(rig.physics.get_pose(), rest);
        assert!(!rig.resolver.is_armed());

        // Still sitting on the pad: contact persists but nothing resolves
        let report = rig.physics.step(DT);
        let event = rig.resolver.resolve_step(&report, &mut rig.lander, &mut rig.terrain, &mut rig.physics);
        assert!(event.is_none());
        assert_eq!(rig.lander.lifecycle, Lifecycle::Flying);
    }

    #[test]
    fn test_takeoff_without_lift_settles_back() {
        let mut rig = Rig::new(Vec2::new(0.0, 4.3), 0.0, Vec2::new(0.0, -2.0));
        let id = match rig.run_until_event() {
            Some(SimEvent::Landed { target, .. }) => target,
            other => panic!("expected landing, got {other:?}"),
        };
        let rest = rig.lander.pose;
        let credits = rig.lander.credits;
        rig.resolver.takeoff(&mut rig.lander);

        // No thrust: the lander just sits there until the resolver gives up on the takeoff
        match rig.run_until_event() {
            Some(SimEvent::Landed { target, awarded }) => {
                assert_eq!(target, id);
                assert_eq!(awarded, 0.0);
            }
            other => panic!("expected to settle back, got {other:?}"),
        }
        assert_eq!(rig.lander.lifecycle, Lifecycle::Landed);
        assert_eq!(rig.lander.landed_target, Some(id));
        assert_eq!(rig.lander.landing_count, 1);
        assert_eq!(rig.lander.credits, credits);
        assert!(rig.resolver.is_armed());
        assert!((rig.lander.pose.position - rest.position).length() < 0.05);
        rig.assert_synced();

        // Settled back means refuelling works again
        rig.lander.fuel = 50.0;
        assert!(rig.resolver.refuel(1.0, true, &mut rig.lander).is_some());
        assert_eq!(rig.lander.fuel, 51.0);
    }

    #[test]
    fn test_takeoff_requires_landed() {
        let mut rig = Rig::new(Vec2::new(0.0, 100.0), 0.0, Vec2::ZERO);
        assert!(rig.resolver.takeoff(&mut rig.lander).is_none());
    }

    #[test]
    fn test_legality_thresholds() {
        let spec = LanderSpec::default();
        assert!(is_legal_touchdown(14.9, 0.0, &spec));
        assert!(!is_legal_touchdown(15.0, 0.0, &spec));
        assert!(is_legal_touchdown(1.0, 19.9f32.to_radians(), &spec));
        assert!(!is_legal_touchdown(1.0, -20.1f32.to_radians(), &spec));
    }

    #[test]
    fn test_instability_detection() {
        let pose = Pose::new(Vec2::new(0.0, 10.0), 0.0);
        let mut velocity = Velocity::ZERO;
        assert!(!is_unstable(&pose, &velocity));
        velocity.linear.y = f32::NAN;
        assert!(is_unstable(&pose, &velocity));
        velocity.linear.y = -2.0 * MAX_STABLE_SPEED;
        assert!(is_unstable(&pose, &velocity));
    }

    fn landed_lander(fuel: f32, credits: f32) -> LanderState {
        let level = LevelConfig::default();
        let mut lander = LanderState::new(&level, Pose::default());
        lander.lifecycle = Lifecycle::Landed;
        lander.fuel = fuel;
        lander.credits = credits;
        lander
    }

    #[test]
    fn test_refuel_stops_at_full_tank() {
        let mut resolver = ContactResolver::new(&LevelConfig::default());
        let mut lander = landed_lander(97.5, 1000.0);
        for _ in 0..(120 * 10) {
            resolver.refuel(DT, true, &mut lander);
        }
        assert_eq!(lander.fuel, 100.0);
        assert!((lander.credits - 975.0).abs() < 1e-3);
    }

    #[test]
    fn test_refuel_only_when_landed_and_requested() {
        let mut resolver = ContactResolver::new(&LevelConfig::default());
        let mut lander = landed_lander(50.0, 100.0);
        lander.lifecycle = Lifecycle::Flying;
        for _ in 0..240 {
            assert!(resolver.refuel(DT, true, &mut lander).is_none());
        }
        lander.lifecycle = Lifecycle::Landed;
        for _ in 0..240 {
            assert!(resolver.refuel(DT, false, &mut lander).is_none());
        }
        assert_eq!(lander.fuel, 50.0);
        assert_eq!(lander.credits, 100.0);
    }

    proptest! {
        #[test]
        fn prop_refuel_converts_floor_n_over_ten(credits in 0u32..500) {
            let mut resolver = ContactResolver::new(&LevelConfig::default());
            let mut lander = landed_lander(40.0, credits as f32);
            let steps = 12 * credits;
            for _ in 0..steps {
                resolver.refuel(DT, true, &mut lander);
                prop_assert!(lander.credits >= 0.0);
                prop_assert!(lander.fuel <= lander.max_fuel);
            }
            let expected = (credits / 10) as f32;
            prop_assert_eq!(lander.fuel - 40.0, expected);
            prop_assert_eq!(lander.credits, (credits % 10) as f32);
        }
    }
}
