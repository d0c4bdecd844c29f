//! Fixed timestep simulation tick
//!
//! [`Simulation`] owns every piece of mutable state for one run: terrain,
//! lander, engine world, sensor cache, arbiter and clock. Nothing is shared
//! between instances, so independent runs can go on separate threads.
//!
//! Order within a tick:
//! 1. sensor cache cleared, human input sampled, clock advanced
//! 2. bot polled if an update is due (failures become a no-op)
//! 3. arbiter resolves the controls; takeoff and reset are handled
//! 4. for each physics sub-step: controls applied, engine stepped while
//!    Flying, pose copied back, contact resolved, refuel processed

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use glam::Vec2;

use super::clock::SimulationClock;
use super::contact::{ContactResolver, is_unstable};
use super::physics::PhysicsEngineAdapter;
use super::sensor::{PassiveSensors, SensorModel, VehicleInfo};
use super::state::{FailureReason, LanderState, Lifecycle, Pose, SimEvent};
use super::terrain::{Terrain, TerrainGenerator};
use crate::bot::{Bot, BotAction};
use crate::config::LevelConfig;
use crate::control::{ControlArbiter, ControlSource, ControlTuple, HumanController, InputSignals};
use crate::error::{BotError, ConfigError};

/// Input commands for a single tick
#[derive(Debug, Clone, Default)]
pub struct TickInput {
    /// Keyboard state, if a human is attached
    pub human: Option<InputSignals>,
    /// Lift off from the current pad regardless of the commanded thrust
    pub takeoff: bool,
    /// Restart the run from the spawn point
    pub reset: bool,
}

/// What happened during one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub physics_steps: u32,
    pub bot_updates: u32,
    pub source: ControlSource,
    pub controls: ControlTuple,
    pub events: Vec<SimEvent>,
}

/// One self-contained lander simulation
#[derive(Debug)]
pub struct Simulation {
    level: LevelConfig,
    seed: u64,
    spawn: Pose,
    terrain: Terrain,
    lander: LanderState,
    physics: PhysicsEngineAdapter,
    resolver: ContactResolver,
    sensors: SensorModel,
    arbiter: ControlArbiter,
    human: HumanController,
    clock: SimulationClock,
    /// Latest bot decision; stands until replaced or invalidated
    bot_action: Option<BotAction>,
    last_bot_error: Option<BotError>,
}

impl Simulation {
    /// Validate the level, generate terrain and spawn the lander
    pub fn new(level: LevelConfig, seed: u64) -> Result<Self, ConfigError> {
        level.validate()?;
        let terrain = TerrainGenerator::new(level.terrain.clone()).generate(seed, level.start.x)?;

        let start_x = terrain.world().clamp_x(level.start.x);
        let spawn = Pose::new(
            Vec2::new(start_x, terrain.terrain_height(start_x) + level.start.altitude),
            level.start.angle,
        );
        let lander = LanderState::new(&level, spawn);
        let physics =
            PhysicsEngineAdapter::new(&level, &terrain, spawn, level.start.velocity, lander.fuel);

        log::info!(
            "Simulation ready: level '{}' seed {} lander {} with {} targets",
            level.name,
            seed,
            level.lander.kind.as_str(),
            terrain.targets().len()
        );

        Ok(Self {
            resolver: ContactResolver::new(&level),
            sensors: SensorModel::new(&level),
            arbiter: ControlArbiter::new(level.override_timeout),
            human: HumanController::new(),
            clock: SimulationClock::new(level.physics_dt(), level.bot_dt()),
            bot_action: None,
            last_bot_error: None,
            level,
            seed,
            spawn,
            terrain,
            lander,
            physics,
        })
    }

    pub fn level(&self) -> &LevelConfig {
        &self.level
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn lander(&self) -> &LanderState {
        &self.lander
    }

    pub fn terrain(&self) -> &Terrain {
        &self.terrain
    }

    /// Controls applied during the most recent tick
    pub fn controls(&self) -> ControlTuple {
        self.arbiter.output()
    }

    pub fn control_source(&self) -> ControlSource {
        self.arbiter.source()
    }

    /// Simulated seconds since spawn or the last reset
    pub fn elapsed(&self) -> f32 {
        self.clock.elapsed()
    }

    pub fn physics_steps(&self) -> u64 {
        self.clock.total_steps()
    }

    pub fn vehicle(&self) -> &VehicleInfo {
        self.sensors.vehicle()
    }

    pub fn physics(&self) -> &PhysicsEngineAdapter {
        &self.physics
    }

    /// Most recent contained bot failure
    pub fn last_bot_error(&self) -> Option<&BotError> {
        self.last_bot_error.as_ref()
    }

    /// Current passive readings, e.g. for a HUD
    pub fn passive_sensors(&self) -> PassiveSensors {
        self.sensors
            .passive(self.clock.elapsed(), &self.lander, &self.terrain, &self.physics)
    }

    /// Put the lander back at the spawn point with a fresh tank and targets
    pub fn reset(&mut self) {
        self.terrain.reset_targets();
        self.lander = LanderState::new(&self.level, self.spawn);
        self.physics
            .reset_lander(self.spawn, self.level.start.velocity, self.lander.fuel);
        self.resolver.reset();
        self.arbiter.reset();
        self.human.reset();
        self.clock.reset();
        self.sensors.begin_tick();
        self.bot_action = None;
        self.last_bot_error = None;
        log::info!("Simulation reset (seed {})", self.seed);
    }

    /// Advance by `frame_dt` seconds of wall time
    pub fn tick(
        &mut self,
        input: &TickInput,
        bot: Option<&mut dyn Bot>,
        frame_dt: f32,
    ) -> TickReport {
        let mut report = TickReport::default();
        if input.reset {
            self.reset();
            if let Some(bot) = bot {
                bot.reset();
            }
            report.events.push(SimEvent::Reset);
            return report;
        }

        self.sensors.begin_tick();
        let advance = self.clock.advance(frame_dt);
        let dt = self.clock.physics_dt();
        let tick_time = advance.physics_steps as f32 * dt;
        report.physics_steps = advance.physics_steps;
        report.bot_updates = advance.bot_updates;

        let human = input
            .human
            .as_ref()
            .map(|signals| self.human.update(signals, tick_time));

        if advance.bot_updates > 0 {
            if let Some(bot) = bot {
                let bot_dt = advance.bot_updates as f32 * self.clock.bot_dt();
                self.bot_action = self.poll_bot(bot, bot_dt);
            }
        }

        let bot_request = self.bot_action.as_ref().and_then(BotAction::request);
        let controls = self
            .arbiter
            .resolve(tick_time, human.as_ref(), bot_request.as_ref());
        if self.arbiter.source() != ControlSource::Human {
            self.human.sync(&controls);
        }
        report.source = self.arbiter.source();
        report.controls = controls;

        if self.lander.lifecycle == Lifecycle::Landed
            && (input.takeoff || controls.target_thrust > 0.0)
        {
            report.events.extend(self.resolver.takeoff(&mut self.lander));
        }

        for _ in 0..advance.physics_steps {
            if let Some(event) = self.substep(&controls, dt) {
                let at_rest = matches!(event, SimEvent::Landed { .. } | SimEvent::Crashed { .. });
                report.events.push(event);
                if at_rest {
                    // Stale commands must not lift straight off again
                    self.bot_action = None;
                    self.arbiter.cut_thrust();
                    self.human.cut_thrust();
                }
            }
            if self.lander.lifecycle == Lifecycle::Crashed {
                break;
            }
        }

        report.controls = self.arbiter.output();
        report
    }

    fn substep(&mut self, controls: &ControlTuple, dt: f32) -> Option<SimEvent> {
        if self.lander.lifecycle != Lifecycle::Flying {
            return self.resolver.refuel(dt, controls.refuel, &mut self.lander);
        }

        let had_fuel = !self.lander.is_out_of_fuel();
        let applied = self.physics.apply_controls(
            controls.target_thrust,
            controls.target_angle,
            self.lander.fuel,
            dt,
        );
        self.lander.fuel = (self.lander.fuel - applied.fuel_used).max(0.0);
        self.lander.thrust_level = applied.thrust_level;

        let step = self.physics.step(dt);
        let pose = self.physics.get_pose();
        let velocity = self.physics.get_velocity();
        if is_unstable(&pose, &velocity) {
            log::error!(
                "Physics instability at t={:.3}: pose={:?} velocity={:?}",
                self.clock.elapsed(),
                pose,
                velocity
            );
            let last_good = self.lander.pose;
            let speed = self.lander.velocity.speed();
            return Some(self.resolver.crash(
                FailureReason::PhysicsInstability,
                last_good,
                speed,
                &mut self.lander,
                &mut self.physics,
            ));
        }
        self.lander.pose = pose;
        self.lander.velocity = velocity;

        let contact = self.resolver.resolve_step(
            &step,
            &mut self.lander,
            &mut self.terrain,
            &mut self.physics,
        );
        if contact.is_some() {
            return contact;
        }
        if had_fuel && self.lander.is_out_of_fuel() {
            log::info!("Fuel exhausted at t={:.2}", self.clock.elapsed());
            return Some(SimEvent::FuelExhausted);
        }
        None
    }

    /// Run one bot update, containing errors and panics
    fn poll_bot(&mut self, bot: &mut dyn Bot, dt: f32) -> Option<BotAction> {
        let passive = self
            .sensors
            .passive(self.clock.elapsed(), &self.lander, &self.terrain, &self.physics);
        let active = self.sensors.active(&self.lander, &self.terrain, &self.physics);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| bot.update(dt, &passive, &active)));
        let error = match outcome {
            Ok(Ok(action)) => return Some(action),
            Ok(Err(err)) => err,
            Err(payload) => BotError::Panicked(panic_message(payload.as_ref())),
        };
        log::warn!("Bot '{}' update skipped: {}", bot.name(), error);
        self.last_bot_error = Some(error);
        None
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::{Autopilot, BotStatus};
    use crate::config::LevelPreset;
    use crate::consts::PHYSICS_DT;
    use crate::sim::sensor::ActiveSensors;

    fn flat() -> Simulation {
        Simulation::new(LevelConfig::from_preset(LevelPreset::Flat), 0).unwrap()
    }

    /// Always asks for the same controls
    struct Fixed(BotAction);

    impl Bot for Fixed {
        fn update(
            &mut self,
            _dt: f32,
            _passive: &PassiveSensors,
            _active: &ActiveSensors<'_>,
        ) -> Result<BotAction, BotError> {
            Ok(self.0.clone())
        }
    }

    struct Panicky;

    impl Bot for Panicky {
        fn update(
            &mut self,
            _dt: f32,
            _passive: &PassiveSensors,
            _active: &ActiveSensors<'_>,
        ) -> Result<BotAction, BotError> {
            panic!("bot blew up");
        }
    }

    fn run_until_rest(sim: &mut Simulation, bot: &mut dyn Bot, max_ticks: u32) -> Vec<SimEvent> {
        let mut events = Vec::new();
        for _ in 0..max_ticks {
            let report = sim.tick(&TickInput::default(), Some(&mut *bot), PHYSICS_DT);
            events.extend(report.events);
            if sim.lander().lifecycle.is_at_rest() {
                break;
            }
        }
        events
    }

    #[test]
    fn test_spawns_above_terrain() {
        let sim = flat();
        let level = sim.level();
        let ground = sim.terrain().terrain_height(level.start.x);
        assert!((sim.lander().pose.position.y - ground - level.start.altitude).abs() < 1e-4);
        assert_eq!(sim.elapsed(), 0.0);
    }

    #[test]
    fn test_invalid_level_rejected() {
        let mut level = LevelConfig::default();
        level.physics_hz = 0.0;
        assert!(Simulation::new(level, 0).is_err());
    }

    #[test]
    fn test_free_fall_crashes_and_pins_body() {
        let mut sim = flat();
        let events = run_until_rest(&mut sim, &mut Fixed(BotAction::idle()), 2000);
        assert_eq!(sim.lander().lifecycle, Lifecycle::Crashed);
        assert!(events.iter().any(|e| matches!(e, SimEvent::Crashed { .. })));
        assert_eq!(sim.lander().failure_reason, Some(FailureReason::Crash));

        let rest = sim.lander().pose;
        for _ in 0..60 {
            sim.tick(&TickInput::default(), None, PHYSICS_DT);
        }
        assert_eq!(sim.lander().pose, rest);
        assert!(sim.physics().verify_at_rest(&rest).is_ok());
    }

    #[test]
    fn test_autopilot_lands_on_home_pad() {
        let mut sim = flat();
        let events = run_until_rest(&mut sim, &mut Autopilot::new(), 120 * 120);
        let lander = sim.lander();
        assert_eq!(lander.lifecycle, Lifecycle::Landed, "{events:?}");
        assert_eq!(lander.landing_count, 1);
        assert!(lander.credits > 0.0);
        assert_eq!(lander.velocity.speed(), 0.0);
        assert!(sim.physics().verify_at_rest(&lander.pose).is_ok());
    }

    #[test]
    fn test_landed_lander_stays_put_without_thrust() {
        let mut sim = flat();
        run_until_rest(&mut sim, &mut Autopilot::new(), 120 * 120);
        let rest = sim.lander().pose;
        let idle = &mut Fixed(BotAction::drive(0.0, 0.0).with_status(BotStatus::Done));
        for _ in 0..120 {
            sim.tick(&TickInput::default(), Some(&mut *idle), PHYSICS_DT);
        }
        assert_eq!(sim.lander().lifecycle, Lifecycle::Landed);
        assert_eq!(sim.lander().pose, rest);
    }

    #[test]
    fn test_thrust_while_landed_takes_off() {
        let mut sim = flat();
        run_until_rest(&mut sim, &mut Autopilot::new(), 120 * 120);
        let ground_y = sim.lander().pose.position.y;
        let climb = &mut Fixed(BotAction::drive(1.0, 0.0));
        // A full bot period guarantees a fresh command this tick
        let report = sim.tick(&TickInput::default(), Some(&mut *climb), 1.0 / 60.0);
        assert!(report.events.iter().any(|e| matches!(e, SimEvent::TookOff { .. })));
        for _ in 0..120 {
            sim.tick(&TickInput::default(), Some(&mut *climb), PHYSICS_DT);
        }
        assert_eq!(sim.lander().lifecycle, Lifecycle::Flying);
        assert!(sim.lander().pose.position.y > ground_y + 1.0);
    }

    #[test]
    fn test_weak_takeoff_settles_back_and_refuels() {
        let mut sim = flat();
        run_until_rest(&mut sim, &mut Autopilot::new(), 120 * 120);
        let rest = sim.lander().pose;
        let credits = sim.lander().credits;

        // Far too little thrust to lift the lander off the pad
        let weak = &mut Fixed(BotAction::drive(0.05, 0.0));
        let report = sim.tick(&TickInput::default(), Some(&mut *weak), 1.0 / 60.0);
        assert!(report.events.iter().any(|e| matches!(e, SimEvent::TookOff { .. })));
        assert_eq!(sim.lander().lifecycle, Lifecycle::Flying);

        let events = run_until_rest(&mut sim, &mut Fixed(BotAction::idle()), 240);
        assert!(
            events.iter().any(|e| matches!(e, SimEvent::Landed { awarded, .. } if *awarded == 0.0)),
            "{events:?}"
        );
        let lander = sim.lander();
        assert_eq!(lander.lifecycle, Lifecycle::Landed);
        assert_eq!(lander.landing_count, 1);
        assert_eq!(lander.credits, credits);
        assert!((lander.pose.position - rest.position).length() < 0.05);
        assert!(sim.physics().verify_at_rest(&lander.pose).is_ok());

        let fuel = sim.lander().fuel;
        let refuel = &mut Fixed(BotAction::drive(0.0, 0.0).with_refuel(true));
        for _ in 0..600 {
            sim.tick(&TickInput::default(), Some(&mut *refuel), PHYSICS_DT);
        }
        assert_eq!(sim.lander().lifecycle, Lifecycle::Landed);
        assert!(sim.lander().fuel > fuel);
        assert!(sim.lander().credits < credits);
    }

    #[test]
    fn test_runaway_step_crashes_at_last_good_pose() {
        let mut level = LevelConfig::from_preset(LevelPreset::Flat);
        // One sub-step of this gravity overshoots the stable speed limit
        level.gravity = -1.0e6;
        let mut sim = Simulation::new(level, 0).unwrap();
        let spawn = sim.lander().pose;

        let report = sim.tick(&TickInput::default(), None, PHYSICS_DT);
        assert!(report.events.iter().any(|e| matches!(
            e,
            SimEvent::Crashed {
                reason: FailureReason::PhysicsInstability,
                ..
            }
        )));
        let lander = sim.lander();
        assert_eq!(lander.lifecycle, Lifecycle::Crashed);
        assert_eq!(lander.failure_reason, Some(FailureReason::PhysicsInstability));
        assert_eq!(lander.crash_count, 1);
        assert_eq!(lander.pose, spawn);
        assert_eq!(lander.velocity.speed(), 0.0);
        assert_eq!(sim.physics().get_velocity().speed(), 0.0);
        assert!(sim.physics().verify_at_rest(&spawn).is_ok());

        // Pinned: later ticks do not move it
        for _ in 0..10 {
            sim.tick(&TickInput::default(), None, PHYSICS_DT);
        }
        assert_eq!(sim.lander().pose, spawn);
    }

    #[test]
    fn test_bot_panic_is_a_noop() {
        let mut sim = flat();
        let before = sim.controls();
        let report = sim.tick(&TickInput::default(), Some(&mut Panicky), 1.0 / 60.0);
        assert_eq!(report.bot_updates, 1);
        assert_eq!(sim.controls().target_thrust, before.target_thrust);
        assert!(!sim.controls().refuel);
        assert!(matches!(sim.last_bot_error(), Some(BotError::Panicked(m)) if m == "bot blew up"));
        // The run carries on
        sim.tick(&TickInput::default(), Some(&mut Panicky), 1.0 / 60.0);
        assert_eq!(sim.physics_steps(), 4);
    }

    #[test]
    fn test_human_overrides_bot() {
        let mut sim = flat();
        let bot = &mut Fixed(BotAction::drive(1.0, 0.0));
        let input = TickInput {
            human: Some(InputSignals {
                rotate_left: true,
                ..InputSignals::default()
            }),
            ..TickInput::default()
        };
        let report = sim.tick(&input, Some(&mut *bot), 1.0 / 60.0);
        assert_eq!(report.source, ControlSource::Human);
        assert_eq!(report.controls.target_thrust, 0.0);

        let report = sim.tick(&TickInput::default(), Some(&mut *bot), 1.0 / 60.0);
        assert_eq!(report.source, ControlSource::Human);
    }

    #[test]
    fn test_reset_restores_spawn() {
        let mut sim = flat();
        let spawn = sim.lander().clone();
        run_until_rest(&mut sim, &mut Fixed(BotAction::idle()), 2000);
        let report = sim.tick(
            &TickInput {
                reset: true,
                ..TickInput::default()
            },
            None,
            PHYSICS_DT,
        );
        assert_eq!(report.events, vec![SimEvent::Reset]);
        assert_eq!(sim.lander(), &spawn);
        assert_eq!(sim.elapsed(), 0.0);
        assert_eq!(sim.physics().get_pose(), spawn.pose);
        assert!(sim.terrain().targets().iter().all(|t| !t.collected));
    }

    #[test]
    fn test_fuel_exhaustion_reported_once() {
        let mut level = LevelConfig::from_preset(LevelPreset::Flat);
        level.start.fuel = Some(0.05);
        level.start.altitude = 1000.0;
        let mut sim = Simulation::new(level, 0).unwrap();
        let burn = &mut Fixed(BotAction::drive(1.0, 0.0));
        let mut exhausted = 0;
        for _ in 0..240 {
            let report = sim.tick(&TickInput::default(), Some(&mut *burn), PHYSICS_DT);
            exhausted += report
                .events
                .iter()
                .filter(|e| matches!(e, SimEvent::FuelExhausted))
                .count();
        }
        assert_eq!(exhausted, 1);
        assert_eq!(sim.lander().fuel, 0.0);
        assert_eq!(sim.lander().thrust_level, 0.0);
    }

    #[test]
    fn test_simulation_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Simulation>();
    }
}
