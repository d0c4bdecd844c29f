//! Headless run evaluation
//!
//! Drives one [`Simulation`] with a bot until a stop condition or budget is
//! hit and reduces it to a [`RunResult`]. Stop conditions are only checked
//! between ticks. Reports and plots are built from result records by the
//! caller.

use serde::{Deserialize, Serialize};

use crate::bot::Bot;
use crate::config::LevelConfig;
use crate::consts::BOT_DT;
use crate::error::ConfigError;
use crate::sim::state::{FailureReason, Lifecycle};
use crate::sim::tick::{Simulation, TickInput};

/// Simulated-time cap applied when a run names no budget at all
pub const DEFAULT_MAX_TIME: f32 = 600.0;

/// Score weights
const SCORE_PER_FUEL: f32 = 10.0;
const SCORE_PER_LANDING: f32 = 100.0;
const SCORE_PER_CRASH: f32 = 200.0;

/// Events that end a run early
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopConditions {
    pub on_crash: bool,
    pub on_first_landing: bool,
    pub on_out_of_fuel: bool,
}

impl Default for StopConditions {
    fn default() -> Self {
        Self {
            on_crash: true,
            on_first_landing: false,
            on_out_of_fuel: false,
        }
    }
}

/// One headless run request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub seed: u64,
    pub level: LevelConfig,
    pub stop: StopConditions,
    /// Physics sub-step budget
    pub max_steps: Option<u64>,
    /// Simulated seconds budget
    pub max_time: Option<f32>,
    /// Wall time handed to each tick
    pub frame_dt: f32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            level: LevelConfig::default(),
            stop: StopConditions::default(),
            max_steps: None,
            max_time: Some(120.0),
            frame_dt: BOT_DT,
        }
    }
}

impl RunConfig {
    pub fn new(seed: u64, level: LevelConfig) -> Self {
        Self {
            seed,
            level,
            ..Self::default()
        }
    }

    /// Time budget actually enforced
    fn time_limit(&self) -> Option<f32> {
        match (self.max_steps, self.max_time) {
            (None, None) => Some(DEFAULT_MAX_TIME),
            (_, limit) => limit,
        }
    }
}

/// Result record of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub seed: u64,
    pub outcome: Lifecycle,
    pub elapsed_time: f32,
    pub credits: f32,
    pub fuel_remaining: f32,
    pub failure_reason: Option<FailureReason>,
    pub landing_count: u32,
    pub crash_count: u32,
    pub ticks: u64,
    pub physics_steps: u64,
}

impl RunResult {
    /// Higher is better
    pub fn score(&self) -> f32 {
        self.credits + SCORE_PER_FUEL * self.fuel_remaining
            + SCORE_PER_LANDING * self.landing_count as f32
            - SCORE_PER_CRASH * self.crash_count as f32
    }

    pub fn is_success(&self) -> bool {
        self.failure_reason.is_none() && self.landing_count > 0
    }
}

/// Why the loop stopped, if it did
fn stop_reason(sim: &Simulation, config: &RunConfig) -> Option<Option<FailureReason>> {
    let lander = sim.lander();
    match lander.lifecycle {
        Lifecycle::Crashed
            if config.stop.on_crash
                || lander.failure_reason == Some(FailureReason::PhysicsInstability) =>
        {
            return Some(lander.failure_reason);
        }
        Lifecycle::Landed if config.stop.on_first_landing => return Some(None),
        Lifecycle::Flying if config.stop.on_out_of_fuel && lander.is_out_of_fuel() => {
            return Some(Some(FailureReason::OutOfFuel));
        }
        _ => {}
    }

    // Budgets only count as failures while still in the air
    let flying = lander.lifecycle == Lifecycle::Flying;
    let budget = |reason| Some(flying.then_some(reason).or(lander.failure_reason));
    if config.max_steps.is_some_and(|max| sim.physics_steps() >= max) {
        return budget(FailureReason::StepBudget);
    }
    if config.time_limit().is_some_and(|max| sim.elapsed() >= max) {
        return budget(FailureReason::TimeBudget);
    }
    None
}

/// Run one simulation to completion
pub fn run(config: &RunConfig, bot: &mut dyn Bot) -> Result<RunResult, ConfigError> {
    if !(config.frame_dt.is_finite() && config.frame_dt > 0.0) {
        return Err(ConfigError::NonPositive {
            field: "frame_dt",
            value: config.frame_dt,
        });
    }
    let mut sim = Simulation::new(config.level.clone(), config.seed)?;
    bot.reset();
    log::info!(
        "Run start: seed={} level='{}' bot={}",
        config.seed,
        config.level.name,
        bot.name()
    );

    let input = TickInput::default();
    let mut ticks = 0u64;
    let failure_reason = loop {
        sim.tick(&input, Some(&mut *bot), config.frame_dt);
        ticks += 1;
        if let Some(reason) = stop_reason(&sim, config) {
            break reason;
        }
    };

    let lander = sim.lander();
    let result = RunResult {
        seed: config.seed,
        outcome: lander.lifecycle,
        elapsed_time: sim.elapsed(),
        credits: lander.credits,
        fuel_remaining: lander.fuel,
        failure_reason,
        landing_count: lander.landing_count,
        crash_count: lander.crash_count,
        ticks,
        physics_steps: sim.physics_steps(),
    };
    log::info!(
        "Run end: seed={} outcome={} t={:.2}s score={:.1} failure={:?}",
        result.seed,
        result.outcome.as_str(),
        result.elapsed_time,
        result.score(),
        result.failure_reason.map(|r| r.as_str())
    );
    Ok(result)
}

/// Run independent configurations on scoped worker threads.
///
/// Every run gets its own simulation and its own bot from `make_bot`;
/// results come back in input order.
pub fn run_parallel<B, F>(configs: &[RunConfig], make_bot: F) -> Vec<Result<RunResult, ConfigError>>
where
    B: Bot,
    F: Fn() -> B + Sync,
{
    let make_bot = &make_bot;
    std::thread::scope(|scope| {
        let handles: Vec<_> = configs
            .iter()
            .map(|config| {
                scope.spawn(move || {
                    let mut bot = make_bot();
                    run(config, &mut bot)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|payload| std::panic::resume_unwind(payload))
            })
            .collect()
    })
}
