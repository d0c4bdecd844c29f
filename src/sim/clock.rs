//! Fixed-step simulation clock
//!
//! Frame time goes into an accumulator that is drained in whole physics
//! sub-steps. Bot updates are scheduled from simulated time, so a run behaves
//! the same whatever frame rate drives it.

use crate::consts::{MAX_FRAME_DT, MAX_SUBSTEPS};

/// Absorbs float noise when comparing accumulated time against a step
const EPSILON: f64 = 1e-6;

/// Work due for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClockAdvance {
    pub physics_steps: u32,
    pub bot_updates: u32,
}

#[derive(Debug, Clone)]
pub struct SimulationClock {
    physics_dt: f32,
    bot_dt: f32,
    max_substeps: u32,
    accumulator: f64,
    total_steps: u64,
    bot_updates: u64,
    /// Simulated seconds discarded by the sub-step cap
    dropped: f64,
}

impl SimulationClock {
    pub fn new(physics_dt: f32, bot_dt: f32) -> Self {
        Self {
            physics_dt,
            bot_dt: bot_dt.max(physics_dt),
            max_substeps: MAX_SUBSTEPS,
            accumulator: 0.0,
            total_steps: 0,
            bot_updates: 0,
            dropped: 0.0,
        }
    }

    pub fn with_max_substeps(mut self, max_substeps: u32) -> Self {
        self.max_substeps = max_substeps.max(1);
        self
    }

    pub fn physics_dt(&self) -> f32 {
        self.physics_dt
    }

    pub fn bot_dt(&self) -> f32 {
        self.bot_dt
    }

    /// Simulated seconds elapsed
    pub fn elapsed(&self) -> f32 {
        (self.total_steps as f64 * self.physics_dt as f64) as f32
    }

    pub fn total_steps(&self) -> u64 {
        self.total_steps
    }

    pub fn dropped_time(&self) -> f32 {
        self.dropped as f32
    }

    /// Account for `frame_dt` seconds of wall time
    pub fn advance(&mut self, frame_dt: f32) -> ClockAdvance {
        let frame_dt = if frame_dt.is_finite() {
            frame_dt.clamp(0.0, MAX_FRAME_DT)
        } else {
            0.0
        };
        self.accumulator += frame_dt as f64;

        let step = self.physics_dt as f64;
        let mut physics_steps = 0;
        while self.accumulator + EPSILON >= step && physics_steps < self.max_substeps {
            self.accumulator -= step;
            physics_steps += 1;
        }
        // Spiral of death: never carry more than one step of debt
        if self.accumulator + EPSILON >= step {
            log::debug!("Clock dropped {:.4}s beyond the sub-step cap", self.accumulator);
            self.dropped += self.accumulator;
            self.accumulator = 0.0;
        }
        self.accumulator = self.accumulator.max(0.0);
        self.total_steps += physics_steps as u64;

        let due = (self.total_steps as f64 * step / self.bot_dt as f64 + EPSILON).floor() as u64;
        let bot_updates = due.saturating_sub(self.bot_updates);
        self.bot_updates = due;

        ClockAdvance {
            physics_steps,
            bot_updates: bot_updates as u32,
        }
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
        self.total_steps = 0;
        self.bot_updates = 0;
        self.dropped = 0.0;
    }
}
