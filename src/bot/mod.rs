//! Scripted pilots
//!
//! A [`Bot`] reads the sensor snapshot at its own update rate and answers with
//! a [`BotAction`]. Bots never touch simulation state directly; a failing or
//! panicking bot is contained by the simulation and treated as a no-op.

pub mod autopilot;

pub use autopilot::Autopilot;

use serde::{Deserialize, Serialize};

use crate::control::ControlTuple;
use crate::error::BotError;
use crate::sim::sensor::{ActiveSensors, PassiveSensors};

/// What the bot wants done with its action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotStatus {
    /// No request; the arbiter holds the previous controls
    #[default]
    Idle,
    /// Drive with these controls
    Active,
    /// Task finished; controls still apply
    Done,
}

/// One bot decision
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BotAction {
    pub target_thrust: f32,
    pub target_angle: f32,
    pub refuel: bool,
    pub status: BotStatus,
    /// Free-form note for logs and overlays
    pub message: Option<String>,
}

impl BotAction {
    pub fn drive(target_thrust: f32, target_angle: f32) -> Self {
        Self {
            target_thrust,
            target_angle,
            status: BotStatus::Active,
            ..Self::default()
        }
    }

    pub fn idle() -> Self {
        Self::default()
    }

    pub fn with_refuel(mut self, refuel: bool) -> Self {
        self.refuel = refuel;
        self
    }

    pub fn with_status(mut self, status: BotStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Controls the arbiter should consider, if this is a real request
    pub fn request(&self) -> Option<ControlTuple> {
        (self.status != BotStatus::Idle)
            .then(|| ControlTuple::new(self.target_thrust, self.target_angle, self.refuel))
    }
}

/// A pilot program
pub trait Bot {
    fn name(&self) -> &str {
        "bot"
    }

    /// Decide the next action from this tick's sensor readings
    fn update(
        &mut self,
        dt: f32,
        passive: &PassiveSensors,
        active: &ActiveSensors<'_>,
    ) -> Result<BotAction, BotError>;

    /// Forget per-run state
    fn reset(&mut self) {}
}
