//! Built-in descent autopilot
//!
//! Picks the nearest uncollected target on radar, closes the horizontal gap
//! at a safe cruise clearance, then descends through a banded vertical speed
//! schedule. Thrust comes from a velocity loop on top of gravity
//! compensation; attitude from a horizontal velocity loop.

use serde::{Deserialize, Serialize};

use super::{Bot, BotAction, BotStatus};
use crate::error::BotError;
use crate::sim::sensor::{ActiveSensors, PassiveSensors};
use crate::sim::state::Lifecycle;

/// Gains and schedule for the autopilot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutopilotTuning {
    /// Horizontal distance to the pad centre at which descent begins
    pub align_band: f32,
    /// Desired horizontal speed per unit of horizontal offset
    pub vx_gain: f32,
    pub vx_cap: f32,
    /// Tilt (radians) per unit of horizontal speed error
    pub tilt_gain: f32,
    pub max_tilt: f32,
    /// Tilt limit below `mid_altitude`
    pub near_tilt: f32,
    /// Vertical speed error to commanded acceleration (1/s)
    pub vy_gain: f32,
    pub descend_fast: f32,
    pub descend_mid: f32,
    pub descend_slow: f32,
    pub touchdown_vy: f32,
    /// Clearance bands (leg clearance above the ground)
    pub far_altitude: f32,
    pub mid_altitude: f32,
    pub touchdown_altitude: f32,
    /// Clearance held while still crossing to the pad
    pub cruise_altitude: f32,
    /// Seconds of travel checked ahead for terrain while cruising
    pub lookahead: f32,
    /// Refuel on a pad while the tank is below this fraction
    pub refuel_below: f32,
}

impl Default for AutopilotTuning {
    fn default() -> Self {
        Self {
            align_band: 12.0,
            vx_gain: 0.09,
            vx_cap: 10.0,
            tilt_gain: 0.08,
            max_tilt: 0.52,
            near_tilt: 0.13,
            vy_gain: 2.0,
            descend_fast: -4.8,
            descend_mid: -3.0,
            descend_slow: -1.4,
            touchdown_vy: -0.75,
            far_altitude: 70.0,
            mid_altitude: 26.0,
            touchdown_altitude: 6.0,
            cruise_altitude: 40.0,
            lookahead: 3.0,
            refuel_below: 0.9,
        }
    }
}

impl AutopilotTuning {
    /// Faster schedule for long vertical drops
    pub fn plunge() -> Self {
        Self {
            align_band: 13.0,
            vx_gain: 0.085,
            vx_cap: 12.0,
            max_tilt: 0.58,
            near_tilt: 0.15,
            descend_fast: -7.0,
            descend_mid: -4.6,
            descend_slow: -1.8,
            touchdown_vy: -0.9,
            far_altitude: 150.0,
            mid_altitude: 42.0,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Autopilot {
    tuning: AutopilotTuning,
    target: Option<usize>,
}

impl Autopilot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tuning(tuning: AutopilotTuning) -> Self {
        Self {
            tuning,
            target: None,
        }
    }

    /// Target currently being flown to
    pub fn target(&self) -> Option<usize> {
        self.target
    }

    fn vertical_setpoint(&self, clearance: f32, aligned: bool, hazard: bool) -> f32 {
        let t = &self.tuning;
        if !aligned && (clearance < t.cruise_altitude || hazard) {
            let climb = ((t.cruise_altitude - clearance) * 0.5).clamp(t.descend_fast, 3.0);
            return if hazard { climb.max(1.0) } else { climb };
        }
        if clearance > t.far_altitude {
            t.descend_fast
        } else if clearance > t.mid_altitude {
            t.descend_mid
        } else if clearance > t.touchdown_altitude {
            t.descend_slow
        } else {
            t.touchdown_vy
        }
    }
}

impl Bot for Autopilot {
    fn name(&self) -> &str {
        "autopilot"
    }

    fn update(
        &mut self,
        _dt: f32,
        passive: &PassiveSensors,
        active: &ActiveSensors<'_>,
    ) -> Result<BotAction, BotError> {
        let t = self.tuning;
        match passive.lifecycle {
            Lifecycle::Crashed => return Ok(BotAction::idle()),
            Lifecycle::Landed => {
                self.target = None;
                let refuel = passive.fuel_fraction < t.refuel_below;
                let status = if refuel { BotStatus::Active } else { BotStatus::Done };
                return Ok(BotAction::drive(0.0, 0.0)
                    .with_refuel(refuel)
                    .with_status(status));
            }
            Lifecycle::Flying => {}
        }

        let vehicle = active.vehicle();
        if !passive.position.is_finite() || !passive.velocity.is_finite() {
            return Err(BotError::Failed("non-finite sensor reading".into()));
        }

        let contact = passive
            .nearest_fresh_target()
            .or_else(|| passive.radar.first());
        self.target = contact.map(|c| c.target);
        let dx = contact.map_or(0.0, |c| c.offset.x);
        let aligned = dx.abs() <= t.align_band;

        let clearance = passive.altitude - vehicle.height * 0.5;
        let velocity = passive.velocity;

        // Terrain ahead while crossing: cast along the flight path
        let speed = velocity.length();
        let hazard = !aligned && speed > 1e-3 && {
            let angle = (velocity.y - 0.35 * speed).atan2(velocity.x);
            let range = (speed * t.lookahead).clamp(50.0, 2000.0);
            active.raycast(angle, range) < (speed * 2.0).max(20.0)
        };

        let vx_sp = (dx * t.vx_gain).clamp(-t.vx_cap, t.vx_cap);
        let tilt_limit = if clearance < t.touchdown_altitude {
            0.0
        } else if clearance < t.mid_altitude {
            t.near_tilt
        } else {
            t.max_tilt
        };
        // Positive tilt pushes toward -x
        let target_angle = (-(vx_sp - velocity.x) * t.tilt_gain).clamp(-tilt_limit, tilt_limit);

        let vy_sp = self.vertical_setpoint(clearance, aligned, hazard);
        let accel = -vehicle.gravity + t.vy_gain * (vy_sp - velocity.y);
        let lift = vehicle.max_thrust * passive.angle.cos().max(0.3);
        let target_thrust = if lift > 0.0 {
            (passive.mass * accel / lift).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let mut action = BotAction::drive(target_thrust, target_angle);
        if hazard {
            action = action.with_message("terrain ahead");
        }
        Ok(action)
    }

    fn reset(&mut self) {
        self.target = None;
    }
}
