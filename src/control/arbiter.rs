//! Human/bot control arbitration
//!
//! Any human activity takes over immediately and arms an override timer.
//! While the timer runs the last human command is held, even if the human
//! goes quiet. The bot regains control only after the timer reaches zero.

use serde::{Deserialize, Serialize};

use super::{ControlTuple, HumanCommand};
use crate::consts::ANGLE_SNAP;
use crate::snap_angle;

/// Timer values below this count as expired
const TIMER_EPSILON: f32 = 1e-4;

/// Who produced the active controls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ControlSource {
    #[default]
    None,
    Human,
    Bot,
}

impl ControlSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlSource::None => "none",
            ControlSource::Human => "human",
            ControlSource::Bot => "bot",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControlArbiter {
    override_timeout: f32,
    override_timer: f32,
    output: ControlTuple,
    source: ControlSource,
}

impl ControlArbiter {
    pub fn new(override_timeout: f32) -> Self {
        Self {
            override_timeout: override_timeout.max(0.0),
            override_timer: 0.0,
            output: ControlTuple::default(),
            source: ControlSource::None,
        }
    }

    pub fn output(&self) -> ControlTuple {
        self.output
    }

    pub fn source(&self) -> ControlSource {
        self.source
    }

    /// Seconds until the bot may take over again
    pub fn override_remaining(&self) -> f32 {
        self.override_timer
    }

    pub fn human_override(&self) -> bool {
        self.override_timer > TIMER_EPSILON
    }

    /// Pick this tick's controls
    ///
    /// `bot` is the bot's standing request, if it has one.
    pub fn resolve(
        &mut self,
        dt: f32,
        human: Option<&HumanCommand>,
        bot: Option<&ControlTuple>,
    ) -> ControlTuple {
        match human.filter(|h| h.active) {
            Some(cmd) => {
                let mut controls = cmd.controls;
                if cmd.directional {
                    controls.target_angle = snap_angle(controls.target_angle, ANGLE_SNAP);
                }
                self.override_timer = self.override_timeout;
                self.output = controls;
                self.source = ControlSource::Human;
            }
            None => {
                self.override_timer = (self.override_timer - dt.max(0.0)).max(0.0);
                match bot.filter(|_| !self.human_override()) {
                    Some(request) => {
                        self.output = *request;
                        self.source = ControlSource::Bot;
                    }
                    None => {
                        // Hold, but never keep refueling unattended
                        self.output.refuel = false;
                    }
                }
            }
        }
        self.output
    }

    /// Drop the held thrust so a stale command cannot lift off again
    pub fn cut_thrust(&mut self) {
        self.output.target_thrust = 0.0;
        self.output.refuel = false;
    }

    pub fn reset(&mut self) {
        self.override_timer = 0.0;
        self.output = ControlTuple::default();
        self.source = ControlSource::None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{OVERRIDE_TIMEOUT, PHYSICS_DT};

    fn human(thrust: f32, angle: f32, directional: bool) -> HumanCommand {
        HumanCommand {
            controls: ControlTuple {
                target_thrust: thrust,
                target_angle: angle,
                refuel: false,
            },
            active: true,
            directional,
        }
    }

    fn idle() -> HumanCommand {
        HumanCommand::default()
    }

    #[test]
    fn test_bot_drives_without_human() {
        let mut arbiter = ControlArbiter::new(OVERRIDE_TIMEOUT);
        let bot = ControlTuple::new(0.6, 0.1, false);
        assert_eq!(arbiter.resolve(PHYSICS_DT, None, Some(&bot)), bot);
        assert_eq!(arbiter.source(), ControlSource::Bot);
    }

    #[test]
    fn test_human_override_and_anti_starvation() {
        let mut arbiter = ControlArbiter::new(OVERRIDE_TIMEOUT);
        let bot = ControlTuple::new(0.9, 0.0, false);
        let cmd = human(0.2, 0.0, false);

        // Human input at t=0, idle tuples afterwards
        let out = arbiter.resolve(PHYSICS_DT, Some(&cmd), Some(&bot));
        assert_eq!(out.target_thrust, 0.2);

        let mut switched_at = None;
        for tick in 1..=240u32 {
            let out = arbiter.resolve(PHYSICS_DT, Some(&idle()), Some(&bot));
            if out.target_thrust == 0.9 && switched_at.is_none() {
                switched_at = Some(tick);
            }
            if switched_at.is_none() {
                assert_eq!(arbiter.source(), ControlSource::Human);
            }
        }
        // Control returns to the bot after the one second timeout
        assert_eq!(switched_at, Some(120));
        assert_eq!(arbiter.source(), ControlSource::Bot);
    }

    #[test]
    fn test_continuous_human_input_keeps_control() {
        let mut arbiter = ControlArbiter::new(OVERRIDE_TIMEOUT);
        let bot = ControlTuple::new(0.9, 0.0, false);
        for _ in 0..600 {
            arbiter.resolve(PHYSICS_DT, Some(&human(0.3, 0.0, false)), Some(&bot));
        }
        assert_eq!(arbiter.source(), ControlSource::Human);
        assert!((arbiter.override_remaining() - OVERRIDE_TIMEOUT).abs() < 1e-6);
    }

    #[test]
    fn test_directional_input_snaps_to_45_degrees() {
        let mut arbiter = ControlArbiter::new(OVERRIDE_TIMEOUT);
        let out = arbiter.resolve(PHYSICS_DT, Some(&human(0.5, 0.7, true)), None);
        assert!((out.target_angle - ANGLE_SNAP).abs() < 1e-6);
        let out = arbiter.resolve(PHYSICS_DT, Some(&human(0.5, -0.3, true)), None);
        assert_eq!(out.target_angle, 0.0);
    }

    #[test]
    fn test_no_source_holds_previous_without_refuel() {
        let mut arbiter = ControlArbiter::new(OVERRIDE_TIMEOUT);
        let bot = ControlTuple::new(0.4, 0.2, true);
        arbiter.resolve(PHYSICS_DT, None, Some(&bot));
        let held = arbiter.resolve(PHYSICS_DT, None, None);
        assert_eq!(held.target_thrust, 0.4);
        assert_eq!(held.target_angle, 0.2);
        assert!(!held.refuel);
    }

    #[test]
    fn test_cut_thrust_and_reset() {
        let mut arbiter = ControlArbiter::new(OVERRIDE_TIMEOUT);
        arbiter.resolve(PHYSICS_DT, Some(&human(0.8, 0.0, false)), None);
        arbiter.cut_thrust();
        assert_eq!(arbiter.output().target_thrust, 0.0);
        arbiter.reset();
        assert!(!arbiter.human_override());
        assert_eq!(arbiter.source(), ControlSource::None);
    }
}
