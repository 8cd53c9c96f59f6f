// src/actuation.rs
//
// Maps discrete manual intents into continuous throttle/brake/steer with
// per-tick ramping. In autonomous mode the mapper is a no-op; command
// generation belongs to the platform's autopilot.

use crate::types::{ActuationCommand, ControlConfig, ManualIntent};

pub struct ActuationMapper {
    config: ControlConfig,
    throttle: f32,
    brake: f32,
    steer: f32,
}

impl ActuationMapper {
    pub fn new(config: ControlConfig) -> Self {
        Self {
            config,
            throttle: 0.0,
            brake: 0.0,
            steer: 0.0,
        }
    }

    /// Advance one tick of manual control. Held intents ramp toward their
    /// caps; released ones decay, steer multiplicatively and the rest by a
    /// fixed step. When both steer directions are asserted, left wins.
    pub fn step(&mut self, intent: &ManualIntent) -> ActuationCommand {
        let c = &self.config;

        self.throttle = if intent.accelerate {
            (self.throttle + c.throttle_step).min(c.throttle_cap)
        } else {
            (self.throttle - c.throttle_step).max(0.0)
        };

        self.brake = if intent.brake {
            (self.brake + c.brake_step).min(1.0)
        } else {
            (self.brake - c.brake_release_step).max(0.0)
        };

        self.steer = if intent.steer_left {
            (self.steer - c.steer_step).max(-c.steer_cap)
        } else if intent.steer_right {
            (self.steer + c.steer_step).min(c.steer_cap)
        } else {
            self.steer * c.steer_decay
        };

        ActuationCommand {
            throttle: self.throttle,
            brake: self.brake,
            steer: self.steer,
        }
    }

    /// Drop back to a neutral command, so the next manual phase does not
    /// resume from stale throttle or steer.
    pub fn reset(&mut self) {
        self.throttle = 0.0;
        self.brake = 0.0;
        self.steer = 0.0;
    }
}
