//! Parallel-gripper controller.

use crate::controller::{ActuatorCommand, ActuatorMapping, Controller};
use crate::env::SimEnvironment;
use crate::error::{CollectError, Result};
use std::f32::consts::E;

/// How fast the lock clip bound moves towards -1, per simulated second.
pub const LOCK_DECAY_RATE: f32 = 0.5;

/// Where the gripper's command comes from. Chosen once at construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GripperMode {
    /// Trigger-driven teleoperation.
    Live,
    /// Recorded commands passed through unchanged.
    Replay,
}

/// Maps a trigger value in `[0, 1]` onto `[0, 1]` along `(e^(k t) - 1) / (e^k - 1)`, `k = e`.
pub fn trigger_curve(trigger: f32) -> f32 {
    let t = trigger.clamp(0.0, 1.0);
    ((E * t).exp() - 1.0) / (E.exp() - 1.0)
}

pub struct GripperController {
    label: String,
    mapping: ActuatorMapping,
    ranges: Vec<(f32, f32)>,
    mode: GripperMode,
    trigger: f32,
    primary: bool,
    secondary: bool,
    /// Upper clip bound on the offset rate, in `[-1, 0]`.
    clip_bound: f32,
    replay_ctrl: Option<Vec<f32>>,
}

impl GripperController {
    pub fn new(
        label: impl Into<String>,
        mapping: ActuatorMapping,
        ranges: Vec<(f32, f32)>,
        mode: GripperMode,
    ) -> Result<Self> {
        if ranges.len() != mapping.len() {
            return Err(CollectError::config(format!(
                "gripper has {} actuators but {} ranges",
                mapping.len(),
                ranges.len()
            )));
        }
        if let Some((lo, hi)) = ranges.iter().find(|(lo, hi)| lo > hi) {
            return Err(CollectError::config(format!(
                "gripper range ({lo}, {hi}) is inverted"
            )));
        }
        Ok(Self {
            label: label.into(),
            mapping,
            ranges,
            mode,
            trigger: 0.0,
            primary: false,
            secondary: false,
            clip_bound: 0.0,
            replay_ctrl: None,
        })
    }

    pub fn mode(&self) -> GripperMode {
        self.mode
    }

    pub fn clip_bound(&self) -> f32 {
        self.clip_bound
    }

    pub fn update_trigger_value(&mut self, trigger: f32) {
        self.trigger = trigger;
    }

    /// Primary button: unlocks by resetting the clip bound.
    pub fn update_primary_button(&mut self, pressed: bool) {
        self.primary = pressed;
    }

    /// Secondary button: while held, the clip bound decays towards -1.
    pub fn update_secondary_button(&mut self, pressed: bool) {
        self.secondary = pressed;
    }

    /// Stores a recorded command, one value per actuator.
    pub fn update_ctrl(&mut self, ctrl: &[f32]) -> Result<()> {
        if ctrl.len() != self.mapping.len() {
            return Err(CollectError::SampleWidth {
                target: "gripper command",
                expected: self.mapping.len(),
                actual: ctrl.len(),
            });
        }
        self.replay_ctrl = Some(ctrl.to_vec());
        Ok(())
    }

    /// Live-mode command values for the given tick length, one per actuator.
    ///
    /// Advances the lock state, so call exactly once per tick.
    pub fn live_command(&mut self, dt: f32) -> Vec<f32> {
        if self.secondary {
            self.clip_bound = (self.clip_bound - LOCK_DECAY_RATE * dt).clamp(-1.0, 0.0);
        } else if self.primary {
            self.clip_bound = 0.0;
        }

        let offset_rate = (-trigger_curve(self.trigger)).clamp(-1.0, self.clip_bound);
        self.ranges
            .iter()
            .map(|&(lo, hi)| (-offset_rate * (hi - lo)).clamp(lo, hi))
            .collect()
    }
}

impl Controller for GripperController {
    fn label(&self) -> &str {
        &self.label
    }

    fn init_index_mapping(&mut self, env: &dyn SimEnvironment) -> Result<()> {
        self.mapping.resolve(env)?;
        Ok(())
    }

    fn indices(&self) -> &[usize] {
        self.mapping.indices()
    }

    fn defaults(&self) -> Vec<ActuatorCommand> {
        self.mapping.defaults()
    }

    fn run(&mut self, env: &dyn SimEnvironment) -> Result<Vec<ActuatorCommand>> {
        match self.mode {
            GripperMode::Live => {
                let values = self.live_command(env.dt());
                self.mapping.zip_values("gripper command", &values)
            }
            // Nothing recorded yet: leave the defaults in place.
            GripperMode::Replay => match &self.replay_ctrl {
                Some(values) => self.mapping.zip_values("gripper command", values),
                None => Ok(Vec::new()),
            },
        }
    }
}
