//! End-effector pose controller for one arm.

use crate::controller::{ActuatorCommand, ActuatorMapping, Controller};
use crate::env::{PoseTracker, SimEnvironment};
use crate::error::{CollectError, Result};
use crate::frames::{Pose, quat_from_xyzw_slice};
use glam::{Quat, Vec3};
use tracing::debug;

/// Drives one arm's end-effector towards a goal pose.
///
/// The goal is held in the base-body frame. It starts at the end-effector pose captured
/// at construction and is only ever changed relative to that anchor (teleoperation) or
/// overwritten with recorded base-frame values (replay). Each tick the goal is lifted
/// into world frame with the base pose *of that tick* and handed to the external
/// [`PoseTracker`], so a moving base never accumulates drift in the stored goal.
pub struct ArmController {
    label: String,
    mapping: ActuatorMapping,
    base_body: String,
    tracker: Box<dyn PoseTracker>,
    initial_base: Pose,
    initial_world: Pose,
    goal_base: Pose,
}

impl ArmController {
    /// Captures the tracked site's current pose as the goal anchor.
    pub fn new(
        label: impl Into<String>,
        env: &dyn SimEnvironment,
        mapping: ActuatorMapping,
        base_body: impl Into<String>,
        tracker: Box<dyn PoseTracker>,
    ) -> Result<Self> {
        let base_body = base_body.into();
        let site = tracker.eef_site().to_string();
        let initial_base = env.site_pose_relative(&site, &base_body)?;
        let initial_world = env.site_pose(&site)?;
        let label = label.into();
        debug!(arm = %label, ?initial_base, "captured end-effector anchor");

        Ok(Self {
            label,
            mapping,
            base_body,
            tracker,
            initial_base,
            initial_world,
            goal_base: initial_base,
        })
    }

    /// End-effector pose in base frame at construction.
    pub fn initial_base_pose(&self) -> Pose {
        self.initial_base
    }

    /// End-effector pose in world frame at construction.
    pub fn initial_world_pose(&self) -> Pose {
        self.initial_world
    }

    /// Current goal in base frame.
    pub fn goal_base(&self) -> Pose {
        self.goal_base
    }

    /// Sets the goal to the anchor displaced by a relative pose.
    ///
    /// `goal_pos_B = initial_pos_B + relative_position` and
    /// `goal_rot_B = initial_rot_B * relative_rotation`.
    pub fn update_goal(&mut self, relative_position: Vec3, relative_rotation: Quat) {
        self.goal_base = Pose {
            position: self.initial_base.position + relative_position,
            rotation: (self.initial_base.rotation * relative_rotation).normalize(),
        };
    }

    /// Overwrites the goal position with a recorded base-frame position.
    pub fn update_action_position(&mut self, position: &[f32]) -> Result<()> {
        let [x, y, z] = position else {
            return Err(CollectError::SampleWidth {
                target: "arm position",
                expected: 3,
                actual: position.len(),
            });
        };
        self.goal_base.position = Vec3::new(*x, *y, *z);
        Ok(())
    }

    /// Overwrites the goal orientation with a recorded base-frame `(x, y, z, w)` quaternion.
    pub fn update_action_axisangle(&mut self, quat: &[f32]) -> Result<()> {
        let rotation = quat_from_xyzw_slice(quat).ok_or(CollectError::SampleWidth {
            target: "arm orientation",
            expected: 4,
            actual: quat.len(),
        })?;
        self.goal_base.rotation = rotation.normalize();
        Ok(())
    }

    /// The goal lifted into world frame with the current base pose, as
    /// `[x, y, z, rx, ry, rz]`.
    pub fn world_goal(&self, env: &dyn SimEnvironment) -> Result<[f32; 6]> {
        let base = env.body_pose(&self.base_body)?;
        Ok(base.transform(&self.goal_base).to_pose_vector())
    }
}

impl Controller for ArmController {
    fn label(&self) -> &str {
        &self.label
    }

    fn init_index_mapping(&mut self, env: &dyn SimEnvironment) -> Result<()> {
        let offsets = env.joint_offsets(self.tracker.joint_names())?;
        self.tracker.bind_joint_offsets(offsets);
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
        let goal = self.world_goal(env)?;
        self.tracker.set_goal(goal);
        let ctrl = self.tracker.compute(env)?;
        self.mapping.zip_values("arm tracker output", &ctrl)
    }
}
