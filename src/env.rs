//! Collaborator seams: simulation, pose tracking, scene, task and storage.
//!
//! The pipeline never simulates physics, spawns scenes, evaluates geometric success
//! predicates or writes video itself. It drives those subsystems through the traits in
//! this module, so any backend (a MuJoCo binding, a kinematic stub, a test mock) can be
//! plugged in.

use crate::error::{CollectError, Result};
use crate::frames::Pose;
use glam::Vec3;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Flat qpos/qvel addresses of a set of joints.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JointOffsets {
    pub qpos: Vec<usize>,
    pub qvel: Vec<usize>,
}

/// One tick's observation, keyed by canonical stream name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Observation {
    /// Simulated time in seconds.
    pub time: f64,
    pub streams: BTreeMap<String, Vec<f32>>,
}

/// Result of advancing the simulation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepOutcome {
    pub observation: Observation,
    /// The environment ended the episode on its own.
    pub terminated: bool,
    /// The environment cut the episode short (e.g. a step limit).
    pub truncated: bool,
}

/// The simulated dual-arm system.
pub trait SimEnvironment {
    /// Simulated seconds per control tick.
    fn dt(&self) -> f32;

    /// Number of actuators, i.e. the command vector length.
    fn actuator_count(&self) -> usize;

    fn actuator_id(&self, name: &str) -> Option<usize>;

    fn joint_offsets(&self, joints: &[String]) -> Result<JointOffsets>;

    /// World-frame pose of a body.
    fn body_pose(&self, body: &str) -> Result<Pose>;

    /// World-frame pose of a site.
    fn site_pose(&self, site: &str) -> Result<Pose>;

    /// Pose of a site expressed in the frame of `body`.
    fn site_pose_relative(&self, site: &str, body: &str) -> Result<Pose>;

    /// Geometric extents of a site.
    fn site_size(&self, site: &str) -> Result<Vec3>;

    fn reset(&mut self) -> Result<()>;

    fn disable_actuator_groups(&mut self, groups: &[u32]) -> Result<()>;

    /// Writes the command vector without stepping.
    fn apply_ctrl(&mut self, ctrl: &[f32]) -> Result<()>;

    /// Recomputes derived quantities without advancing time.
    fn forward(&mut self) -> Result<()>;

    /// Applies `ctrl` and advances `substeps` physics steps.
    fn step(&mut self, ctrl: &[f32], substeps: u32) -> Result<StepOutcome>;

    fn render(&mut self) -> Result<()>;

    fn begin_video(&mut self, dir: &Path) -> Result<()>;

    fn stop_video(&mut self) -> Result<()>;
}

/// External operational-space solver tracking an end-effector goal.
pub trait PoseTracker {
    /// Site whose pose is being tracked.
    fn eef_site(&self) -> &str;

    /// Joints driven by this solver, in actuator order.
    fn joint_names(&self) -> &[String];

    fn bind_joint_offsets(&mut self, offsets: JointOffsets);

    /// Sets the world-frame goal as `[x, y, z, rx, ry, rz]`.
    fn set_goal(&mut self, goal: [f32; 6]);

    /// Computes one actuator value per configured actuator.
    fn compute(&mut self, env: &dyn SimEnvironment) -> Result<Vec<f32>>;
}

/// What the scene collaborator should do for the next episode.
#[derive(Clone, Copy, Debug)]
pub enum SceneRequest<'a> {
    /// Spawn and randomize a fresh scene.
    Randomize,
    /// Rebuild the scene recorded with a dataset unit.
    Restore(&'a Value),
}

/// Scene spawning and randomization.
pub trait SceneProvider {
    /// Sets up the scene; `Ok(false)` means no further scene can be produced.
    fn setup(&mut self, env: &mut dyn SimEnvironment, request: SceneRequest<'_>) -> Result<bool>;

    /// Re-randomizes object placement without respawning the scene.
    fn reshuffle(&mut self, env: &mut dyn SimEnvironment) -> Result<()>;

    /// Serializable description of the current scene.
    fn scene_info(&self) -> Value;
}

/// A manipulation task evaluated at the end of each episode.
pub trait Task {
    /// Attempts to instantiate the task, optionally from a recorded descriptor.
    ///
    /// Returns `Ok(false)` when the generated task is already solved and must be redrawn.
    fn propose(
        &mut self,
        env: &dyn SimEnvironment,
        scene: Option<&dyn SceneProvider>,
        task_info: Option<&Value>,
    ) -> Result<bool>;

    fn is_success(&self, env: &dyn SimEnvironment) -> Result<bool>;

    fn description(&self) -> String;

    /// Serializable descriptor persisted with each successful episode.
    fn task_info(&self) -> Value;
}

/// Retry cap for [`instantiate_task`].
pub const TASK_RETRY_LIMIT: u32 = 10;

/// Instantiates `task`, reshuffling the scene between failed attempts.
///
/// A generator that keeps producing already-solved tasks indicates a broken task or
/// scene configuration, so exhausting [`TASK_RETRY_LIMIT`] is fatal.
pub fn instantiate_task(
    task: &mut dyn Task,
    env: &mut dyn SimEnvironment,
    mut scene: Option<&mut (dyn SceneProvider + '_)>,
    task_info: Option<&Value>,
) -> Result<()> {
    for attempt in 0..TASK_RETRY_LIMIT {
        if task.propose(env, scene.as_deref(), task_info)? {
            info!(attempt, description = %task.description(), "task ready");
            return Ok(());
        }
        if let Some(scene) = scene.as_deref_mut() {
            scene.reshuffle(env)?;
        }
    }
    Err(CollectError::RetryExhausted {
        attempts: TASK_RETRY_LIMIT,
    })
}

/// A task that is always available and always successful.
#[derive(Clone, Debug, Default)]
pub struct EmptyTask;

impl Task for EmptyTask {
    fn propose(
        &mut self,
        _env: &dyn SimEnvironment,
        _scene: Option<&dyn SceneProvider>,
        _task_info: Option<&Value>,
    ) -> Result<bool> {
        Ok(true)
    }

    fn is_success(&self, _env: &dyn SimEnvironment) -> Result<bool> {
        Ok(true)
    }

    fn description(&self) -> String {
        "Empty Task".to_string()
    }

    fn task_info(&self) -> Value {
        Value::Object(Default::default())
    }
}

/// Metadata persisted with a successful episode.
#[derive(Clone, Debug)]
pub struct EpisodeRecord {
    pub task_info: Value,
    pub scene_info: Value,
    pub description: String,
}

/// Sink for demonstration data.
pub trait DataStorage {
    /// Buffers one tick's observation.
    fn collect(&mut self, observation: &Observation) -> Result<()>;

    /// Persists the buffered episode and returns where it was written.
    fn save(&mut self, record: &EpisodeRecord) -> Result<PathBuf>;

    /// Discards the buffered episode.
    fn clear(&mut self) -> Result<()>;

    /// Directory that video capture for the current episode should write into.
    fn video_dir(&mut self) -> Result<PathBuf>;
}
