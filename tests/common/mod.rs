// tests/common/mod.rs
#![allow(dead_code)]

use dualarm_collect::env::JointOffsets;
use dualarm_collect::{
    CollectError, DataStorage, EpisodeRecord, InputSource, InputState, Observation, Pose,
    PoseTracker, Result, SceneProvider, SceneRequest, SimEnvironment, StepOutcome, Task,
};
use glam::{Quat, Vec3};
use serde_json::{Value, json};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Everything the mock simulation was asked to do.
#[derive(Debug, Default)]
pub struct SimLog {
    pub resets: usize,
    pub forwards: usize,
    pub applied: Vec<Vec<f32>>,
    pub steps: Vec<Vec<f32>>,
    pub renders: usize,
    pub disabled: Vec<Vec<u32>>,
    pub video: Vec<String>,
}

pub struct MockSim {
    pub actuators: Vec<String>,
    /// Extra names resolving to fixed indices.
    pub aliases: HashMap<String, usize>,
    pub joints: Vec<String>,
    pub bodies: HashMap<String, Pose>,
    pub sites: HashMap<String, Pose>,
    pub dt: f32,
    pub time: f64,
    /// Report `terminated` after this many steps of one episode.
    pub terminate_after: Option<usize>,
    steps_this_episode: usize,
    pub log: Rc<RefCell<SimLog>>,
}

impl MockSim {
    pub fn new(actuators: &[&str]) -> Self {
        Self {
            actuators: actuators.iter().map(|s| s.to_string()).collect(),
            aliases: HashMap::new(),
            joints: Vec::new(),
            bodies: HashMap::from([("base_link".to_string(), Pose::IDENTITY)]),
            sites: HashMap::new(),
            dt: 0.02,
            time: 0.0,
            terminate_after: None,
            steps_this_episode: 0,
            log: Rc::new(RefCell::new(SimLog::default())),
        }
    }

    /// Dual-arm layout: two 2-motor arms and two single-actuator grippers.
    pub fn dual_arm() -> Self {
        let mut sim = Self::new(&[
            "M1_l", "M2_l", "M1_r", "M2_r", "gripper_l", "gripper_r",
        ]);
        sim.joints = vec!["J1_l".into(), "J2_l".into(), "J1_r".into(), "J2_r".into()];
        sim.sites.insert(
            "ee_l".to_string(),
            Pose::new(Vec3::new(0.4, 0.2, 1.0), Quat::IDENTITY),
        );
        sim.sites.insert(
            "ee_r".to_string(),
            Pose::new(Vec3::new(0.4, -0.2, 1.0), Quat::IDENTITY),
        );
        sim
    }

    pub fn with_base(mut self, pose: Pose) -> Self {
        self.bodies.insert("base_link".to_string(), pose);
        self
    }

    fn lookup<'a>(map: &'a HashMap<String, Pose>, name: &str) -> Result<&'a Pose> {
        map.get(name)
            .ok_or_else(|| CollectError::Collaborator(format!("unknown frame '{name}'")))
    }
}

impl SimEnvironment for MockSim {
    fn dt(&self) -> f32 {
        self.dt
    }

    fn actuator_count(&self) -> usize {
        self.actuators.len()
    }

    fn actuator_id(&self, name: &str) -> Option<usize> {
        self.aliases
            .get(name)
            .copied()
            .or_else(|| self.actuators.iter().position(|a| a == name))
    }

    fn joint_offsets(&self, joints: &[String]) -> Result<JointOffsets> {
        let mut offsets = JointOffsets::default();
        for joint in joints {
            let index = self
                .joints
                .iter()
                .position(|j| j == joint)
                .ok_or_else(|| CollectError::Collaborator(format!("unknown joint '{joint}'")))?;
            offsets.qpos.push(index);
            offsets.qvel.push(index);
        }
        Ok(offsets)
    }

    fn body_pose(&self, body: &str) -> Result<Pose> {
        Self::lookup(&self.bodies, body).copied()
    }

    fn site_pose(&self, site: &str) -> Result<Pose> {
        Self::lookup(&self.sites, site).copied()
    }

    fn site_pose_relative(&self, site: &str, body: &str) -> Result<Pose> {
        let body = self.body_pose(body)?;
        Ok(body.relative(&self.site_pose(site)?))
    }

    fn site_size(&self, _site: &str) -> Result<Vec3> {
        Ok(Vec3::splat(0.01))
    }

    fn reset(&mut self) -> Result<()> {
        self.log.borrow_mut().resets += 1;
        self.steps_this_episode = 0;
        Ok(())
    }

    fn disable_actuator_groups(&mut self, groups: &[u32]) -> Result<()> {
        self.log.borrow_mut().disabled.push(groups.to_vec());
        Ok(())
    }

    fn apply_ctrl(&mut self, ctrl: &[f32]) -> Result<()> {
        self.log.borrow_mut().applied.push(ctrl.to_vec());
        Ok(())
    }

    fn forward(&mut self) -> Result<()> {
        self.log.borrow_mut().forwards += 1;
        Ok(())
    }

    fn step(&mut self, ctrl: &[f32], _substeps: u32) -> Result<StepOutcome> {
        self.time += self.dt as f64;
        self.steps_this_episode += 1;
        self.log.borrow_mut().steps.push(ctrl.to_vec());
        Ok(StepOutcome {
            observation: Observation {
                time: self.time,
                streams: BTreeMap::from([("/ctrl".to_string(), ctrl.to_vec())]),
            },
            terminated: self
                .terminate_after
                .is_some_and(|n| self.steps_this_episode >= n),
            truncated: false,
        })
    }

    fn render(&mut self) -> Result<()> {
        self.log.borrow_mut().renders += 1;
        Ok(())
    }

    fn begin_video(&mut self, dir: &Path) -> Result<()> {
        self.log
            .borrow_mut()
            .video
            .push(format!("begin {}", dir.display()));
        Ok(())
    }

    fn stop_video(&mut self) -> Result<()> {
        self.log.borrow_mut().video.push("stop".to_string());
        Ok(())
    }
}

/// Pose solver stub: echoes the first `outputs` components of the goal.
pub struct EchoTracker {
    pub site: String,
    pub joints: Vec<String>,
    pub outputs: usize,
    pub offsets: Option<JointOffsets>,
    pub goals: Rc<RefCell<Vec<[f32; 6]>>>,
}

impl EchoTracker {
    pub fn new(site: &str, joints: &[&str], outputs: usize) -> Self {
        Self {
            site: site.to_string(),
            joints: joints.iter().map(|s| s.to_string()).collect(),
            outputs,
            offsets: None,
            goals: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

impl PoseTracker for EchoTracker {
    fn eef_site(&self) -> &str {
        &self.site
    }

    fn joint_names(&self) -> &[String] {
        &self.joints
    }

    fn bind_joint_offsets(&mut self, offsets: JointOffsets) {
        self.offsets = Some(offsets);
    }

    fn set_goal(&mut self, goal: [f32; 6]) {
        self.goals.borrow_mut().push(goal);
    }

    fn compute(&mut self, _env: &dyn SimEnvironment) -> Result<Vec<f32>> {
        let goal = self.goals.borrow().last().copied().unwrap_or([0.0; 6]);
        Ok(goal[..self.outputs].to_vec())
    }
}

/// Input source replaying a fixed script, then reporting nothing.
pub struct ScriptedInput {
    frames: VecDeque<InputState>,
}

impl ScriptedInput {
    pub fn new(frames: Vec<InputState>) -> Self {
        Self {
            frames: frames.into(),
        }
    }
}

impl InputSource for ScriptedInput {
    fn poll(&mut self) -> Result<Option<InputState>> {
        Ok(self.frames.pop_front())
    }
}

#[derive(Debug, Default)]
pub struct SceneLog {
    pub randomized: usize,
    pub restored: Vec<Value>,
    pub reshuffles: usize,
}

/// Scene provider that can set up a fixed number of scenes.
pub struct MockScene {
    pub remaining: usize,
    pub log: Rc<RefCell<SceneLog>>,
}

impl MockScene {
    pub fn new(remaining: usize) -> Self {
        Self {
            remaining,
            log: Rc::new(RefCell::new(SceneLog::default())),
        }
    }
}

impl SceneProvider for MockScene {
    fn setup(&mut self, _env: &mut dyn SimEnvironment, request: SceneRequest<'_>) -> Result<bool> {
        if self.remaining == 0 {
            return Ok(false);
        }
        self.remaining -= 1;
        match request {
            SceneRequest::Randomize => self.log.borrow_mut().randomized += 1,
            SceneRequest::Restore(info) => self.log.borrow_mut().restored.push(info.clone()),
        }
        Ok(true)
    }

    fn reshuffle(&mut self, _env: &mut dyn SimEnvironment) -> Result<()> {
        self.log.borrow_mut().reshuffles += 1;
        Ok(())
    }

    fn scene_info(&self) -> Value {
        json!({ "objects": ["cup"] })
    }
}

#[derive(Debug, Default)]
pub struct TaskLog {
    pub proposals: usize,
    pub received: Vec<Option<Value>>,
}

pub struct MockTask {
    /// Number of proposals that come back already solved before one is accepted.
    pub solved_proposals: usize,
    pub success: bool,
    pub log: Rc<RefCell<TaskLog>>,
}

impl MockTask {
    pub fn new(success: bool) -> Self {
        Self {
            solved_proposals: 0,
            success,
            log: Rc::new(RefCell::new(TaskLog::default())),
        }
    }
}

impl Task for MockTask {
    fn propose(
        &mut self,
        _env: &dyn SimEnvironment,
        _scene: Option<&dyn SceneProvider>,
        task_info: Option<&Value>,
    ) -> Result<bool> {
        let mut log = self.log.borrow_mut();
        log.proposals += 1;
        log.received.push(task_info.cloned());
        if self.solved_proposals > 0 {
            self.solved_proposals -= 1;
            return Ok(false);
        }
        Ok(true)
    }

    fn is_success(&self, _env: &dyn SimEnvironment) -> Result<bool> {
        Ok(self.success)
    }

    fn description(&self) -> String {
        "put the cup on the plate".to_string()
    }

    fn task_info(&self) -> Value {
        json!({ "object": "cup", "goal": "plate" })
    }
}

#[derive(Debug, Default)]
pub struct StorageLog {
    pub collected: Vec<Observation>,
    pub saved: Vec<EpisodeRecord>,
    pub cleared: usize,
}

/// In-memory storage recording every call.
pub struct MemoryStorage {
    pub log: Rc<RefCell<StorageLog>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            log: Rc::new(RefCell::new(StorageLog::default())),
        }
    }
}

impl DataStorage for MemoryStorage {
    fn collect(&mut self, observation: &Observation) -> Result<()> {
        self.log.borrow_mut().collected.push(observation.clone());
        Ok(())
    }

    fn save(&mut self, record: &EpisodeRecord) -> Result<PathBuf> {
        self.log.borrow_mut().saved.push(record.clone());
        Ok(PathBuf::from("memory"))
    }

    fn clear(&mut self) -> Result<()> {
        self.log.borrow_mut().cleared += 1;
        Ok(())
    }

    fn video_dir(&mut self) -> Result<PathBuf> {
        Ok(PathBuf::from("videos"))
    }
}

/// A dual-arm recording of `len` ticks with simple ramps on every stream.
pub fn ramp_unit(len: usize) -> dualarm_collect::DatasetUnit {
    use dualarm_collect::dataset::{EFFECTOR_MOTOR, END_ORIENTATION, END_POSITION};

    let mut unit = dualarm_collect::DatasetUnit {
        task_info: json!({ "object": "cup", "goal": "plate" }),
        scene_info: json!({ "objects": ["cup"] }),
        ..Default::default()
    };
    let position = (0..len)
        .map(|i| {
            let t = i as f32 * 0.01;
            vec![0.4 + t, 0.2, 1.0, 0.4 + t, -0.2, 1.0]
        })
        .collect();
    let orientation = (0..len)
        .map(|i| {
            let half = i as f32 * 0.02;
            let (s, c) = half.sin_cos();
            vec![0.0, 0.0, s, c, s, 0.0, 0.0, c]
        })
        .collect();
    let motor = (0..len)
        .map(|i| if i < len / 2 { vec![0.0, 0.0] } else { vec![1.0, 1.0] })
        .collect();
    unit.streams.insert(END_POSITION.to_string(), position);
    unit.streams.insert(END_ORIENTATION.to_string(), orientation);
    unit.streams.insert(EFFECTOR_MOTOR.to_string(), motor);
    unit
}
