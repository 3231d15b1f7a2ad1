//! Episode orchestration.
//!
//! [`CollectionManager::run`] loops `SceneSetup -> Run -> Outcome` until the scene
//! collaborator gives up, the replay queue runs dry or the stop handle is raised.
//!
//! Each tick runs in a fixed order: device poll, controller evaluation, command merge,
//! physics step, status query, then storage and video side effects. The only scheduling
//! point is the pacing sleep at the end of the tick, and a stop request is only honoured
//! between ticks.

use crate::config::{CollectionConfig, CollectionMode, TimingConfig};
use crate::controller::{Controller, Shared, merge_commands, overlapping_indices};
use crate::device::Device;
use crate::env::{
    DataStorage, EmptyTask, EpisodeRecord, SceneProvider, SceneRequest, SimEnvironment, Task,
    instantiate_task,
};
use crate::error::{CollectError, Result};
use crate::task_status::{TaskStatus, TaskStatusController};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{Span, debug, error, info, info_span, warn};

/// Why [`CollectionManager::run`] returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunEnd {
    /// The scene collaborator could not produce another scene.
    SceneUnavailable,
    /// Every queued dataset unit has been replayed.
    ReplayExhausted,
    /// The stop handle was raised.
    Stopped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunSummary {
    /// Episodes that reached an outcome.
    pub episodes: usize,
    pub successes: usize,
    pub failures: usize,
    pub end: RunEnd,
}

enum SceneSetup {
    Ready,
    Unavailable,
    ReplayExhausted,
}

enum Outcome {
    Success,
    Failure,
    Stopped,
}

pub struct CollectionManager {
    env: Box<dyn SimEnvironment>,
    mode: CollectionMode,
    device: Option<Device>,
    controllers: Vec<Shared<dyn Controller>>,
    task_status: Option<Shared<TaskStatusController>>,
    task: Box<dyn Task>,
    scene: Option<Box<dyn SceneProvider>>,
    storage: Option<Box<dyn DataStorage>>,
    ctrl: Vec<f32>,
    disabled_groups: Vec<u32>,
    save_video: bool,
    recording_video: bool,
    frame_skip: u32,
    tick_period: Duration,
    stop: Arc<AtomicBool>,
    span: Span,
}

impl CollectionManager {
    pub fn new(env: Box<dyn SimEnvironment>, timing: &TimingConfig) -> Result<Self> {
        let tick_period = timing.tick_period()?;
        let ctrl = vec![0.0; env.actuator_count()];
        Ok(Self {
            env,
            mode: CollectionMode::Teleoperation,
            device: None,
            controllers: Vec::new(),
            task_status: None,
            task: Box::new(EmptyTask),
            scene: None,
            storage: None,
            ctrl,
            disabled_groups: Vec::new(),
            save_video: false,
            recording_video: false,
            frame_skip: timing.frame_skip.max(1),
            tick_period,
            stop: Arc::new(AtomicBool::new(false)),
            span: info_span!("collection_manager"),
        })
    }

    /// Manager with mode, timing, video and actuator-group settings taken from `config`.
    pub fn from_config(env: Box<dyn SimEnvironment>, config: &CollectionConfig) -> Result<Self> {
        let mut manager = Self::new(env, &config.timing)?;
        manager.set_mode(config.mode);
        manager.set_save_video(config.save_video);
        manager.set_disabled_actuator_groups(config.disabled_actuator_groups.clone());
        Ok(manager)
    }

    pub fn env(&self) -> &dyn SimEnvironment {
        self.env.as_ref()
    }

    pub fn mode(&self) -> CollectionMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: CollectionMode) {
        self.mode = mode;
    }

    pub fn set_device(&mut self, device: Device) {
        self.device = Some(device);
    }

    pub fn device_mut(&mut self) -> Option<&mut Device> {
        self.device.as_mut()
    }

    /// Registers a controller. On shared indices, later controllers override earlier ones.
    pub fn add_controller(&mut self, controller: Shared<dyn Controller>) {
        self.controllers.push(controller);
    }

    pub fn set_task_status_controller(&mut self, controller: Shared<TaskStatusController>) {
        self.task_status = Some(controller);
    }

    pub fn set_task(&mut self, task: Box<dyn Task>) {
        self.task = task;
    }

    pub fn set_scene(&mut self, scene: Box<dyn SceneProvider>) {
        self.scene = Some(scene);
    }

    pub fn set_storage(&mut self, storage: Box<dyn DataStorage>) {
        self.storage = Some(storage);
    }

    pub fn set_save_video(&mut self, save_video: bool) {
        self.save_video = save_video;
    }

    pub fn set_disabled_actuator_groups(&mut self, groups: Vec<u32>) {
        self.disabled_groups = groups;
    }

    /// Raising the returned flag ends the run after the current tick.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// The merged command vector of the last tick.
    pub fn ctrl(&self) -> &[f32] {
        &self.ctrl
    }

    /// Runs episodes until the scene or replay source is exhausted or a stop is requested.
    ///
    /// Any error raised by a device, controller or collaborator aborts the run. Active
    /// video capture is released on every exit path.
    pub fn run(&mut self) -> Result<RunSummary> {
        let span = self.span.clone();
        let _enter = span.enter();

        if self.mode == CollectionMode::Augmentation
            && !matches!(self.device, Some(Device::Replay(_)))
        {
            return Err(CollectError::config(
                "augmentation mode requires a replay device",
            ));
        }
        info!(mode = ?self.mode, controllers = self.controllers.len(), "collection started");

        let mut summary = RunSummary {
            episodes: 0,
            successes: 0,
            failures: 0,
            end: RunEnd::Stopped,
        };
        let result = self.run_loop(&mut summary);
        let released = self.release_video();

        match result {
            Ok(end) => {
                released?;
                summary.end = end;
                info!(
                    episodes = summary.episodes,
                    successes = summary.successes,
                    failures = summary.failures,
                    end = ?summary.end,
                    "collection finished"
                );
                Ok(summary)
            }
            Err(err) => {
                if let Err(release_err) = released {
                    warn!(%release_err, "failed to stop video capture while aborting");
                }
                error!(%err, "collection aborted");
                Err(err)
            }
        }
    }

    fn run_loop(&mut self, summary: &mut RunSummary) -> Result<RunEnd> {
        self.env.disable_actuator_groups(&self.disabled_groups)?;

        loop {
            if self.stop.load(Ordering::SeqCst) {
                return Ok(RunEnd::Stopped);
            }

            self.env.reset()?;
            match self.setup_scene()? {
                SceneSetup::Ready => {}
                SceneSetup::Unavailable => {
                    info!("no further scene available");
                    return Ok(RunEnd::SceneUnavailable);
                }
                SceneSetup::ReplayExhausted => {
                    info!("augmentation end");
                    return Ok(RunEnd::ReplayExhausted);
                }
            }

            match self.run_episode()? {
                Outcome::Success => {
                    summary.episodes += 1;
                    summary.successes += 1;
                    info!("task success");
                    self.persist()?;
                }
                Outcome::Failure => {
                    summary.episodes += 1;
                    summary.failures += 1;
                    info!("task failed");
                    if let Some(storage) = self.storage.as_deref_mut() {
                        storage.clear()?;
                    }
                }
                Outcome::Stopped => {
                    info!("stop requested, discarding partial episode");
                    if let Some(storage) = self.storage.as_deref_mut() {
                        storage.clear()?;
                    }
                    return Ok(RunEnd::Stopped);
                }
            }
        }
    }

    fn setup_scene(&mut self) -> Result<SceneSetup> {
        match self.mode {
            CollectionMode::Teleoperation => {
                if let Some(scene) = self.scene.as_deref_mut()
                    && !scene.setup(self.env.as_mut(), SceneRequest::Randomize)?
                {
                    return Ok(SceneSetup::Unavailable);
                }
                instantiate_task(
                    self.task.as_mut(),
                    self.env.as_mut(),
                    self.scene.as_deref_mut(),
                    None,
                )?;
            }
            CollectionMode::Augmentation => {
                let replay = self
                    .device
                    .as_mut()
                    .and_then(Device::as_replay_mut)
                    .ok_or_else(|| {
                        CollectError::config("augmentation mode requires a replay device")
                    })?;
                if !replay.load_data()? {
                    return Ok(SceneSetup::ReplayExhausted);
                }
                let scene_info = replay.scene_info().cloned().unwrap_or(Value::Null);
                let task_info = replay.task_info().cloned();

                if let Some(scene) = self.scene.as_deref_mut()
                    && !scene.setup(self.env.as_mut(), SceneRequest::Restore(&scene_info))?
                {
                    return Ok(SceneSetup::Unavailable);
                }
                instantiate_task(
                    self.task.as_mut(),
                    self.env.as_mut(),
                    self.scene.as_deref_mut(),
                    task_info.as_ref(),
                )?;
            }
        }

        self.env.disable_actuator_groups(&self.disabled_groups)?;
        info!(description = %self.task.description(), "scene ready");
        Ok(SceneSetup::Ready)
    }

    /// Resolves every controller's indices and writes their defaults into a fresh
    /// command vector.
    fn init_ctrl(&mut self) -> Result<()> {
        self.ctrl = vec![0.0; self.env.actuator_count()];
        let mut owners = Vec::with_capacity(self.controllers.len());

        for controller in &self.controllers {
            let mut controller = controller.borrow_mut();
            controller.init_index_mapping(self.env.as_ref())?;
            merge_commands(&mut self.ctrl, &controller.defaults());
            owners.push((controller.label().to_string(), controller.indices().to_vec()));
        }

        for (index, labels) in overlapping_indices(&owners) {
            warn!(index, controllers = ?labels, "actuator claimed by several controllers, last one wins");
        }
        Ok(())
    }

    fn run_controllers(&mut self) -> Result<()> {
        if let Some(device) = self.device.as_mut() {
            device.update()?;
        }
        for controller in &self.controllers {
            let commands = controller.borrow_mut().run(self.env.as_ref())?;
            merge_commands(&mut self.ctrl, &commands);
        }
        Ok(())
    }

    fn run_episode(&mut self) -> Result<Outcome> {
        self.init_ctrl()?;
        self.env.apply_ctrl(&self.ctrl)?;
        self.env.forward()?;
        if let Some(status) = &self.task_status {
            status.borrow_mut().reset();
        }

        let mut ticks: u64 = 0;
        loop {
            if self.stop.load(Ordering::SeqCst) {
                self.release_video()?;
                return Ok(Outcome::Stopped);
            }
            let started = Instant::now();

            self.run_controllers()?;
            let step = self.env.step(&self.ctrl, self.frame_skip)?;
            self.env.render()?;
            ticks += 1;

            let status = self.task_status.as_ref().map(|s| s.borrow().status());
            if status == Some(TaskStatus::Running) {
                if let Some(storage) = self.storage.as_deref_mut() {
                    storage.collect(&step.observation)?;
                }
                if self.save_video && !self.recording_video {
                    self.start_video()?;
                }
            }
            if status == Some(TaskStatus::End) || step.terminated || step.truncated {
                self.release_video()?;
                info!(ticks, terminated = step.terminated, truncated = step.truncated, "task end");
                return Ok(if self.task.is_success(self.env.as_ref())? {
                    Outcome::Success
                } else {
                    Outcome::Failure
                });
            }

            let elapsed = started.elapsed();
            if elapsed < self.tick_period {
                std::thread::sleep(self.tick_period - elapsed);
            }
        }
    }

    fn persist(&mut self) -> Result<()> {
        let Some(storage) = self.storage.as_deref_mut() else {
            return Ok(());
        };
        let scene_info = match (&self.scene, self.device.as_ref()) {
            (Some(scene), _) => scene.scene_info(),
            (None, Some(Device::Replay(replay))) => {
                replay.scene_info().cloned().unwrap_or(Value::Null)
            }
            (None, _) => Value::Null,
        };
        let record = EpisodeRecord {
            task_info: self.task.task_info(),
            scene_info,
            description: self.task.description(),
        };
        let path = storage.save(&record)?;
        debug!(path = %path.display(), "episode persisted");
        Ok(())
    }

    fn start_video(&mut self) -> Result<()> {
        let Some(storage) = self.storage.as_deref_mut() else {
            return Ok(());
        };
        let dir = storage.video_dir()?;
        self.env.begin_video(&dir)?;
        self.recording_video = true;
        info!(dir = %dir.display(), "video capture started");
        Ok(())
    }

    fn release_video(&mut self) -> Result<()> {
        if !self.recording_video {
            return Ok(());
        }
        self.recording_video = false;
        self.env.stop_video()?;
        info!("video capture stopped");
        Ok(())
    }
}
