//! Replay device: streams recorded dataset units through the same bindings a live
//! device would feed.

use crate::augment::{Interpolator, augment_unit};
use crate::dataset::{JsonUnitLoader, UnitLoader, discover_units};
use crate::error::{CollectError, Result};
use crate::live::ButtonSetter;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::{Span, debug, info, info_span, trace};

/// Receives the bound slice of one recorded sample.
pub type DatasetSetter = Box<dyn FnMut(&[f32]) -> Result<()>>;

struct DatasetBinding {
    range: Range<usize>,
    setter: DatasetSetter,
}

/// Feeds controllers from a queue of recorded units.
///
/// Units are consumed last-in first-out. Each tick [`ReplayDevice::update`] pops the
/// oldest remaining sample of every bound stream and hands each binding its slice. The
/// task-status setter receives one advance when a unit starts and one when any bound
/// stream runs dry, which walks an immediate task-status controller through
/// `NotStarted -> Running -> End` once per unit.
pub struct ReplayDevice {
    queue: Vec<PathBuf>,
    loader: Box<dyn UnitLoader>,
    interpolator: Option<Box<dyn Interpolator>>,
    rng: StdRng,
    current: Option<PathBuf>,
    streams: Option<BTreeMap<String, VecDeque<Vec<f32>>>>,
    task_info: Option<Value>,
    scene_info: Option<Value>,
    bindings: Vec<(String, Vec<DatasetBinding>)>,
    status_setter: Option<ButtonSetter>,
    pending_advances: u32,
    span: Span,
}

impl ReplayDevice {
    /// `queue` is popped from the back.
    pub fn new(queue: Vec<PathBuf>, loader: Box<dyn UnitLoader>) -> Self {
        Self {
            queue,
            loader,
            interpolator: None,
            rng: StdRng::from_entropy(),
            current: None,
            streams: None,
            task_info: None,
            scene_info: None,
            bindings: Vec::new(),
            status_setter: None,
            pending_advances: 0,
            span: info_span!("replay_device"),
        }
    }

    /// Queues every unit found under `dataset_dir`, read with [`JsonUnitLoader`].
    pub fn from_dataset_dir(dataset_dir: &Path, unit_file: &Path) -> Result<Self> {
        let queue = discover_units(dataset_dir, unit_file)?;
        info!(dir = %dataset_dir.display(), units = queue.len(), "discovered dataset units");
        Ok(Self::new(queue, Box::new(JsonUnitLoader)))
    }

    pub fn with_interpolator(mut self, interpolator: Box<dyn Interpolator>) -> Self {
        self.interpolator = Some(interpolator);
        self
    }

    /// Makes augmentation noise reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn remaining_units(&self) -> usize {
        self.queue.len()
    }

    /// Path of the most recently loaded unit.
    pub fn current_unit(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    /// Whether samples of the current unit are still pending.
    pub fn is_loaded(&self) -> bool {
        self.streams.is_some()
    }

    /// Samples left in `stream` for the current unit.
    pub fn remaining_samples(&self, stream: &str) -> Option<usize> {
        self.streams.as_ref()?.get(stream).map(VecDeque::len)
    }

    pub fn task_info(&self) -> Option<&Value> {
        self.task_info.as_ref()
    }

    pub fn scene_info(&self) -> Option<&Value> {
        self.scene_info.as_ref()
    }

    /// Binds `range` of every sample of `stream` to `setter`.
    ///
    /// Several bindings may share a stream; they are served in registration order.
    pub fn bind_dataset_event(
        &mut self,
        stream: impl Into<String>,
        range: Range<usize>,
        setter: DatasetSetter,
    ) -> Result<()> {
        let stream = stream.into();
        if range.start > range.end {
            return Err(CollectError::config(format!(
                "inverted slice {}..{} for stream '{stream}'",
                range.start, range.end
            )));
        }
        debug!(parent: &self.span, %stream, ?range, "bound dataset event");
        let binding = DatasetBinding { range, setter };
        match self.bindings.iter_mut().find(|(name, _)| *name == stream) {
            Some((_, list)) => list.push(binding),
            None => self.bindings.push((stream, vec![binding])),
        }
        Ok(())
    }

    pub fn bind_task_status_event(&mut self, setter: ButtonSetter) {
        self.status_setter = Some(setter);
    }

    /// Loads the next queued unit, augmenting it if an interpolator is configured.
    ///
    /// Returns `Ok(false)` once the queue is empty.
    pub fn load_data(&mut self) -> Result<bool> {
        let _enter = self.span.enter();
        let Some(path) = self.queue.pop() else {
            self.streams = None;
            info!("replay queue exhausted");
            return Ok(false);
        };

        let mut unit = self.loader.load(&path)?;
        if let Some(interpolator) = &self.interpolator {
            augment_unit(interpolator.as_ref(), &mut unit, &mut self.rng);
        }
        info!(
            path = %path.display(),
            streams = unit.streams.len(),
            remaining = self.queue.len(),
            "loaded dataset unit"
        );

        self.streams = Some(
            unit.streams
                .into_iter()
                .map(|(name, samples)| (name, VecDeque::from(samples)))
                .collect(),
        );
        self.task_info = Some(unit.task_info);
        self.scene_info = Some(unit.scene_info);
        self.current = Some(path);
        self.pending_advances = 1;
        Ok(true)
    }

    /// Dispatches one sample per bound stream.
    pub fn update(&mut self) -> Result<()> {
        let _enter = self.span.enter();
        let mut drained = false;

        match self.streams.as_mut() {
            Some(streams) => {
                for (name, bindings) in &mut self.bindings {
                    let series = streams
                        .get_mut(name.as_str())
                        .ok_or_else(|| CollectError::MissingStream(name.clone()))?;
                    if let Some(sample) = series.pop_front() {
                        for binding in bindings.iter_mut() {
                            let slice = sample.get(binding.range.clone()).ok_or_else(|| {
                                CollectError::SliceOutOfRange {
                                    stream: name.clone(),
                                    start: binding.range.start,
                                    end: binding.range.end,
                                    width: sample.len(),
                                }
                            })?;
                            (binding.setter)(slice)?;
                        }
                    }
                    if series.is_empty() {
                        drained = true;
                    }
                }
            }
            None => trace!("no dataset unit loaded"),
        }

        if drained {
            self.pending_advances += 1;
        }
        if self.pending_advances > 0 {
            if let Some(setter) = self.status_setter.as_mut() {
                for _ in 0..self.pending_advances {
                    setter(true)?;
                }
            }
            self.pending_advances = 0;
        }
        if drained {
            debug!("dataset unit drained");
            self.streams = None;
        }
        Ok(())
    }
}
