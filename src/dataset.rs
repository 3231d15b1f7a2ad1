//! Dataset units and the JSON unit store.
//!
//! A dataset unit is one recorded episode: a set of named streams, each an ordered
//! sequence of fixed-width sample vectors, plus a task descriptor and a scene descriptor.
//! On disk a unit is a single JSON document whose keys are stream names; the two
//! descriptors are stored as JSON-encoded strings under the reserved keys
//! [`TASK_INFO_KEY`] and [`SCENE_INFO_KEY`].

use crate::env::{DataStorage, EpisodeRecord, Observation};
use crate::error::{CollectError, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

pub const JOINT_POSITION: &str = "/action/joint/position";
pub const EFFECTOR_POSITION: &str = "/action/effector/position";
pub const EFFECTOR_MOTOR: &str = "/action/effector/motor";
pub const END_POSITION: &str = "/action/end/position";
pub const END_ORIENTATION: &str = "/action/end/orientation";

pub const TASK_INFO_KEY: &str = "task_info";
pub const SCENE_INFO_KEY: &str = "scene_info";
/// Simulated timestamp stream appended by [`JsonUnitStore`].
pub const TIME_STEP_KEY: &str = "time_step";

/// An ordered sequence of fixed-width samples.
pub type Stream = Vec<Vec<f32>>;

/// One recorded episode.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DatasetUnit {
    pub streams: BTreeMap<String, Stream>,
    pub task_info: Value,
    pub scene_info: Value,
}

impl DatasetUnit {
    pub fn stream(&self, name: &str) -> Option<&Stream> {
        self.streams.get(name)
    }

    /// Decodes a unit from its JSON document form.
    pub fn from_json(doc: Value) -> Result<Self> {
        let Value::Object(map) = doc else {
            return Err(CollectError::Collaborator(
                "dataset unit must be a JSON object".to_string(),
            ));
        };

        let mut unit = DatasetUnit::default();
        for (key, value) in map {
            match key.as_str() {
                TASK_INFO_KEY => unit.task_info = decode_blob(&key, value)?,
                SCENE_INFO_KEY => unit.scene_info = decode_blob(&key, value)?,
                _ => {
                    let stream: Stream = serde_json::from_value(value)?;
                    unit.streams.insert(key, stream);
                }
            }
        }
        Ok(unit)
    }

    /// Encodes the unit into its JSON document form.
    pub fn to_json(&self) -> Result<Value> {
        let mut map = Map::new();
        for (name, stream) in &self.streams {
            map.insert(name.clone(), serde_json::to_value(stream)?);
        }
        map.insert(
            TASK_INFO_KEY.to_string(),
            Value::String(serde_json::to_string(&self.task_info)?),
        );
        map.insert(
            SCENE_INFO_KEY.to_string(),
            Value::String(serde_json::to_string(&self.scene_info)?),
        );
        Ok(Value::Object(map))
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(serde_json::from_str(&text)?)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_vec(&self.to_json()?)?)?;
        Ok(())
    }
}

fn decode_blob(key: &str, value: Value) -> Result<Value> {
    match value {
        Value::String(text) => Ok(serde_json::from_str(&text)?),
        other => Err(CollectError::Collaborator(format!(
            "'{key}' must be a JSON-encoded string, found {other}"
        ))),
    }
}

/// Loads dataset units for the replay device.
pub trait UnitLoader {
    fn load(&self, path: &Path) -> Result<DatasetUnit>;
}

/// Loader for units written by [`JsonUnitStore`].
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonUnitLoader;

impl UnitLoader for JsonUnitLoader {
    fn load(&self, path: &Path) -> Result<DatasetUnit> {
        DatasetUnit::read(path)
    }
}

/// Lists `<dir>/<sub>/<unit_file>` for every sub-directory of `dir`, sorted by name.
pub fn discover_units(dir: &Path, unit_file: &Path) -> Result<Vec<PathBuf>> {
    let mut units = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            units.push(entry.path().join(unit_file));
        }
    }
    units.sort();
    Ok(units)
}

/// File-backed storage writing one JSON unit per successful episode.
///
/// Each episode gets a fresh `<root>/<uuid>/` directory; the unit document lands at
/// `unit_file` and video capture at `video_dir` inside it.
pub struct JsonUnitStore {
    root: PathBuf,
    unit_file: PathBuf,
    video_dir: PathBuf,
    current_unit: PathBuf,
    buffer: BTreeMap<String, Stream>,
}

impl JsonUnitStore {
    pub fn new(
        root: impl Into<PathBuf>,
        unit_file: impl Into<PathBuf>,
        video_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        let current_unit = Self::next_unit_path(&root);
        Ok(Self {
            root,
            unit_file: unit_file.into(),
            video_dir: video_dir.into(),
            current_unit,
            buffer: BTreeMap::new(),
        })
    }

    fn next_unit_path(root: &Path) -> PathBuf {
        root.join(Uuid::new_v4().to_string())
    }

    pub fn current_unit_path(&self) -> &Path {
        &self.current_unit
    }

    /// Number of buffered ticks.
    pub fn buffered_len(&self) -> usize {
        self.buffer.get(TIME_STEP_KEY).map_or(0, Vec::len)
    }

    fn rotate(&mut self) {
        self.buffer.clear();
        self.current_unit = Self::next_unit_path(&self.root);
    }
}

impl DataStorage for JsonUnitStore {
    fn collect(&mut self, observation: &Observation) -> Result<()> {
        for (name, sample) in &observation.streams {
            self.buffer
                .entry(name.clone())
                .or_default()
                .push(sample.clone());
        }
        self.buffer
            .entry(TIME_STEP_KEY.to_string())
            .or_default()
            .push(vec![observation.time as f32]);
        Ok(())
    }

    fn save(&mut self, record: &EpisodeRecord) -> Result<PathBuf> {
        // The buffer is only dropped once the unit is on disk.
        let unit = DatasetUnit {
            streams: self.buffer.clone(),
            task_info: record.task_info.clone(),
            scene_info: record.scene_info.clone(),
        };
        let path = self.current_unit.join(&self.unit_file);
        info!(path = %path.display(), description = %record.description, "saving episode");
        unit.write(&path)?;
        self.rotate();
        Ok(path)
    }

    fn clear(&mut self) -> Result<()> {
        if self.current_unit.exists() {
            debug!(path = %self.current_unit.display(), "discarding episode directory");
            fs::remove_dir_all(&self.current_unit)?;
        }
        self.rotate();
        Ok(())
    }

    fn video_dir(&mut self) -> Result<PathBuf> {
        let dir = self.current_unit.join(&self.video_dir);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}
