//! The controller contract shared by every actuator-driving controller.
//!
//! A controller owns a set of actuators, named in configuration. Once per episode
//! [`Controller::init_index_mapping`] resolves those names to command-vector indices;
//! once per tick [`Controller::run`] returns `(index, value)` pairs that the manager
//! merges into the command vector.

use crate::env::SimEnvironment;
use crate::error::{CollectError, Result};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Single-threaded shared handle.
///
/// Controllers are owned jointly by the manager, which runs them, and by device
/// bindings, which feed them.
pub type Shared<T> = Rc<RefCell<T>>;

pub fn shared<T>(value: T) -> Shared<T> {
    Rc::new(RefCell::new(value))
}

/// One actuator target: `(command-vector index, value)`.
pub type ActuatorCommand = (usize, f32);

pub trait Controller {
    /// Short label used in logs.
    fn label(&self) -> &str;

    /// Resolves configured actuator names to command-vector indices.
    ///
    /// The mapping is a bijection: duplicated names or two names resolving to the same
    /// index are configuration errors.
    fn init_index_mapping(&mut self, env: &dyn SimEnvironment) -> Result<()>;

    /// Command-vector indices owned by this controller, in configured order.
    fn indices(&self) -> &[usize];

    /// Initial values for the indices this controller owns.
    fn defaults(&self) -> Vec<ActuatorCommand>;

    /// Commands for the current tick.
    fn run(&mut self, env: &dyn SimEnvironment) -> Result<Vec<ActuatorCommand>>;
}

/// Configured actuator names with their resolved indices and initial values.
#[derive(Clone, Debug, Default)]
pub struct ActuatorMapping {
    names: Vec<String>,
    init: HashMap<String, f32>,
    indices: Vec<usize>,
}

impl ActuatorMapping {
    pub fn new(names: Vec<String>, init: HashMap<String, f32>) -> Self {
        Self {
            names,
            init,
            indices: Vec::new(),
        }
    }

    /// Pairs names with initial values positionally.
    pub fn from_lists(names: &[String], init: &[f32]) -> Result<Self> {
        if !init.is_empty() && init.len() != names.len() {
            return Err(CollectError::config(format!(
                "{} actuator names but {} initial values",
                names.len(),
                init.len()
            )));
        }
        let init = names.iter().cloned().zip(init.iter().copied()).collect();
        Ok(Self::new(names.to_vec(), init))
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Resolves every name against the environment and checks the result is a bijection.
    pub fn resolve(&mut self, env: &dyn SimEnvironment) -> Result<&[usize]> {
        let mut seen_names = HashSet::new();
        let mut seen_indices = HashMap::new();
        let mut indices = Vec::with_capacity(self.names.len());
        let count = env.actuator_count();

        for name in &self.names {
            if !seen_names.insert(name.as_str()) {
                return Err(CollectError::config(format!(
                    "actuator '{name}' is configured twice"
                )));
            }
            let index = env
                .actuator_id(name)
                .ok_or_else(|| CollectError::config(format!("unknown actuator '{name}'")))?;
            if index >= count {
                return Err(CollectError::config(format!(
                    "actuator '{name}' resolved to index {index}, beyond {count} actuators"
                )));
            }
            if let Some(other) = seen_indices.insert(index, name.as_str()) {
                return Err(CollectError::config(format!(
                    "actuators '{other}' and '{name}' both resolve to index {index}"
                )));
            }
            indices.push(index);
        }

        self.indices = indices;
        Ok(&self.indices)
    }

    /// Initial values for resolved indices; names without an initial value are skipped.
    pub fn defaults(&self) -> Vec<ActuatorCommand> {
        self.names
            .iter()
            .zip(&self.indices)
            .filter_map(|(name, &index)| self.init.get(name).map(|&v| (index, v)))
            .collect()
    }

    /// Pairs resolved indices with one value each.
    pub fn zip_values(&self, label: &'static str, values: &[f32]) -> Result<Vec<ActuatorCommand>> {
        if values.len() != self.indices.len() {
            return Err(CollectError::SampleWidth {
                target: label,
                expected: self.indices.len(),
                actual: values.len(),
            });
        }
        Ok(self.indices.iter().copied().zip(values.iter().copied()).collect())
    }
}

/// Merges controller output into the command vector; later writes win.
pub fn merge_commands(ctrl: &mut [f32], commands: &[ActuatorCommand]) {
    for &(index, value) in commands {
        if let Some(slot) = ctrl.get_mut(index) {
            *slot = value;
        }
    }
}

/// Reports indices claimed by more than one controller as `(index, [labels])`.
pub fn overlapping_indices(owners: &[(String, Vec<usize>)]) -> Vec<(usize, Vec<String>)> {
    let mut by_index: HashMap<usize, Vec<String>> = HashMap::new();
    for (label, indices) in owners {
        for &index in indices {
            by_index.entry(index).or_default().push(label.clone());
        }
    }
    let mut overlaps: Vec<_> = by_index
        .into_iter()
        .filter(|(_, labels)| labels.len() > 1)
        .collect();
    overlaps.sort_by_key(|(index, _)| *index);
    overlaps
}
