//! Error type shared by every stage of the collection pipeline.
//!
//! Errors fall into two groups:
//!
//! - **Fatal**: [`CollectError::Configuration`], [`CollectError::RetryExhausted`],
//!   [`CollectError::UnboundKey`] and everything raised from a device or controller
//!   callback. These propagate out of [`CollectionManager::run`](crate::CollectionManager::run)
//!   and abort the run; a clearly aborted run is preferred over a silently corrupted
//!   demonstration.
//! - **Local**: [`CollectError::Interpolation`] is raised per stream by the augmentation
//!   engine and is caught by [`augment_unit`](crate::augment_unit), which logs it and keeps
//!   the unaugmented stream.
//!
//! Running out of recorded units is not an error at all: the replay device reports it
//! through `Ok(false)` from [`ReplayDevice::load_data`](crate::ReplayDevice::load_data).

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CollectError>;

#[derive(Error, Debug)]
pub enum CollectError {
    /// Required configuration is missing or internally inconsistent.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Task generation never produced a task that was not already solved.
    #[error(
        "task generation failed after {attempts} attempts; the generated task is always already successful, check the task configuration"
    )]
    RetryExhausted { attempts: u32 },

    /// An input key was bound to an event kind it cannot produce.
    #[error("input key {key} has no {event} handler")]
    UnboundKey { key: String, event: &'static str },

    /// A single stream could not be augmented.
    #[error("cannot interpolate stream '{stream}': {reason}")]
    Interpolation { stream: String, reason: String },

    /// A bound stream does not exist in the loaded dataset unit.
    #[error("dataset unit has no stream '{0}'")]
    MissingStream(String),

    /// A binding's slice range does not fit the recorded sample.
    #[error("slice {start}..{end} is out of range for stream '{stream}' of width {width}")]
    SliceOutOfRange {
        stream: String,
        start: usize,
        end: usize,
        width: usize,
    },

    /// A setter received a sample of the wrong width.
    #[error("{target} expects {expected} values, got {actual}")]
    SampleWidth {
        target: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Failure reported by an external collaborator (simulation, scene, task, storage).
    #[error("{0}")]
    Collaborator(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] Box<figment::Error>),
}

impl From<figment::Error> for CollectError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl CollectError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub(crate) fn interpolation(stream: &str, reason: impl Into<String>) -> Self {
        Self::Interpolation {
            stream: stream.to_string(),
            reason: reason.into(),
        }
    }
}
