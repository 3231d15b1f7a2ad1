//! Trajectory augmentation.
//!
//! An [`Interpolator`] turns a recorded stream into a denser, noised stream. Two
//! strategies exist: [`AdaptiveInterpolator`] inserts one synthetic sample per window of
//! four, [`SmoothInterpolator`] resamples the whole stream at a fixed factor.
//!
//! Streams of one unit are processed in a fixed order (motor, position, orientation) so
//! that the position pass can publish its insertion points through an [`InsertionCache`]
//! before the orientation pass needs them.

use crate::adaptive::AdaptiveInterpolator;
use crate::config::{AugmentationConfig, AugmentationStrategy};
use crate::dataset::{DatasetUnit, EFFECTOR_MOTOR, END_ORIENTATION, END_POSITION, Stream};
use crate::error::{CollectError, Result};
use crate::smooth::SmoothInterpolator;
use glam::{Quat, Vec4};
use rand::{Rng, RngCore};
use tracing::{debug, info, warn};

/// Streams augmented by default, in processing order.
pub const AUGMENTED_STREAMS: [&str; 3] = [EFFECTOR_MOTOR, END_POSITION, END_ORIENTATION];

/// Flat sample width of one arm's position.
pub const POSITION_WIDTH: usize = 3;
/// Flat sample width of one arm's `(x, y, z, w)` orientation.
pub const ORIENTATION_WIDTH: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamKind {
    /// Discrete gripper commands; synthetic values are rounded.
    Motor,
    /// Continuous flattened positions, three values per arm.
    Position,
    /// Flattened `(x, y, z, w)` quaternions, four values per arm.
    Orientation,
}

impl StreamKind {
    pub fn of(path: &str) -> Option<Self> {
        match path {
            EFFECTOR_MOTOR => Some(Self::Motor),
            END_POSITION => Some(Self::Position),
            END_ORIENTATION => Some(Self::Orientation),
            _ => None,
        }
    }
}

/// Per-window insertion points published by a position pass.
///
/// Owned by a single [`augment_unit`] call, so indices never leak between units.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InsertionCache {
    indices: Option<Vec<usize>>,
}

impl InsertionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&mut self, indices: Vec<usize>) {
        self.indices = Some(indices);
    }

    /// Pair index chosen for `window`, if a position pass covered it.
    pub fn get(&self, window: usize) -> Option<usize> {
        self.indices.as_ref().and_then(|v| v.get(window).copied())
    }

    pub fn indices(&self) -> Option<&[usize]> {
        self.indices.as_deref()
    }

    pub fn clear(&mut self) {
        self.indices = None;
    }
}

pub trait Interpolator {
    fn name(&self) -> &'static str;

    /// Streams this strategy augments, in processing order.
    fn stream_paths(&self) -> &[&'static str] {
        &AUGMENTED_STREAMS
    }

    /// Returns the augmented version of `samples`, recorded under `path`.
    fn interpolate(
        &self,
        path: &str,
        samples: &[Vec<f32>],
        cache: &mut InsertionCache,
        rng: &mut dyn RngCore,
    ) -> Result<Stream>;
}

/// Builds the strategy selected in configuration.
pub fn build_interpolator(config: &AugmentationConfig) -> Box<dyn Interpolator> {
    match config.strategy {
        AugmentationStrategy::Adaptive => Box::new(AdaptiveInterpolator::new(config.noise)),
        AugmentationStrategy::Smooth => {
            Box::new(SmoothInterpolator::new(config.noise, config.factor))
        }
    }
}

/// Augments every stream `interpolator` declares, in place.
///
/// A stream that fails to augment is logged and left untouched; the rest of the unit is
/// still processed. Returns the number of streams that were replaced.
pub fn augment_unit(
    interpolator: &dyn Interpolator,
    unit: &mut DatasetUnit,
    rng: &mut dyn RngCore,
) -> usize {
    let mut cache = InsertionCache::new();
    let mut augmented = 0;

    for &path in interpolator.stream_paths() {
        let Some(samples) = unit.streams.get(path) else {
            debug!(stream = path, "stream not recorded, skipping augmentation");
            continue;
        };
        match interpolator.interpolate(path, samples, &mut cache, rng) {
            Ok(stream) => {
                debug!(
                    stream = path,
                    before = samples.len(),
                    after = stream.len(),
                    "stream augmented"
                );
                unit.streams.insert(path.to_string(), stream);
                augmented += 1;
            }
            Err(err) => warn!(stream = path, %err, "augmentation failed, keeping recorded stream"),
        }
    }

    info!(
        strategy = interpolator.name(),
        streams = augmented,
        "augmentation pass complete"
    );
    augmented
}

/// Common width of every sample in `samples`.
pub(crate) fn uniform_width(path: &str, samples: &[Vec<f32>]) -> Result<usize> {
    let Some(first) = samples.first() else {
        return Ok(0);
    };
    let width = first.len();
    if width == 0 {
        return Err(CollectError::interpolation(path, "samples are empty"));
    }
    if let Some((row, sample)) = samples.iter().enumerate().find(|(_, s)| s.len() != width) {
        return Err(CollectError::interpolation(
            path,
            format!("sample {row} has width {}, expected {width}", sample.len()),
        ));
    }
    Ok(width)
}

/// Number of `block`-wide sub-vectors packed in a `width`-wide sample.
pub(crate) fn arm_count(path: &str, width: usize, block: usize) -> Result<usize> {
    if width % block != 0 {
        return Err(CollectError::interpolation(
            path,
            format!("width {width} is not a multiple of {block}"),
        ));
    }
    Ok(width / block)
}

/// Uniform sample in `[0, bound)`; zero when `bound` is not positive.
pub(crate) fn positive_noise(rng: &mut dyn RngCore, bound: f32) -> f32 {
    if bound > 0.0 {
        rng.gen_range(0.0..bound)
    } else {
        0.0
    }
}

/// Uniform sample in `[-bound, bound]`; zero when `bound` is not positive.
pub(crate) fn symmetric_noise(rng: &mut dyn RngCore, bound: f32) -> f32 {
    if bound > 0.0 {
        rng.gen_range(-bound..=bound)
    } else {
        0.0
    }
}

/// The `arm`-th quaternion of a flat `(x, y, z, w)` orientation sample.
pub(crate) fn quat_at(sample: &[f32], arm: usize) -> Quat {
    Quat::from_slice(&sample[arm * ORIENTATION_WIDTH..])
}

/// Normalizes `v` into a rotation, failing on a degenerate norm.
pub(crate) fn unit_quat(path: &str, v: Vec4) -> Result<Quat> {
    let length = v.length();
    if !length.is_finite() || length < 1e-9 {
        return Err(CollectError::interpolation(
            path,
            "orientation sample has near-zero norm",
        ));
    }
    Ok(Quat::from_vec4(v / length))
}

/// Four independent draws of [`symmetric_noise`].
pub(crate) fn noise4(rng: &mut dyn RngCore, bound: f32) -> Vec4 {
    Vec4::new(
        symmetric_noise(rng, bound),
        symmetric_noise(rng, bound),
        symmetric_noise(rng, bound),
        symmetric_noise(rng, bound),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_is_window_indexed() {
        let mut cache = InsertionCache::new();
        assert_eq!(cache.get(0), None);
        cache.store(vec![2, 0]);
        assert_eq!(cache.get(0), Some(2));
        assert_eq!(cache.get(1), Some(0));
        assert_eq!(cache.get(2), None);
        cache.clear();
        assert!(cache.indices().is_none());
    }

    #[test]
    fn ragged_stream_is_rejected() {
        let err = uniform_width("/s", &[vec![1.0, 2.0], vec![1.0]]).unwrap_err();
        assert!(matches!(err, CollectError::Interpolation { .. }));
    }

    #[test]
    fn arm_count_requires_whole_blocks() {
        assert_eq!(arm_count("/s", 8, 4).unwrap(), 2);
        assert!(arm_count("/s", 7, 4).is_err());
    }

    #[test]
    fn quaternions_are_read_xyzw_per_arm() {
        let sample = [0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0];
        assert_eq!(quat_at(&sample, 0), Quat::IDENTITY);
        assert_eq!(quat_at(&sample, 1), Quat::from_xyzw(1.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn degenerate_quaternion_is_rejected() {
        let q = unit_quat("/s", Vec4::new(0.0, 0.0, 3.0, 4.0)).unwrap();
        assert!((q.length() - 1.0).abs() < 1e-6);
        assert!((q.z - 0.6).abs() < 1e-6);
        assert!(unit_quat("/s", Vec4::ZERO).is_err());
        assert!(unit_quat("/s", Vec4::splat(f32::NAN)).is_err());
    }

    #[test]
    fn stream_kinds() {
        assert_eq!(StreamKind::of(EFFECTOR_MOTOR), Some(StreamKind::Motor));
        assert_eq!(StreamKind::of(END_ORIENTATION), Some(StreamKind::Orientation));
        assert_eq!(StreamKind::of("/action/joint/position"), None);
    }
}
