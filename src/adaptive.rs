//! Adaptive insertion: one synthetic sample per window of four.
//!
//! A stream is cut into non-overlapping windows of [`WINDOW`] samples. Inside each
//! window the synthetic sample goes right after the first element of the pair that moves
//! the most; samples past the last full window are copied through unchanged. The
//! position pass publishes its choices through the [`InsertionCache`] and the orientation
//! pass reuses them, so both streams gain their extra sample at the same instant.

use crate::augment::{
    Interpolator, InsertionCache, ORIENTATION_WIDTH, POSITION_WIDTH, StreamKind, arm_count,
    noise4, positive_noise, quat_at, uniform_width, unit_quat,
};
use crate::dataset::Stream;
use crate::error::{CollectError, Result};
use glam::{Quat, Vec4};
use rand::RngCore;

pub const WINDOW: usize = 4;

#[derive(Clone, Debug)]
pub struct AdaptiveInterpolator {
    noise: f32,
}

impl AdaptiveInterpolator {
    pub fn new(noise: f32) -> Self {
        Self { noise }
    }

    pub fn noise(&self) -> f32 {
        self.noise
    }

    /// Inserts `mean + std + U(0, noise)` per window and returns the chosen pair indices.
    fn linear(
        &self,
        samples: &[Vec<f32>],
        round: bool,
        rng: &mut dyn RngCore,
    ) -> (Stream, Vec<usize>) {
        let windows = samples.len() / WINDOW;
        let mut out = Vec::with_capacity(samples.len() + windows);
        let mut chosen = Vec::with_capacity(windows);

        for window in samples.chunks_exact(WINDOW) {
            let distances: Vec<f32> = window
                .windows(2)
                .map(|pair| euclidean(&pair[0], &pair[1]))
                .collect();
            let at = argmax(&distances);

            let mut synthetic = mean_plus_std(window);
            for value in &mut synthetic {
                *value += positive_noise(rng, self.noise);
                if round {
                    *value = value.round();
                }
            }

            splice(&mut out, window, at, synthetic);
            chosen.push(at);
        }
        out.extend_from_slice(&samples[windows * WINDOW..]);
        (out, chosen)
    }

    fn orientation(
        &self,
        path: &str,
        samples: &[Vec<f32>],
        arms: usize,
        cache: &InsertionCache,
        rng: &mut dyn RngCore,
    ) -> Result<Stream> {
        let windows = samples.len() / WINDOW;
        let mut out = Vec::with_capacity(samples.len() + windows);

        for (w, window) in samples.chunks_exact(WINDOW).enumerate() {
            let at = match cache.get(w) {
                Some(at) => at,
                None => argmax(&angular_steps(window, arms)),
            };

            let mut synthetic = Vec::with_capacity(arms * ORIENTATION_WIDTH);
            for arm in 0..arms {
                let quats: Vec<Quat> = window.iter().map(|s| quat_at(s, arm)).collect();
                let mean = unit_quat(path, hemisphere_mean(&quats))?;
                let noised = Vec4::from(mean) + noise4(rng, self.noise);
                synthetic.extend_from_slice(&unit_quat(path, noised)?.to_array());
            }

            splice(&mut out, window, at, synthetic);
        }
        out.extend_from_slice(&samples[windows * WINDOW..]);
        Ok(out)
    }
}

impl Interpolator for AdaptiveInterpolator {
    fn name(&self) -> &'static str {
        "adaptive"
    }

    fn interpolate(
        &self,
        path: &str,
        samples: &[Vec<f32>],
        cache: &mut InsertionCache,
        rng: &mut dyn RngCore,
    ) -> Result<Stream> {
        let kind = StreamKind::of(path).ok_or_else(|| {
            CollectError::interpolation(path, "no adaptive rule for this stream")
        })?;
        let width = uniform_width(path, samples)?;
        if samples.len() < WINDOW {
            return Ok(samples.to_vec());
        }

        match kind {
            StreamKind::Motor => Ok(self.linear(samples, true, rng).0),
            StreamKind::Position => {
                // Flattened arms share one insertion point per window.
                arm_count(path, width, POSITION_WIDTH)?;
                let (out, chosen) = self.linear(samples, false, rng);
                cache.store(chosen);
                Ok(out)
            }
            StreamKind::Orientation => {
                let arms = arm_count(path, width, ORIENTATION_WIDTH)?;
                self.orientation(path, samples, arms, cache, rng)
            }
        }
    }
}

fn splice(out: &mut Stream, window: &[Vec<f32>], at: usize, synthetic: Vec<f32>) {
    for (j, sample) in window.iter().enumerate() {
        out.push(sample.clone());
        if j == at {
            out.push(synthetic.clone());
        }
    }
}

/// Index of the first maximum.
fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (y - x) * (y - x))
        .sum::<f32>()
        .sqrt()
}

/// Column-wise mean plus population standard deviation.
fn mean_plus_std(window: &[Vec<f32>]) -> Vec<f32> {
    let n = window.len() as f64;
    let width = window[0].len();
    (0..width)
        .map(|col| {
            let mean = window.iter().map(|s| s[col] as f64).sum::<f64>() / n;
            let var = window
                .iter()
                .map(|s| (s[col] as f64 - mean).powi(2))
                .sum::<f64>()
                / n;
            (mean + var.sqrt()) as f32
        })
        .collect()
}

/// Angle between consecutive samples, summed over arms.
fn angular_steps(window: &[Vec<f32>], arms: usize) -> Vec<f32> {
    window
        .windows(2)
        .map(|pair| {
            (0..arms)
                .map(|arm| {
                    let d = quat_at(&pair[0], arm).dot(quat_at(&pair[1], arm));
                    d.abs().min(1.0).acos()
                })
                .sum()
        })
        .collect()
}

/// Component mean after flipping every quaternion into the first one's hemisphere.
fn hemisphere_mean(quats: &[Quat]) -> Vec4 {
    let reference = quats[0];
    let sum = quats.iter().fold(Vec4::ZERO, |acc, &q| {
        if q.dot(reference) < 0.0 {
            acc - Vec4::from(q)
        } else {
            acc + Vec4::from(q)
        }
    });
    sum / quats.len() as f32
}
