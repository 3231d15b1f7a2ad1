//! Smooth resampling at a fixed density factor.
//!
//! Linear streams get one not-a-knot cubic spline per scalar column, sampled `factor` times
//! per original interval. Orientation streams are walked pair by pair and every arm's
//! quaternion is filled in with `factor - 1` spherical interpolations. Both produce
//! `(N - 1) * factor + 1` samples for an `N`-sample input and pass the original samples
//! through at every `factor`-th index.

use crate::augment::{
    Interpolator, InsertionCache, ORIENTATION_WIDTH, POSITION_WIDTH, StreamKind, arm_count,
    noise4, quat_at, symmetric_noise, uniform_width, unit_quat,
};
use crate::dataset::Stream;
use crate::error::{CollectError, Result};
use glam::{Quat, Vec4};
use rand::RngCore;

/// Below this `sin(theta)` two quaternions are treated as coincident.
const SLERP_EPSILON: f32 = 1e-6;

#[derive(Clone, Debug)]
pub struct SmoothInterpolator {
    noise: f32,
    factor: usize,
}

impl SmoothInterpolator {
    /// `factor` is clamped to at least 1.
    pub fn new(noise: f32, factor: usize) -> Self {
        Self {
            noise,
            factor: factor.max(1),
        }
    }

    pub fn factor(&self) -> usize {
        self.factor
    }

    fn linear(
        &self,
        samples: &[Vec<f32>],
        width: usize,
        round: bool,
        rng: &mut dyn RngCore,
    ) -> Stream {
        let n = samples.len();
        let total = (n - 1) * self.factor + 1;
        let mut out = vec![vec![0.0f32; width]; total];

        for col in 0..width {
            let ys: Vec<f64> = samples.iter().map(|s| s[col] as f64).collect();
            let spline = CubicSpline::fit(&ys);
            for (k, row) in out.iter_mut().enumerate() {
                let (seg, s) = if k == total - 1 {
                    (n - 2, 1.0)
                } else {
                    (k / self.factor, (k % self.factor) as f64 / self.factor as f64)
                };
                let mut value = spline.eval(seg, s) as f32 + symmetric_noise(rng, self.noise);
                if round {
                    value = value.round();
                }
                row[col] = value;
            }
        }
        out
    }

    fn orientation(
        &self,
        path: &str,
        samples: &[Vec<f32>],
        arms: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Stream> {
        let mut out = Vec::with_capacity((samples.len() - 1) * self.factor + 1);
        out.push(samples[0].clone());

        for pair in samples.windows(2) {
            for j in 1..self.factor {
                let t = j as f32 / self.factor as f32;
                let mut row = Vec::with_capacity(arms * ORIENTATION_WIDTH);
                for arm in 0..arms {
                    let q = slerp(quat_at(&pair[0], arm), quat_at(&pair[1], arm), t);
                    let noised = Vec4::from(q) + noise4(rng, self.noise);
                    row.extend_from_slice(&unit_quat(path, noised)?.to_array());
                }
                out.push(row);
            }
            out.push(pair[1].clone());
        }
        Ok(out)
    }
}

impl Interpolator for SmoothInterpolator {
    fn name(&self) -> &'static str {
        "smooth"
    }

    fn interpolate(
        &self,
        path: &str,
        samples: &[Vec<f32>],
        _cache: &mut InsertionCache,
        rng: &mut dyn RngCore,
    ) -> Result<Stream> {
        let kind = StreamKind::of(path)
            .ok_or_else(|| CollectError::interpolation(path, "no smoothing rule for this stream"))?;
        let width = uniform_width(path, samples)?;
        if samples.len() < 2 {
            return Ok(samples.to_vec());
        }

        match kind {
            StreamKind::Motor => Ok(self.linear(samples, width, true, rng)),
            StreamKind::Position => {
                arm_count(path, width, POSITION_WIDTH)?;
                Ok(self.linear(samples, width, false, rng))
            }
            StreamKind::Orientation => {
                let arms = arm_count(path, width, ORIENTATION_WIDTH)?;
                self.orientation(path, samples, arms, rng)
            }
        }
    }
}

/// Spherical interpolation along the shorter arc.
///
/// Returns `q1` unchanged at `t <= 0`, `q2` unchanged at `t >= 1`, and `q1` when the two
/// are too close for the arc to be defined.
pub fn slerp(q1: Quat, q2: Quat, t: f32) -> Quat {
    if t <= 0.0 {
        return q1;
    }
    if t >= 1.0 {
        return q2;
    }
    let cos_theta = q1.dot(q2).abs().min(1.0);
    if (1.0 - cos_theta * cos_theta).sqrt() < SLERP_EPSILON {
        return q1;
    }
    q1.slerp(q2, t)
}

/// Cubic spline through `(i, y_i)` on unit-spaced knots with not-a-knot ends.
///
/// The third derivative is continuous across the second and the second-to-last knot, so
/// the first two and the last two segments are each one cubic. Three knots give the
/// interpolating parabola and two give a line.
struct CubicSpline<'a> {
    ys: &'a [f64],
    /// Second derivatives at the knots.
    m: Vec<f64>,
}

impl<'a> CubicSpline<'a> {
    fn fit(ys: &'a [f64]) -> Self {
        let n = ys.len();
        let mut m = vec![0.0; n];
        if n < 3 {
            return Self { ys, m };
        }
        if n == 3 {
            m.fill(ys[0] - 2.0 * ys[1] + ys[2]);
            return Self { ys, m };
        }

        // Interior rows m[i-1] + 4 m[i] + m[i+1] = 6 (y[i+1] - 2 y[i] + y[i-1]). The end
        // conditions m[0] = 2 m[1] - m[2] and m[n-1] = 2 m[n-2] - m[n-3] fold into the
        // first and last rows, leaving a tridiagonal system for the Thomas algorithm.
        let inner = n - 2;
        let mut sub = vec![1.0; inner];
        let mut diag = vec![4.0; inner];
        let mut sup = vec![1.0; inner];
        diag[0] = 6.0;
        sup[0] = 0.0;
        diag[inner - 1] = 6.0;
        sub[inner - 1] = 0.0;

        let mut c = vec![0.0; inner];
        let mut d = vec![0.0; inner];
        for k in 0..inner {
            let i = k + 1;
            let rhs = 6.0 * (ys[i + 1] - 2.0 * ys[i] + ys[i - 1]);
            if k == 0 {
                c[k] = sup[k] / diag[k];
                d[k] = rhs / diag[k];
            } else {
                let denom = diag[k] - sub[k] * c[k - 1];
                c[k] = sup[k] / denom;
                d[k] = (rhs - sub[k] * d[k - 1]) / denom;
            }
        }
        for k in (0..inner).rev() {
            let next = if k + 1 < inner { m[k + 2] } else { 0.0 };
            m[k + 1] = d[k] - c[k] * next;
        }
        m[0] = 2.0 * m[1] - m[2];
        m[n - 1] = 2.0 * m[n - 2] - m[n - 3];
        Self { ys, m }
    }

    /// Value on segment `seg` at local parameter `s` in `[0, 1]`.
    fn eval(&self, seg: usize, s: f64) -> f64 {
        let (y0, y1) = (self.ys[seg], self.ys[seg + 1]);
        let (m0, m1) = (self.m[seg], self.m[seg + 1]);
        let r = 1.0 - s;
        r * y0 + s * y1 + ((r * r * r - r) * m0 + (s * s * s - s) * m1) / 6.0
    }
}
