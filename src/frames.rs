//! Poses and coordinate-frame conversions.
//!
//! Two conventions meet here:
//!
//! - The simulation is right-handed, Z-up, X-forward, Y-left. Every [`Pose`] in this
//!   crate is expressed in that convention, either in world frame or in the robot's
//!   base-body frame.
//! - The teleoperation headset reports hand poses left-handed, Y-up, Z-forward,
//!   X-right. [`input_position_to_sim`] and [`input_quat_to_sim`] convert them.
//!
//! Quaternion component order is explicit at every boundary: pose events carry
//! `(w, x, y, z)` arrays, recorded orientation streams carry `(x, y, z, w)`.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// A rigid transform: position plus orientation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    /// Maps a pose expressed in this frame into the parent frame.
    ///
    /// With `self` as the base-body pose in world frame this is the base→world
    /// transform: `pos_W = base_rot * pos_B + base_pos`, `rot_W = base_rot * rot_B`.
    pub fn transform(&self, local: &Pose) -> Pose {
        Pose {
            position: self.rotation * local.position + self.position,
            rotation: self.rotation * local.rotation,
        }
    }

    /// Inverse of [`transform`](Self::transform): expresses a parent-frame pose in this frame.
    pub fn relative(&self, world: &Pose) -> Pose {
        let inv = self.rotation.inverse();
        Pose {
            position: inv * (world.position - self.position),
            rotation: inv * world.rotation,
        }
    }

    /// Packs the pose as `[x, y, z, rx, ry, rz]` with a rotation vector for orientation.
    pub fn to_pose_vector(&self) -> [f32; 6] {
        let r = rotation_vector(self.rotation);
        [
            self.position.x,
            self.position.y,
            self.position.z,
            r.x,
            r.y,
            r.z,
        ]
    }
}

/// Rotation vector (axis * angle) with the angle canonicalised to `[0, π]`.
pub fn rotation_vector(q: Quat) -> Vec3 {
    // q and -q are the same rotation; pick the hemisphere with w >= 0.
    let q = if q.w < 0.0 { -q } else { q };
    q.normalize().to_scaled_axis()
}

/// Builds a quaternion from a `(w, x, y, z)` array.
pub fn quat_from_wxyz(q: [f32; 4]) -> Quat {
    Quat::from_xyzw(q[1], q[2], q[3], q[0])
}

/// Builds a quaternion from an `(x, y, z, w)` slice as stored in orientation streams.
///
/// Returns `None` when the slice does not hold exactly four values.
pub fn quat_from_xyzw_slice(q: &[f32]) -> Option<Quat> {
    match q {
        [x, y, z, w] => Some(Quat::from_xyzw(*x, *y, *z, *w)),
        _ => None,
    }
}

/// Converts a headset position into the simulation convention.
///
/// Axes are permuted as `input[2, 0, 1]` and the new Y is negated, so
/// `(x, y, z)` becomes `(z, -x, y)`.
pub fn input_position_to_sim(p: [f32; 3]) -> Vec3 {
    Vec3::new(p[2], -p[0], p[1])
}

/// Converts a headset quaternion into the simulation convention.
///
/// Components are permuted as `input[3, 2, 0, 1]`, then the new components 1 and 3
/// are negated. Both input and output are `(w, x, y, z)` arrays.
pub fn input_quat_to_sim(q: [f32; 4]) -> [f32; 4] {
    [q[3], -q[2], q[0], -q[1]]
}
