//! Math primitives for the pbd engine.
//!
//! Thin aliases over nalgebra plus the handful of rotation and rigid
//! transform helpers that every solver stage shares.

pub mod rotation;
pub mod transform;

pub use rotation::Rotation;
pub use transform::RigidTransform;

pub use nalgebra as na;

/// 3D vector alias.
pub type Vec3 = na::Vector3<f64>;
/// 3x3 matrix alias.
pub type Mat3 = na::Matrix3<f64>;

/// Lengths below this are treated as degenerate.
pub const SMALL_NUMBER: f64 = 1e-8;
/// Looser tolerance for geometric predicates.
pub const KINDA_SMALL_NUMBER: f64 = 1e-4;

/// Cross-product matrix: [v]× such that [v]× w = v × w.
#[inline]
pub fn skew(v: &Vec3) -> Mat3 {
    Mat3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// Normalize `v`, or `None` when it is too short to carry a direction.
#[inline]
pub fn try_normalize(v: &Vec3) -> Option<Vec3> {
    v.try_normalize(SMALL_NUMBER)
}

/// Any unit vector perpendicular to `v`.
pub fn orthogonal(v: &Vec3) -> Vec3 {
    let axis = if v.x.abs() < 0.9 { Vec3::x() } else { Vec3::y() };
    try_normalize(&v.cross(&axis)).unwrap_or_else(Vec3::z)
}

/// Rotate a body-frame inertia tensor into world frame: R I Rᵀ.
#[inline]
pub fn world_inertia(rotation: &Rotation, local: &Mat3) -> Mat3 {
    let r = rotation.to_rotation_matrix();
    r.matrix() * local * r.matrix().transpose()
}

/// Inertia of a point mass at `offset`, for the parallel-axis theorem.
pub fn point_inertia(mass: f64, offset: &Vec3) -> Mat3 {
    mass * (Mat3::identity() * offset.norm_squared() - offset * offset.transpose())
}
