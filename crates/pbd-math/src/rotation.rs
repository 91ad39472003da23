//! Rotation helpers over unit quaternions.
//!
//! Convention: rotations map body frame to world frame.

use crate::{na, Vec3, SMALL_NUMBER};

/// A unit quaternion representing a 3D rotation.
pub type Rotation = na::UnitQuaternion<f64>;

/// Exponential map: rotation of angle |w| about w/|w|.
#[inline]
pub fn exp(w: &Vec3) -> Rotation {
    Rotation::from_scaled_axis(*w)
}

/// Logarithmic map: the axis-angle vector θu such that `exp(θu) == q`.
#[inline]
pub fn log(q: &Rotation) -> Vec3 {
    q.scaled_axis()
}

/// First-order quaternion integration: q + ½[ω, 0] q dt, renormalized.
pub fn integrate(q: &Rotation, w: &Vec3, dt: f64) -> Rotation {
    let spin = na::Quaternion::new(0.0, w.x, w.y, w.z) * q.quaternion();
    Rotation::new_normalize(q.quaternion() + spin * (0.5 * dt))
}

/// Angular velocity that carries `from` onto `to` over `dt`.
pub fn angular_velocity(from: &Rotation, to: &Rotation, dt: f64) -> Vec3 {
    if dt <= 0.0 {
        return Vec3::zeros();
    }
    let mut delta = to * from.inverse();
    // Take the short way around.
    if delta.w < 0.0 {
        delta = Rotation::new_unchecked(-delta.into_inner());
    }
    delta.scaled_axis() / dt
}

/// Spherical blend between two rotations, falling back to a normalized
/// linear blend when they are antipodal.
pub fn slerp(a: &Rotation, b: &Rotation, alpha: f64) -> Rotation {
    a.try_slerp(b, alpha, SMALL_NUMBER)
        .unwrap_or_else(|| a.nlerp(b, alpha))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn exp_log_roundtrip() {
        let w = Vec3::new(0.1, 0.2, 0.3);
        assert_relative_eq!(log(&exp(&w)), w, epsilon = 1e-12);
    }

    #[test]
    fn integrate_matches_small_rotation() {
        let q = Rotation::identity();
        let w = Vec3::new(0.0, 0.0, 1.0);
        let dt = 1e-3;
        let r = integrate(&q, &w, dt);
        assert_relative_eq!(r.angle(), dt, epsilon = 1e-9);
    }

    #[test]
    fn angular_velocity_recovers_spin() {
        let from = Rotation::from_axis_angle(&Vec3::x_axis(), 0.3);
        let to = Rotation::from_axis_angle(&Vec3::z_axis(), FRAC_PI_2) * from;
        let w = angular_velocity(&from, &to, 0.5);
        assert_relative_eq!(w, Vec3::new(0.0, 0.0, FRAC_PI_2 / 0.5), epsilon = 1e-9);
    }

    #[test]
    fn slerp_halfway() {
        let a = Rotation::identity();
        let b = Rotation::from_axis_angle(&Vec3::z_axis(), FRAC_PI_2);
        let mid = slerp(&a, &b, 0.5);
        assert_relative_eq!(mid.angle(), FRAC_PI_2 * 0.5, epsilon = 1e-12);
    }

    #[test]
    fn angular_velocity_zero_dt() {
        let a = Rotation::identity();
        assert_eq!(angular_velocity(&a, &a, 0.0), Vec3::zeros());
    }
}
