//! Damping of non-rigid motion.
//!
//! Each step the dynamic particles' center of mass, mean velocity and
//! angular velocity are measured; damping then pulls every velocity toward
//! the rigid motion `vcm + w x (x - xcm)`, leaving translation and
//! rotation of the whole body untouched.

use pbd_math::{Mat3, Vec3};
use pbd_particles::PbdParticles;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DampVelocity {
    coefficient: f64,
    xcm: Vec3,
    vcm: Vec3,
    omega: Vec3,
}

impl DampVelocity {
    pub fn new(coefficient: f64) -> Self {
        Self {
            coefficient: coefficient.clamp(0.0, 1.0),
            xcm: Vec3::zeros(),
            vcm: Vec3::zeros(),
            omega: Vec3::zeros(),
        }
    }

    pub fn coefficient(&self) -> f64 {
        self.coefficient
    }

    /// Measure rigid motion over the dynamic particles.
    pub fn update(&mut self, particles: &PbdParticles) {
        let mut total_mass = 0.0;
        let mut xcm = Vec3::zeros();
        let mut vcm = Vec3::zeros();
        for i in (0..particles.len()).filter(|&i| particles.is_dynamic(i)) {
            let m = particles.m[i];
            total_mass += m;
            xcm += particles.x[i] * m;
            vcm += particles.v[i] * m;
        }
        if total_mass <= 0.0 {
            self.xcm = Vec3::zeros();
            self.vcm = Vec3::zeros();
            self.omega = Vec3::zeros();
            return;
        }
        xcm /= total_mass;
        vcm /= total_mass;

        let mut angular_momentum = Vec3::zeros();
        let mut inertia = Mat3::zeros();
        for i in (0..particles.len()).filter(|&i| particles.is_dynamic(i)) {
            let m = particles.m[i];
            let r = particles.x[i] - xcm;
            angular_momentum += r.cross(&(particles.v[i] * m));
            inertia += pbd_math::point_inertia(m, &r);
        }
        self.xcm = xcm;
        self.vcm = vcm;
        self.omega = inertia
            .try_inverse()
            .map_or_else(Vec3::zeros, |inv| inv * angular_momentum);
    }

    /// Damped velocity for a particle at `x`.
    #[inline]
    pub fn apply(&self, x: &Vec3, v: &Vec3) -> Vec3 {
        if self.coefficient <= 0.0 {
            return *v;
        }
        let rigid = self.vcm + self.omega.cross(&(x - self.xcm));
        v + (rigid - v) * self.coefficient
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rigid_motion_is_preserved() {
        let mut particles = PbdParticles::new();
        let omega = Vec3::new(0.0, 0.0, 2.0);
        let drift = Vec3::new(1.0, 0.0, 0.0);
        for p in [
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, -1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
        ] {
            particles.add_particle(p, 1.0);
        }
        // Centered at (0, 0, 0.2); velocities are rigid about that point.
        let xcm = Vec3::new(0.0, 0.0, 0.2);
        particles.v = particles
            .x
            .iter()
            .map(|x| drift + omega.cross(&(x - xcm)))
            .collect();

        let mut damping = DampVelocity::new(0.5);
        damping.update(&particles);
        for (x, v) in particles.x.iter().zip(&particles.v) {
            assert_relative_eq!(damping.apply(x, v), *v, epsilon = 1e-9);
        }
    }

    #[test]
    fn relative_motion_is_damped() {
        let mut particles = PbdParticles::new();
        particles.add_particle(Vec3::new(-1.0, 0.0, 0.0), 1.0);
        particles.add_particle(Vec3::new(1.0, 0.0, 0.0), 1.0);
        // Pulling apart along the axis: no rigid component.
        particles.v = vec![Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0)];
        let mut damping = DampVelocity::new(0.25);
        damping.update(&particles);
        assert_relative_eq!(
            damping.apply(&particles.x[1], &particles.v[1]),
            Vec3::new(0.75, 0.0, 0.0),
            epsilon = 1e-9
        );
    }
}
