//! Deformable particles with a predicted position.

use crate::ParticleKind;
use pbd_math::Vec3;
use std::ops::Range;

/// Structure-of-arrays store for cloth and other deformables.
///
/// `p` is the working position the constraint solver relaxes; it is
/// committed to `x` once per step. A particle with zero inverse mass is
/// kinematic and is never moved by a constraint.
#[derive(Debug, Clone, Default)]
pub struct PbdParticles {
    /// Committed positions.
    pub x: Vec<Vec3>,
    /// Velocities.
    pub v: Vec<Vec3>,
    /// Predicted positions.
    pub p: Vec<Vec3>,
    /// Accumulated forces for the current step.
    pub f: Vec<Vec3>,
    /// Masses.
    pub m: Vec<f64>,
    /// Inverse masses, zero for kinematic particles.
    pub inv_m: Vec<f64>,
}

impl PbdParticles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            x: Vec::with_capacity(n),
            v: Vec::with_capacity(n),
            p: Vec::with_capacity(n),
            f: Vec::with_capacity(n),
            m: Vec::with_capacity(n),
            inv_m: Vec::with_capacity(n),
        }
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Append `n` unit-mass particles at the origin.
    pub fn add_particles(&mut self, n: usize) -> Range<usize> {
        let start = self.len();
        let end = start + n;
        self.x.resize(end, Vec3::zeros());
        self.v.resize(end, Vec3::zeros());
        self.p.resize(end, Vec3::zeros());
        self.f.resize(end, Vec3::zeros());
        self.m.resize(end, 1.0);
        self.inv_m.resize(end, 1.0);
        start..end
    }

    /// Drop particles from `len` onward.
    pub fn truncate(&mut self, len: usize) {
        self.x.truncate(len);
        self.v.truncate(len);
        self.p.truncate(len);
        self.f.truncate(len);
        self.m.truncate(len);
        self.inv_m.truncate(len);
    }

    /// Append one particle. A non-positive or non-finite mass makes it kinematic.
    pub fn add_particle(&mut self, x: Vec3, mass: f64) -> usize {
        let index = self.add_particles(1).start;
        self.x[index] = x;
        self.p[index] = x;
        self.set_mass(index, mass);
        index
    }

    pub fn set_mass(&mut self, index: usize, mass: f64) {
        self.m[index] = mass;
        self.inv_m[index] = if mass > 0.0 && mass.is_finite() {
            1.0 / mass
        } else {
            0.0
        };
    }

    /// Pin a particle: zero inverse mass and velocity.
    pub fn set_kinematic(&mut self, index: usize) {
        self.inv_m[index] = 0.0;
        self.v[index] = Vec3::zeros();
    }

    #[inline]
    pub fn is_dynamic(&self, index: usize) -> bool {
        self.inv_m[index] > 0.0
    }

    pub fn kind(&self, index: usize) -> ParticleKind {
        if self.is_dynamic(index) {
            ParticleKind::Dynamic
        } else {
            ParticleKind::Kinematic
        }
    }
}
