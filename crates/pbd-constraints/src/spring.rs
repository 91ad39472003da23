//! Distance springs between particle pairs.

use crate::error::{check_indices, check_stiffness};
use crate::{ConstraintRule, Result};
use pbd_math::{SMALL_NUMBER, Vec3};
use pbd_mesh::TriangleMesh;
use pbd_particles::PbdParticles;

/// Pairwise distance constraints with rest lengths measured at setup.
///
/// Used for edge, bending-spring and thin-shell volume springs alike.
#[derive(Debug, Clone)]
pub struct SpringConstraints {
    constraints: Vec<[usize; 2]>,
    rest_lengths: Vec<f64>,
    stiffness: f64,
}

impl SpringConstraints {
    pub fn new(particles: &PbdParticles, constraints: Vec<[usize; 2]>, stiffness: f64) -> Result<Self> {
        let stiffness = check_stiffness(stiffness)?;
        for (c, pair) in constraints.iter().enumerate() {
            check_indices(c, pair, particles.len())?;
        }
        let rest_lengths = constraints
            .iter()
            .map(|&[a, b]| (particles.x[a] - particles.x[b]).norm())
            .collect();
        Ok(Self {
            constraints,
            rest_lengths,
            stiffness,
        })
    }

    /// One spring per unique mesh edge.
    pub fn from_edges(particles: &PbdParticles, mesh: &TriangleMesh, stiffness: f64) -> Result<Self> {
        Self::new(particles, mesh.unique_edges(), stiffness)
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn constraints(&self) -> &[[usize; 2]] {
        &self.constraints
    }

    pub fn rest_lengths(&self) -> &[f64] {
        &self.rest_lengths
    }

    /// Correction to subtract from the first endpoint per unit inverse mass.
    fn delta(&self, particles: &PbdParticles, index: usize) -> Option<Vec3> {
        let [i1, i2] = self.constraints[index];
        let combined = particles.inv_m[i1] + particles.inv_m[i2];
        if combined <= 0.0 {
            return None;
        }
        let direction = particles.p[i1] - particles.p[i2];
        let distance = direction.norm();
        if distance < SMALL_NUMBER {
            return None;
        }
        let offset = distance - self.rest_lengths[index];
        Some(direction * (self.stiffness * offset / (distance * combined)))
    }

    /// Relax a single spring.
    pub fn apply_single(&self, particles: &mut PbdParticles, index: usize) {
        let Some(delta) = self.delta(particles, index) else {
            return;
        };
        let [i1, i2] = self.constraints[index];
        let (w1, w2) = (particles.inv_m[i1], particles.inv_m[i2]);
        if w1 > 0.0 {
            particles.p[i1] -= delta * w1;
        }
        if w2 > 0.0 {
            particles.p[i2] += delta * w2;
        }
    }
}

impl ConstraintRule for SpringConstraints {
    fn apply(&self, particles: &mut PbdParticles, _dt: f64) {
        for index in 0..self.constraints.len() {
            self.apply_single(particles, index);
        }
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_vec() -> impl Strategy<Value = Vec3> {
        (-5.0..5.0_f64, -5.0..5.0_f64, -5.0..5.0_f64).prop_map(|(x, y, z)| Vec3::new(x, y, z))
    }

    proptest! {
        #[test]
        fn moves_toward_rest_without_overshoot(
            a in arb_vec(),
            b in arb_vec(),
            pa in arb_vec(),
            pb in arb_vec(),
            stiffness in 0.01..=1.0_f64,
            ma in 0.1..10.0_f64,
            mb in 0.1..10.0_f64,
        ) {
            let mut particles = PbdParticles::new();
            particles.add_particle(a, ma);
            particles.add_particle(b, mb);
            prop_assume!((a - b).norm() > 1e-3);
            prop_assume!((pa - pb).norm() > 1e-3);
            let springs = SpringConstraints::new(&particles, vec![[0, 1]], stiffness).unwrap();
            let rest = springs.rest_lengths()[0];
            particles.p[0] = pa;
            particles.p[1] = pb;
            let before = (pa - pb).norm() - rest;
            springs.apply(&mut particles, 1.0 / 60.0);
            let after = (particles.p[0] - particles.p[1]).norm() - rest;
            prop_assert!(after.abs() <= before.abs() + 1e-9);
            // Same side of rest length: no overshoot.
            prop_assert!(after * before >= -1e-9);
        }
    }
}
