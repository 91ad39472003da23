//! Enclosed-volume constraint over a closed triangle surface.

use crate::error::{check_indices, check_stiffness};
use crate::{ConstraintRule, Result};
use pbd_math::{SMALL_NUMBER, Vec3};
use pbd_particles::PbdParticles;
use std::collections::{BTreeMap, BTreeSet};

/// Keeps the signed volume enclosed by `triangles` at its rest value.
/// Treated as a single global constraint over every referenced particle.
#[derive(Debug, Clone)]
pub struct VolumeConstraint {
    triangles: Vec<[usize; 3]>,
    /// Referenced particles, sorted.
    particles: Vec<usize>,
    /// Triangle corners remapped into `particles`.
    local: Vec<[usize; 3]>,
    rest_volume: f64,
    stiffness: f64,
}

fn signed_volume(p: &[Vec3], triangles: &[[usize; 3]]) -> f64 {
    triangles
        .iter()
        .map(|&[a, b, c]| p[a].dot(&p[b].cross(&p[c])))
        .sum::<f64>()
        / 6.0
}

impl VolumeConstraint {
    pub fn new(particles: &PbdParticles, triangles: Vec<[usize; 3]>, stiffness: f64) -> Result<Self> {
        let stiffness = check_stiffness(stiffness)?;
        for (c, tri) in triangles.iter().enumerate() {
            check_indices(c, tri, particles.len())?;
        }
        let order: Vec<usize> = triangles
            .iter()
            .flatten()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let remap: BTreeMap<usize, usize> = order.iter().enumerate().map(|(k, &v)| (v, k)).collect();
        let local = triangles
            .iter()
            .map(|t| [remap[&t[0]], remap[&t[1]], remap[&t[2]]])
            .collect();
        let rest_volume = signed_volume(&particles.x, &triangles);
        Ok(Self {
            triangles,
            particles: order,
            local,
            rest_volume,
            stiffness,
        })
    }

    pub fn rest_volume(&self) -> f64 {
        self.rest_volume
    }

    /// Current signed volume of the predicted surface.
    pub fn volume(&self, particles: &PbdParticles) -> f64 {
        signed_volume(&particles.p, &self.triangles)
    }
}

impl ConstraintRule for VolumeConstraint {
    fn apply(&self, particles: &mut PbdParticles, _dt: f64) {
        let p = &particles.p;
        let mut gradients = vec![Vec3::zeros(); self.particles.len()];
        for (tri, local) in self.triangles.iter().zip(&self.local) {
            let [a, b, c] = *tri;
            gradients[local[0]] += p[b].cross(&p[c]) / 6.0;
            gradients[local[1]] += p[c].cross(&p[a]) / 6.0;
            gradients[local[2]] += p[a].cross(&p[b]) / 6.0;
        }
        let denominator: f64 = self
            .particles
            .iter()
            .zip(&gradients)
            .map(|(&i, g)| particles.inv_m[i] * g.norm_squared())
            .sum();
        if denominator < SMALL_NUMBER {
            return;
        }
        let scale = self.stiffness * (self.volume(particles) - self.rest_volume) / denominator;
        for (&i, g) in self.particles.iter().zip(&gradients) {
            let w = particles.inv_m[i];
            if w > 0.0 {
                particles.p[i] -= g * (scale * w);
            }
        }
    }
}
