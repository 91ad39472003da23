//! Follow-the-leader chains.

use crate::error::{check_indices, check_stiffness};
use crate::{ConstraintRule, Result};
use pbd_math::SMALL_NUMBER;
use pbd_particles::PbdParticles;

/// Ordered particle chains. Walking from the root, each child is placed at
/// its rest distance from the already-corrected parent. Only the child
/// moves, so a chain converges in one sweep.
#[derive(Debug, Clone)]
pub struct ChainConstraints {
    chains: Vec<Vec<usize>>,
    rest_lengths: Vec<Vec<f64>>,
    stiffness: f64,
}

impl ChainConstraints {
    pub fn new(particles: &PbdParticles, chains: Vec<Vec<usize>>, stiffness: f64) -> Result<Self> {
        let stiffness = check_stiffness(stiffness)?;
        for (c, chain) in chains.iter().enumerate() {
            check_indices(c, chain, particles.len())?;
        }
        let rest_lengths = chains
            .iter()
            .map(|chain| {
                chain
                    .windows(2)
                    .map(|w| (particles.x[w[1]] - particles.x[w[0]]).norm())
                    .collect()
            })
            .collect();
        Ok(Self {
            chains,
            rest_lengths,
            stiffness,
        })
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}

impl ConstraintRule for ChainConstraints {
    fn apply(&self, particles: &mut PbdParticles, _dt: f64) {
        for (chain, rests) in self.chains.iter().zip(&self.rest_lengths) {
            for (link, &rest) in chain.windows(2).zip(rests) {
                let (parent, child) = (link[0], link[1]);
                if !particles.is_dynamic(child) {
                    continue;
                }
                let offset = particles.p[child] - particles.p[parent];
                let distance = offset.norm();
                if distance < SMALL_NUMBER {
                    continue;
                }
                let target = particles.p[parent] + offset * (rest / distance);
                let p = particles.p[child];
                particles.p[child] = p + (target - p) * self.stiffness;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pbd_math::Vec3;

    #[test]
    fn restores_every_link_in_one_sweep() {
        let mut particles = PbdParticles::new();
        particles.add_particle(Vec3::zeros(), 0.0);
        for k in 1..4 {
            particles.add_particle(Vec3::new(0.0, 0.0, -(k as f64)), 1.0);
        }
        let chain = ChainConstraints::new(&particles, vec![vec![0, 1, 2, 3]], 1.0).expect("valid");
        particles.p[1] = Vec3::new(3.0, 0.0, 0.0);
        particles.p[2] = Vec3::new(3.0, 0.0, -5.0);
        particles.p[3] = Vec3::new(3.0, 0.0, -5.5);
        chain.apply(&mut particles, 0.1);
        for k in 0..3 {
            assert_relative_eq!((particles.p[k + 1] - particles.p[k]).norm(), 1.0, epsilon = 1e-12);
        }
        assert_eq!(particles.p[0], Vec3::zeros());
    }

    #[test]
    fn repeated_index_rejected() {
        let mut particles = PbdParticles::new();
        particles.add_particles(3);
        assert!(ChainConstraints::new(&particles, vec![vec![0, 1, 0]], 1.0).is_err());
    }
}
