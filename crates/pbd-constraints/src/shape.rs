//! Pull toward an animated target shape.

use crate::error::{ConstraintError, check_stiffness};
use crate::{ConstraintRule, Result};
use pbd_math::Vec3;
use pbd_particles::PbdParticles;
use std::sync::{Arc, RwLock};

/// Target positions shared with whoever animates them.
pub type SharedPositions = Arc<RwLock<Vec<Vec3>>>;

/// Moves each listed particle a `stiffness` fraction of the way to its
/// entry in the shared target buffer. Target entry `k` belongs to
/// `indices[k]`.
#[derive(Debug, Clone)]
pub struct ShapeConstraints {
    indices: Vec<usize>,
    targets: SharedPositions,
    stiffness: f64,
}

impl ShapeConstraints {
    pub fn new(
        particles: &PbdParticles,
        indices: Vec<usize>,
        targets: SharedPositions,
        stiffness: f64,
    ) -> Result<Self> {
        let stiffness = check_stiffness(stiffness)?;
        if let Some(&index) = indices.iter().find(|&&i| i >= particles.len()) {
            return Err(ConstraintError::IndexOutOfBounds {
                constraint: 0,
                index,
                count: particles.len(),
            });
        }
        let available = targets.read().unwrap_or_else(|e| e.into_inner()).len();
        if available < indices.len() {
            return Err(ConstraintError::MissingTargets {
                targets: available,
                required: indices.len(),
            });
        }
        Ok(Self {
            indices,
            targets,
            stiffness,
        })
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn targets(&self) -> &SharedPositions {
        &self.targets
    }

    /// Pull the particle of entry `index` toward its target.
    pub fn apply_single(&self, particles: &mut PbdParticles, index: usize) {
        let targets = self.targets.read().unwrap_or_else(|e| e.into_inner());
        if let Some(target) = targets.get(index) {
            self.pull(particles, self.indices[index], target);
        }
    }

    fn pull(&self, particles: &mut PbdParticles, i: usize, target: &Vec3) {
        if particles.is_dynamic(i) {
            let p = particles.p[i];
            particles.p[i] = p + (target - p) * self.stiffness;
        }
    }
}

impl ConstraintRule for ShapeConstraints {
    fn apply(&self, particles: &mut PbdParticles, _dt: f64) {
        let targets = self.targets.read().unwrap_or_else(|e| e.into_inner());
        for (&i, target) in self.indices.iter().zip(targets.iter()) {
            self.pull(particles, i, target);
        }
    }
}
