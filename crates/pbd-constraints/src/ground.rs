use crate::ConstraintRule;
use pbd_particles::PbdParticles;

/// Keeps dynamic particles above a horizontal plane `z = height`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundConstraint {
    pub height: f64,
}

impl GroundConstraint {
    pub fn new(height: f64) -> Self {
        Self { height }
    }

    /// Lift particle `index` if it is dynamic and below the plane.
    pub fn apply_single(&self, particles: &mut PbdParticles, index: usize) {
        if particles.inv_m[index] > 0.0 && particles.p[index].z < self.height {
            particles.p[index].z = self.height;
        }
    }
}

impl ConstraintRule for GroundConstraint {
    fn apply(&self, particles: &mut PbdParticles, _dt: f64) {
        for i in 0..particles.len() {
            self.apply_single(particles, i);
        }
    }
}
