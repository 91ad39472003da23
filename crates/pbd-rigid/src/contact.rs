//! Contact constraint between two rigid bodies.

use pbd_contact::ContactEdge;
use pbd_math::Vec3;

/// One contact, rebuilt every step by the narrow phase.
///
/// `normal` points from `particles[1]` toward `particles[0]`: moving body
/// 0 along it separates the pair. `phi` is the signed separation along the
/// normal, negative when penetrating.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidContact {
    pub particles: [usize; 2],
    pub normal: Vec3,
    pub location: Vec3,
    pub phi: f64,
    /// Sum of the impulses applied to `particles[0]` this step.
    pub accumulated_impulse: Vec3,
}

impl RigidContact {
    pub fn new(particles: [usize; 2], normal: Vec3, location: Vec3, phi: f64) -> Self {
        Self {
            particles,
            normal,
            location,
            phi,
            accumulated_impulse: Vec3::zeros(),
        }
    }

    /// Whether the solver pushed on this contact.
    pub fn has_impulse(&self) -> bool {
        self.accumulated_impulse != Vec3::zeros()
    }
}

impl ContactEdge for RigidContact {
    fn particle_indices(&self) -> [usize; 2] {
        self.particles
    }
}
