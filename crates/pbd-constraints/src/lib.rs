//! Constraint primitives for position-based dynamics.
//!
//! A constraint reads and corrects predicted positions `p` of a
//! [`PbdParticles`] store and never touches particles with zero inverse
//! mass. Constraints own index tuples and rest measurements but never the
//! particles themselves. Every constructor validates its indices up front;
//! applying a constraint cannot fail.

pub mod axial_spring;
pub mod bending;
pub mod chain;
pub mod collision;
pub mod error;
pub mod ground;
pub mod long_range;
pub mod self_collision;
pub mod shape;
pub mod spring;
pub mod volume;

pub use axial_spring::AxialSpringConstraints;
pub use bending::BendingConstraints;
pub use chain::ChainConstraints;
pub use collision::{ParticleContact, PerParticleCollision, PerParticleFriction};
pub use error::{ConstraintError, Result};
pub use ground::GroundConstraint;
pub use long_range::{LongRangeConstraints, LongRangeMode};
pub use self_collision::CollisionSpringConstraints;
pub use shape::{SharedPositions, ShapeConstraints};
pub use spring::SpringConstraints;
pub use volume::VolumeConstraint;

use pbd_particles::PbdParticles;

/// A constraint applied once per solver iteration.
///
/// Rules are boxed and kept in registration order; the evolution calls
/// them sequentially, so an implementation is free to parallelize
/// internally as long as each particle is written by one task.
pub trait ConstraintRule: Send + Sync {
    fn apply(&self, particles: &mut PbdParticles, dt: f64);
}

impl<F> ConstraintRule for F
where
    F: Fn(&mut PbdParticles, f64) + Send + Sync,
{
    fn apply(&self, particles: &mut PbdParticles, dt: f64) {
        self(particles, dt)
    }
}
