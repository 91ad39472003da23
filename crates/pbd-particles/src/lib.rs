//! Particle stores for the pbd engine.
//!
//! All per-particle state lives in parallel arrays indexed by particle id.
//! Stores only ever grow; constraints and graphs hold indices into them.

pub mod kind;
pub mod kinematic;
pub mod parallel;
pub mod pbd;
pub mod rigid;

pub use kind::ParticleKind;
pub use kinematic::KinematicGeometryParticles;
pub use pbd::PbdParticles;
pub use rigid::{RigidBodyDesc, RigidParticles, box_inertia, sphere_inertia};
