//! pbd: position-based dynamics for cloth and rigid bodies.
//!
//! This is the umbrella crate: it re-exports the sub-crates and the types
//! most programs need, and loads a combined [`SimulationConfig`] from JSON.

pub mod config;

pub use config::{ConfigError, SimulationConfig};

pub use pbd_constraints::{self, ConstraintError, ConstraintRule, SpringConstraints};
pub use pbd_contact::{self, ContactGraph, ContactGraphConfig, SleepConfig};
pub use pbd_evolution::{
    self, ClothConfig, ClothData, ClothingSimulation, EvolutionConfig, EvolutionError,
    PbdEvolution, SimulationContext,
};
pub use pbd_geometry::{self, Aabb, Implicit};
pub use pbd_math::{self, Mat3, RigidTransform, Rotation, Vec3};
pub use pbd_mesh::{self, TriangleMesh};
pub use pbd_particles::{self, ParticleKind, PbdParticles, RigidBodyDesc, RigidParticles};
pub use pbd_rigid::{
    self, PbdRigidsEvolution, RigidContact, RigidError, RigidEvolutionConfig,
    RigidSpringConstraints,
};
