//! Deformable evolution for position-based dynamics.
//!
//! [`PbdEvolution`] advances a [`pbd_particles::PbdParticles`] store one
//! step at a time: forces, prediction, ordered constraint relaxation,
//! collisions against kinematic proxies, commit and friction.
//! [`ClothingSimulation`] builds cloth constraint sets on top of it and
//! drives it from animation targets.

pub mod clothing;
pub mod config;
pub mod damping;
pub mod error;
pub mod evolution;
pub mod force;

pub use clothing::{ClothData, ClothingSimulation, SimulationContext};
pub use config::{ClothConfig, EvolutionConfig};
pub use damping::DampVelocity;
pub use error::{EvolutionError, Result};
pub use evolution::{KinematicParticleUpdate, KinematicProxyUpdate, PbdEvolution};
pub use force::{ForceRule, LinearDrag, PerParticleGravity};
