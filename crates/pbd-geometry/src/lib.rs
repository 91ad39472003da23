//! Collision geometry for the pbd engine.
//!
//! Every shape is an implicit surface: it answers "how far am I from this
//! point, and which way is out". Rigid narrow phase, per-particle cloth
//! collision and cluster strain queries are all written against that one
//! question.

pub mod aabb;
pub mod broad_phase;
pub mod error;
pub mod implicit;
pub mod level_set;
pub mod spatial_hash;
pub mod triangle;

pub use aabb::Aabb;
pub use broad_phase::{CollisionPair, sweep_and_prune};
pub use error::{GeometryError, Result};
pub use implicit::{Convex, HalfSpace, Implicit};
pub use level_set::{LevelSet, UniformGrid};
pub use spatial_hash::SpatialHash;
pub use triangle::{SegmentHit, Triangle};
