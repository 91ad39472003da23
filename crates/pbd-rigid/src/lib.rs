//! Rigid body evolution for the pbd engine.
//!
//! Each step integrates bodies, finds contacts, partitions them into
//! islands through the contact graph and solves every awake island on its
//! own task. Within an island, contacts are swept level by level and color
//! by color; one color's contacts are evaluated concurrently against a
//! snapshot and written back afterwards. Clusters break under contact
//! strain, and collision, break and trailing events are collected once the
//! parallel work is done.

pub mod body;
pub mod clustering;
pub mod collision;
pub mod config;
pub mod constraints;
pub mod contact;
pub mod error;
pub mod events;
pub mod evolution;
pub mod island;
pub mod narrow_phase;

pub use body::{BodyState, contact_mass_matrix};
pub use clustering::RigidClustering;
pub use collision::RigidCollisionConstraints;
pub use config::RigidEvolutionConfig;
pub use constraints::{RigidConstraintRule, RigidSpringConstraints};
pub use contact::RigidContact;
pub use error::{Result, RigidError};
pub use events::{BreakEvent, CollisionEvent, EventCollector, TrailingEvent};
pub use evolution::{
    BreakCallback, CollisionCallback, KinematicBodyUpdate, PbdRigidsEvolution, TrailingCallback,
};
pub use island::IslandBodies;
pub use narrow_phase::{ContactPoint, contact_between, detect_contacts, update_contact};
