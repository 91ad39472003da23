//! Contact graph for rigid bodies.
//!
//! One node per rigid particle, one edge per contact constraint. Each step
//! the graph is reset, rebuilt from the live contacts and partitioned into
//! islands. Within an island, edges are greedily colored so that no two
//! edges sharing a dynamic body get the same color, and optionally tagged
//! with their distance (level) from static or kinematic anchors. Edges of
//! one color can then be solved concurrently.

pub mod config;
pub mod graph;
pub mod island;

pub use config::{ContactGraphConfig, SleepConfig};
pub use graph::{ContactGraph, GraphEdge, GraphNode};
pub use island::IslandData;

/// A constraint that joins two particles.
pub trait ContactEdge {
    fn particle_indices(&self) -> [usize; 2];
}

impl ContactEdge for [usize; 2] {
    fn particle_indices(&self) -> [usize; 2] {
        *self
    }
}

impl<C: ContactEdge> ContactEdge for &C {
    fn particle_indices(&self) -> [usize; 2] {
        (*self).particle_indices()
    }
}
