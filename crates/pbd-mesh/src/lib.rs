//! Triangle mesh topology.
//!
//! Cloth constraints are generated from adjacency: unique edges become
//! springs, edge-sharing triangle pairs become bending elements, N-ring
//! neighbourhoods become self-collision exclusions, and mesh paths give
//! geodesic distances for long-range attachments.

pub mod geodesic;
pub mod triangle_mesh;

pub use geodesic::{GeodesicField, nearest_sources};
pub use triangle_mesh::TriangleMesh;
