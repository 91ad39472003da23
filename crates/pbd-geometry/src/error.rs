//! Error types for geometry construction.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("grid must have at least one cell per axis, got {0:?}")]
    EmptyGrid([usize; 3]),

    #[error("grid cell size must be positive, got {0}")]
    InvalidCellSize(f64),

    #[error("cannot build a level set from an empty mesh")]
    EmptyMesh,

    #[error("triangle {triangle} references vertex {index} but only {count} vertices exist")]
    VertexOutOfBounds {
        triangle: usize,
        index: usize,
        count: usize,
    },
}

pub type Result<T> = std::result::Result<T, GeometryError>;
