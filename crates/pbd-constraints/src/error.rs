//! Error types for constraint construction.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConstraintError {
    #[error("constraint {constraint} references particle {index} but only {count} particles exist")]
    IndexOutOfBounds {
        constraint: usize,
        index: usize,
        count: usize,
    },

    #[error("constraint {constraint} references particle {index} more than once")]
    DuplicateIndex { constraint: usize, index: usize },

    #[error("stiffness must be finite and positive, got {0}")]
    InvalidStiffness(f64),

    #[error("thickness must be finite and non-negative, got {0}")]
    InvalidThickness(f64),

    #[error("target positions cover {targets} particles but {required} are required")]
    MissingTargets { targets: usize, required: usize },
}

pub type Result<T> = std::result::Result<T, ConstraintError>;

/// Check that a constraint's indices are in bounds and pairwise distinct.
pub(crate) fn check_indices(constraint: usize, indices: &[usize], count: usize) -> Result<()> {
    for (k, &index) in indices.iter().enumerate() {
        if index >= count {
            return Err(ConstraintError::IndexOutOfBounds {
                constraint,
                index,
                count,
            });
        }
        if indices[..k].contains(&index) {
            return Err(ConstraintError::DuplicateIndex { constraint, index });
        }
    }
    Ok(())
}

/// Validate a stiffness, clamping values above one.
pub(crate) fn check_stiffness(stiffness: f64) -> Result<f64> {
    if !stiffness.is_finite() || stiffness <= 0.0 {
        return Err(ConstraintError::InvalidStiffness(stiffness));
    }
    if stiffness > 1.0 {
        tracing::warn!(stiffness, "stiffness above 1 clamped");
        return Ok(1.0);
    }
    Ok(stiffness)
}

pub(crate) fn check_thickness(thickness: f64) -> Result<f64> {
    if !thickness.is_finite() || thickness < 0.0 {
        return Err(ConstraintError::InvalidThickness(thickness));
    }
    Ok(thickness)
}
