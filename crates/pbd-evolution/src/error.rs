use pbd_constraints::ConstraintError;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum EvolutionError {
    #[error(transparent)]
    Constraint(#[from] ConstraintError),

    #[error("unsupported feature: {0}")]
    Unsupported(String),

    #[error("{what} has {found} entries, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, EvolutionError>;
