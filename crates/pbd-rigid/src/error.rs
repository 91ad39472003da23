use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RigidError {
    #[error("body {index} out of bounds for {count} bodies")]
    InvalidBody { index: usize, count: usize },

    #[error("body {0} is not dynamic")]
    NotDynamic(usize),

    #[error("body {0} already belongs to a cluster")]
    AlreadyClustered(usize),

    #[error("body {0} is not a cluster")]
    NotCluster(usize),

    #[error("cluster needs at least one child")]
    EmptyCluster,

    #[error("{what} has {found} entries, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, RigidError>;

/// Check that `index` names a body in a store of `count`.
pub(crate) fn check_body(index: usize, count: usize) -> Result<()> {
    if index < count {
        Ok(())
    } else {
        Err(RigidError::InvalidBody { index, count })
    }
}
