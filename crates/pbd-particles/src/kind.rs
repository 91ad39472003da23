//! How a particle participates in the simulation.

use serde::{Deserialize, Serialize};

/// Dynamic particles are moved by the solver. Kinematic particles are
/// driven from outside and have zero inverse mass. Static particles never
/// move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ParticleKind {
    #[default]
    Dynamic,
    Kinematic,
    Static,
}

impl ParticleKind {
    #[inline]
    pub fn is_dynamic(self) -> bool {
        matches!(self, ParticleKind::Dynamic)
    }
}
