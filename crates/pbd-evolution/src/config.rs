//! Evolution and clothing configuration.
//!
//! Both structs are flat sets of named scalars and deserialize with
//! missing fields taking their defaults.

use crate::{EvolutionError, Result};
use pbd_constraints::LongRangeMode;
use serde::{Deserialize, Serialize};

/// Solver settings for [`crate::PbdEvolution`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    /// Relaxation sweeps per step.
    pub iterations: usize,
    /// Distance kept from kinematic proxies.
    pub collision_thickness: f64,
    /// Distance kept between a particle and its own cloth.
    pub self_collision_thickness: f64,
    pub self_collision_stiffness: f64,
    /// Coulomb coefficient against proxies; zero disables friction.
    pub friction: f64,
    /// Damping of non-rigid velocity in `[0, 1]`.
    pub damping: f64,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            iterations: 1,
            collision_thickness: 0.0,
            self_collision_thickness: 0.0,
            self_collision_stiffness: 1.0,
            friction: 0.0,
            damping: 0.04,
        }
    }
}

impl EvolutionConfig {
    pub fn validate(&self) -> Result<()> {
        let finite_non_negative = |name: &str, value: f64| {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(EvolutionError::InvalidConfig(format!("{name} = {value}")))
            }
        };
        finite_non_negative("collision_thickness", self.collision_thickness)?;
        finite_non_negative("self_collision_thickness", self.self_collision_thickness)?;
        finite_non_negative("friction", self.friction)?;
        finite_non_negative("damping", self.damping)?;
        if !(self.self_collision_stiffness > 0.0 && self.self_collision_stiffness <= 1.0) {
            return Err(EvolutionError::InvalidConfig(format!(
                "self_collision_stiffness = {}",
                self.self_collision_stiffness
            )));
        }
        Ok(())
    }
}

/// Cloth setup. Lengths are in centimetres. A stiffness of zero leaves
/// the corresponding constraint out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClothConfig {
    pub iterations: usize,
    pub self_collision_thickness: f64,
    pub collision_thickness: f64,
    pub friction: f64,
    pub damping: f64,
    /// Magnitude of gravity along -Z.
    pub gravity: f64,
    /// Mass per unit area.
    pub density: f64,

    pub edge_stiffness: f64,
    pub bending_stiffness: f64,
    pub area_stiffness: f64,
    pub volume_stiffness: f64,
    pub strain_limiting_stiffness: f64,
    pub shape_target_stiffness: f64,

    /// Dihedral bending instead of springs across adjacent triangles.
    pub use_bending_elements: bool,
    pub use_tetrahedral_constraints: bool,
    /// Volume as springs between second-order neighbours.
    pub use_thin_shell_volume_constraints: bool,
    pub use_self_collisions: bool,
    /// Mesh rings around a particle excluded from its self-collisions.
    pub self_collision_rings: usize,
    pub long_range_mode: LongRangeMode,

    /// Particles whose max distance is at or below this are kinematic.
    pub kinematic_max_distance: f64,
    /// Longest single sub-step.
    pub max_delta_time: f64,
    /// Upper bound on a frame's delta time; zero disables clamping.
    pub clamp_delta_time: f64,
}

impl Default for ClothConfig {
    fn default() -> Self {
        Self {
            iterations: 1,
            self_collision_thickness: 2.0,
            collision_thickness: 1.2,
            friction: 0.0,
            damping: 0.01,
            gravity: 490.0,
            density: 1.0,
            edge_stiffness: 1.0,
            bending_stiffness: 1.0,
            area_stiffness: 1.0,
            volume_stiffness: 0.0,
            strain_limiting_stiffness: 1.0,
            shape_target_stiffness: 0.0,
            use_bending_elements: false,
            use_tetrahedral_constraints: false,
            use_thin_shell_volume_constraints: false,
            use_self_collisions: false,
            self_collision_rings: 5,
            long_range_mode: LongRangeMode::Euclidean,
            kinematic_max_distance: 0.1,
            max_delta_time: 1.0,
            clamp_delta_time: 0.0,
        }
    }
}

impl ClothConfig {
    pub fn evolution(&self) -> EvolutionConfig {
        EvolutionConfig {
            iterations: self.iterations,
            collision_thickness: self.collision_thickness,
            self_collision_thickness: self.self_collision_thickness,
            self_collision_stiffness: 1.0,
            friction: self.friction,
            damping: self.damping,
        }
    }
}
