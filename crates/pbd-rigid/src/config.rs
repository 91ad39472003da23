use crate::{Result, RigidError};
use pbd_contact::ContactGraphConfig;
use pbd_math::Vec3;
use serde::{Deserialize, Serialize};

/// Rigid evolution settings. Lengths are in centimeters, matching the
/// default gravity of 980 cm/s².
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigidEvolutionConfig {
    /// When false every step returns immediately.
    pub enabled: bool,
    pub gravity: Vec3,
    /// Fraction of linear velocity removed per second.
    pub linear_drag: f64,
    pub angular_drag: f64,
    /// Gauss-Seidel sweeps over contacts and joints per step.
    pub iterations: usize,
    pub push_out_iterations: usize,
    /// Re-evaluations of one contact within a push-out sweep.
    pub push_out_pair_iterations: usize,
    /// Hold the lower body of a stacked pair fixed during the last contact
    /// iteration and the last push-out sweep.
    pub shock_propagation: bool,
    /// Contacts are created and resolved up to this separation.
    pub collision_thickness: f64,
    pub restitution: f64,
    pub friction: f64,
    /// Bodies faster than this report trailing events.
    pub trailing_speed_threshold: f64,
    pub collision_events: bool,
    pub trailing_events: bool,
    pub graph: ContactGraphConfig,
}

impl Default for RigidEvolutionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            gravity: Vec3::new(0.0, 0.0, -980.0),
            linear_drag: 0.0,
            angular_drag: 0.0,
            iterations: 4,
            push_out_iterations: 3,
            push_out_pair_iterations: 2,
            shock_propagation: true,
            collision_thickness: 0.0,
            restitution: 0.0,
            friction: 0.5,
            trailing_speed_threshold: 1000.0,
            collision_events: true,
            trailing_events: false,
            graph: ContactGraphConfig::default(),
        }
    }
}

impl RigidEvolutionConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |what: &str| Err(RigidError::InvalidConfig(what.to_string()));
        if self.iterations == 0 {
            return invalid("iterations must be at least 1");
        }
        if !self.gravity.iter().all(|g| g.is_finite()) {
            return invalid("gravity must be finite");
        }
        if !(self.collision_thickness >= 0.0 && self.collision_thickness.is_finite()) {
            return invalid("collision thickness must be finite and non-negative");
        }
        if !(0.0..=1.0).contains(&self.restitution) {
            return invalid("restitution must lie in [0, 1]");
        }
        if !(self.friction >= 0.0 && self.friction.is_finite()) {
            return invalid("friction must be finite and non-negative");
        }
        if !(self.linear_drag >= 0.0 && self.angular_drag >= 0.0) {
            return invalid("drag must be non-negative");
        }
        Ok(())
    }
}
