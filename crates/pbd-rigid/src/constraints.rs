//! User constraints between rigid bodies.

use crate::error::check_body;
use crate::{BodyState, IslandBodies, Result, RigidError};
use pbd_math::{SMALL_NUMBER, Vec3};
use pbd_particles::RigidParticles;
use tracing::warn;

/// A set of constraints solved alongside contacts.
///
/// Every joined pair is reported through [`connections`] so that both
/// bodies land in one island; `apply` then sees whole constraints only.
///
/// [`connections`]: RigidConstraintRule::connections
pub trait RigidConstraintRule: Send + Sync {
    fn connections(&self) -> Vec<[usize; 2]>;

    /// Apply the constraints whose bodies are in `island`.
    fn apply(&self, island: &mut IslandBodies, dt: f64);
}

/// Distance constraints between body-local anchor points.
#[derive(Debug, Clone)]
pub struct RigidSpringConstraints {
    constraints: Vec<[usize; 2]>,
    anchors: Vec<[Vec3; 2]>,
    rest_lengths: Vec<f64>,
    stiffness: f64,
}

impl RigidSpringConstraints {
    /// Join each pair at the given world-space anchors. Anchors are stored
    /// in body frame at the current pose; the current anchor distance
    /// becomes the rest length.
    pub fn new(
        particles: &RigidParticles,
        constraints: Vec<[usize; 2]>,
        world_anchors: &[[Vec3; 2]],
        stiffness: f64,
    ) -> Result<Self> {
        if world_anchors.len() != constraints.len() {
            return Err(RigidError::LengthMismatch {
                what: "anchors",
                expected: constraints.len(),
                found: world_anchors.len(),
            });
        }
        if !(stiffness > 0.0 && stiffness.is_finite()) {
            return Err(RigidError::InvalidConfig(format!(
                "spring stiffness must be positive, got {stiffness}"
            )));
        }
        let stiffness = if stiffness > 1.0 {
            warn!(stiffness, "spring stiffness clamped to 1");
            1.0
        } else {
            stiffness
        };

        let mut anchors = Vec::with_capacity(constraints.len());
        let mut rest_lengths = Vec::with_capacity(constraints.len());
        for (&[a, b], world) in constraints.iter().zip(world_anchors) {
            check_body(a, particles.len())?;
            check_body(b, particles.len())?;
            anchors.push([
                particles.transform(a).inverse_transform_position(&world[0]),
                particles.transform(b).inverse_transform_position(&world[1]),
            ]);
            rest_lengths.push((world[0] - world[1]).norm());
        }
        Ok(Self {
            constraints,
            anchors,
            rest_lengths,
            stiffness,
        })
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn rest_lengths(&self) -> &[f64] {
        &self.rest_lengths
    }

    /// Move both anchors toward the rest distance, splitting the correction
    /// by generalized inverse mass.
    pub fn apply_single(&self, a: &mut BodyState, b: &mut BodyState, index: usize) {
        let [la, lb] = self.anchors[index];
        let wa = a.predicted_transform().transform_position(&la);
        let wb = b.predicted_transform().transform_position(&lb);
        let delta = wa - wb;
        let distance = delta.norm();
        if distance < SMALL_NUMBER {
            return;
        }
        let n = delta / distance;
        let (ra, rb) = (wa - a.p, wb - b.p);

        let generalized = |body: &BodyState, r: &Vec3| {
            if !body.is_dynamic {
                return 0.0;
            }
            let arm = r.cross(&n);
            body.inv_m + arm.dot(&(body.world_inv_inertia() * arm))
        };
        let weight = generalized(a, &ra) + generalized(b, &rb);
        if weight < SMALL_NUMBER {
            return;
        }
        let lambda = -self.stiffness * (distance - self.rest_lengths[index]) / weight;
        a.apply_position_impulse(&(n * lambda), &ra);
        b.apply_position_impulse(&(n * -lambda), &rb);
    }
}

impl RigidConstraintRule for RigidSpringConstraints {
    fn connections(&self) -> Vec<[usize; 2]> {
        self.constraints.clone()
    }

    fn apply(&self, island: &mut IslandBodies, _dt: f64) {
        for (index, &[a, b]) in self.constraints.iter().enumerate() {
            if let Some((body_a, body_b)) = island.pair_mut(a, b) {
                self.apply_single(body_a, body_b, index);
            }
        }
    }
}
