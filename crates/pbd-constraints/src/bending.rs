//! Dihedral bending over pairs of edge-sharing triangles.
//!
//! Angle gradients follow Bridson, Marino and Fedkiw, "Simulation of
//! Clothing with Folds and Wrinkles" (2003), which stay well defined for
//! a flat pair where the arccos form does not.

use crate::error::{check_indices, check_stiffness};
use crate::{ConstraintRule, Result};
use pbd_math::{SMALL_NUMBER, Vec3};
use pbd_mesh::TriangleMesh;
use pbd_particles::PbdParticles;
use std::f64::consts::PI;

#[derive(Debug, Clone)]
pub struct BendingConstraints {
    /// `[edge0, edge1, wing0, wing1]`.
    constraints: Vec<[usize; 4]>,
    rest_angles: Vec<f64>,
    stiffness: f64,
}

/// Signed dihedral angle and its gradient for each of `[e0, e1, w0, w1]`.
fn angle_and_gradients(p: &[Vec3], [e0, e1, w0, w1]: [usize; 4]) -> Option<(f64, [Vec3; 4])> {
    let (x1, x2, x3, x4) = (p[w0], p[w1], p[e0], p[e1]);
    let edge = x4 - x3;
    let edge_len = edge.norm();
    if edge_len < SMALL_NUMBER {
        return None;
    }
    let n1 = (x1 - x3).cross(&(x1 - x4));
    let n2 = (x2 - x4).cross(&(x2 - x3));
    let (n1_sq, n2_sq) = (n1.norm_squared(), n2.norm_squared());
    if n1_sq < SMALL_NUMBER || n2_sq < SMALL_NUMBER {
        return None;
    }
    let edge_dir = edge / edge_len;
    let angle = n2.cross(&n1).dot(&edge_dir).atan2(n1.dot(&n2));

    let m1 = n1 / n1_sq;
    let m2 = n2 / n2_sq;
    let u1 = m1 * edge_len;
    let u2 = m2 * edge_len;
    let u3 = m1 * (x1 - x4).dot(&edge_dir) + m2 * (x2 - x4).dot(&edge_dir);
    let u4 = -(m1 * (x1 - x3).dot(&edge_dir)) - m2 * (x2 - x3).dot(&edge_dir);
    Some((angle, [u3, u4, u1, u2]))
}

/// Wrap an angle difference into (-π, π].
fn wrap(angle: f64) -> f64 {
    let mut a = angle;
    while a > PI {
        a -= 2.0 * PI;
    }
    while a <= -PI {
        a += 2.0 * PI;
    }
    a
}

impl BendingConstraints {
    pub fn new(particles: &PbdParticles, constraints: Vec<[usize; 4]>, stiffness: f64) -> Result<Self> {
        let stiffness = check_stiffness(stiffness)?;
        for (c, quad) in constraints.iter().enumerate() {
            check_indices(c, quad, particles.len())?;
        }
        let rest_angles = constraints
            .iter()
            .map(|&q| angle_and_gradients(&particles.x, q).map_or(0.0, |(a, _)| a))
            .collect();
        Ok(Self {
            constraints,
            rest_angles,
            stiffness,
        })
    }

    /// One element per pair of edge-sharing triangles.
    pub fn from_mesh(particles: &PbdParticles, mesh: &TriangleMesh, stiffness: f64) -> Result<Self> {
        Self::new(particles, mesh.unique_adjacent_elements(), stiffness)
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Current dihedral angle of element `index` at the predicted positions.
    pub fn angle(&self, particles: &PbdParticles, index: usize) -> Option<f64> {
        angle_and_gradients(&particles.p, self.constraints[index]).map(|(a, _)| a)
    }

    pub fn apply_single(&self, particles: &mut PbdParticles, index: usize) {
        let quad = self.constraints[index];
        let Some((angle, gradients)) = angle_and_gradients(&particles.p, quad) else {
            return;
        };
        let weights = quad.map(|i| particles.inv_m[i]);
        let denominator: f64 = weights
            .iter()
            .zip(&gradients)
            .map(|(w, g)| w * g.norm_squared())
            .sum();
        if denominator < SMALL_NUMBER {
            return;
        }
        let lambda = -self.stiffness * wrap(angle - self.rest_angles[index]) / denominator;
        for ((&i, w), g) in quad.iter().zip(weights).zip(&gradients) {
            if w > 0.0 {
                particles.p[i] += g * (lambda * w);
            }
        }
    }
}

impl ConstraintRule for BendingConstraints {
    fn apply(&self, particles: &mut PbdParticles, _dt: f64) {
        for index in 0..self.constraints.len() {
            self.apply_single(particles, index);
        }
    }
}
