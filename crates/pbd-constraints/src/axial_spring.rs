//! Area-preserving axial springs.
//!
//! Each triangle contributes one spring from a vertex to a point on the
//! opposite edge. The vertex is chosen at setup so that its projection
//! falls as close to the middle of the opposite edge as possible.

use crate::error::{check_indices, check_stiffness};
use crate::{ConstraintRule, Result};
use pbd_math::{SMALL_NUMBER, Vec3};
use pbd_particles::PbdParticles;

#[derive(Debug, Clone)]
pub struct AxialSpringConstraints {
    /// `[apex, edge0, edge1]`.
    constraints: Vec<[usize; 3]>,
    /// Weight of `edge0` in the edge point.
    barys: Vec<f64>,
    rest_lengths: Vec<f64>,
    stiffness: f64,
}

/// Projection parameter of `p` onto segment `a`-`b`, as the weight of `a`.
fn edge_weight(p: &Vec3, a: &Vec3, b: &Vec3) -> f64 {
    let ab = b - a;
    let len_sq = ab.norm_squared();
    if len_sq < SMALL_NUMBER {
        return 0.5;
    }
    1.0 - ((p - a).dot(&ab) / len_sq).clamp(0.0, 1.0)
}

impl AxialSpringConstraints {
    pub fn new(particles: &PbdParticles, triangles: &[[usize; 3]], stiffness: f64) -> Result<Self> {
        let stiffness = check_stiffness(stiffness)?;
        let mut constraints = Vec::with_capacity(triangles.len());
        let mut barys = Vec::with_capacity(triangles.len());
        let mut rest_lengths = Vec::with_capacity(triangles.len());
        for (c, tri) in triangles.iter().enumerate() {
            check_indices(c, tri, particles.len())?;
            let x = &particles.x;
            let rotations = [
                [tri[0], tri[1], tri[2]],
                [tri[1], tri[2], tri[0]],
                [tri[2], tri[0], tri[1]],
            ];
            let (best, bary) = rotations
                .iter()
                .map(|&[p, a, b]| ([p, a, b], edge_weight(&x[p], &x[a], &x[b])))
                .min_by(|l, r| (l.1 - 0.5).abs().total_cmp(&(r.1 - 0.5).abs()))
                .unwrap_or(([tri[0], tri[1], tri[2]], 0.5));
            let [p, a, b] = best;
            let edge_point = x[a] * bary + x[b] * (1.0 - bary);
            constraints.push(best);
            barys.push(bary);
            rest_lengths.push((x[p] - edge_point).norm());
        }
        Ok(Self {
            constraints,
            barys,
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

    pub fn apply_single(&self, particles: &mut PbdParticles, index: usize) {
        let [i1, i2, i3] = self.constraints[index];
        let bary = self.barys[index];
        let (w1, w2, w3) = (particles.inv_m[i1], particles.inv_m[i2], particles.inv_m[i3]);
        let combined = w1 + bary * bary * w2 + (1.0 - bary) * (1.0 - bary) * w3;
        if combined <= 0.0 {
            return;
        }
        let edge_point = particles.p[i2] * bary + particles.p[i3] * (1.0 - bary);
        let direction = particles.p[i1] - edge_point;
        let distance = direction.norm();
        if distance < SMALL_NUMBER {
            return;
        }
        let delta =
            direction * (self.stiffness * (distance - self.rest_lengths[index]) / (distance * combined));
        if w1 > 0.0 {
            particles.p[i1] -= delta * w1;
        }
        if w2 > 0.0 {
            particles.p[i2] += delta * (bary * w2);
        }
        if w3 > 0.0 {
            particles.p[i3] += delta * ((1.0 - bary) * w3);
        }
    }
}

impl ConstraintRule for AxialSpringConstraints {
    fn apply(&self, particles: &mut PbdParticles, _dt: f64) {
        for index in 0..self.constraints.len() {
            self.apply_single(particles, index);
        }
    }
}
