//! Long-range attachments: a one-sided tether from every dynamic particle
//! to its nearest kinematic anchor.

use crate::error::check_stiffness;
use crate::{ConstraintRule, Result};
use pbd_math::{SMALL_NUMBER, Vec3};
use pbd_mesh::{TriangleMesh, nearest_sources};
use pbd_particles::{PbdParticles, parallel};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How the rest distance to the anchor is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LongRangeMode {
    /// Straight-line distance.
    #[default]
    Euclidean,
    /// Shortest path along mesh edges.
    Geodesic,
}

#[derive(Debug, Clone)]
pub struct LongRangeConstraints {
    /// `[anchor, particle]`.
    constraints: Vec<[usize; 2]>,
    rest_lengths: Vec<f64>,
    stiffness: f64,
}

impl LongRangeConstraints {
    /// Build tethers per connected component of `mesh`. Components
    /// without a kinematic particle get none.
    pub fn new(
        particles: &PbdParticles,
        mesh: &TriangleMesh,
        stiffness: f64,
        mode: LongRangeMode,
    ) -> Result<Self> {
        let stiffness = check_stiffness(stiffness)?;
        let mut constraints = Vec::new();
        let mut rest_lengths = Vec::new();
        let x = &particles.x;

        match mode {
            LongRangeMode::Euclidean => {
                for component in mesh.connected_components() {
                    let anchors: Vec<usize> = component
                        .iter()
                        .copied()
                        .filter(|&i| i < particles.len() && !particles.is_dynamic(i))
                        .collect();
                    if anchors.is_empty() {
                        continue;
                    }
                    for &i in component.iter().filter(|&&i| i < particles.len()) {
                        if !particles.is_dynamic(i) {
                            continue;
                        }
                        let nearest = anchors
                            .iter()
                            .map(|&a| (a, (x[i] - x[a]).norm()))
                            .min_by(|l, r| l.1.total_cmp(&r.1));
                        if let Some((anchor, distance)) = nearest {
                            constraints.push([anchor, i]);
                            rest_lengths.push(distance);
                        }
                    }
                }
            }
            LongRangeMode::Geodesic => {
                let anchors: Vec<usize> = mesh
                    .vertices()
                    .into_iter()
                    .filter(|&i| i < particles.len() && !particles.is_dynamic(i))
                    .collect();
                let field = nearest_sources(&mesh.point_to_neighbors(), x, &anchors);
                for i in mesh.vertices() {
                    if i >= particles.len() || !particles.is_dynamic(i) {
                        continue;
                    }
                    if let Some(anchor) = field.source[i] {
                        constraints.push([anchor, i]);
                        rest_lengths.push(field.distance[i]);
                    }
                }
            }
        }

        debug!(count = constraints.len(), ?mode, "built long-range attachments");
        Ok(Self {
            constraints,
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

    pub fn constraints(&self) -> &[[usize; 2]] {
        &self.constraints
    }

    pub fn rest_lengths(&self) -> &[f64] {
        &self.rest_lengths
    }

    /// Corrected position of the tethered particle, if it is too far out.
    fn corrected(&self, particles: &PbdParticles, index: usize) -> Option<Vec3> {
        let [anchor, i] = self.constraints[index];
        let offset = particles.p[i] - particles.p[anchor];
        let distance = offset.norm();
        let rest = self.rest_lengths[index];
        if distance <= rest || distance < SMALL_NUMBER {
            return None;
        }
        let target = particles.p[anchor] + offset * (rest / distance);
        Some(particles.p[i] + (target - particles.p[i]) * self.stiffness)
    }

    pub fn apply_single(&self, particles: &mut PbdParticles, index: usize) {
        if let Some(p) = self.corrected(particles, index) {
            particles.p[self.constraints[index][1]] = p;
        }
    }
}

impl ConstraintRule for LongRangeConstraints {
    /// Each dynamic particle has at most one tether, so all corrections
    /// are computed in parallel and then written.
    fn apply(&self, particles: &mut PbdParticles, _dt: f64) {
        let view = &*particles;
        let corrections = parallel::map(self.constraints.len(), |k| self.corrected(view, k));
        for (k, correction) in corrections.into_iter().enumerate() {
            if let Some(p) = correction {
                particles.p[self.constraints[k][1]] = p;
            }
        }
    }
}
