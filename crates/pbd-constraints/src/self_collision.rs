//! Transient springs that keep cloth from passing through itself.
//!
//! Rebuilt every step from the predicted positions: each dynamic particle
//! sweeps from `x` to `p` against the cloth's own triangles, and a hit (or
//! a near miss within the thickness) becomes a point/triangle spring that
//! holds the particle on the side it started from.

use crate::error::{check_indices, check_stiffness, check_thickness};
use crate::{ConstraintRule, Result};
use pbd_geometry::{Aabb, SpatialHash, Triangle};
use pbd_math::Vec3;
use pbd_particles::{PbdParticles, parallel};
use std::collections::HashSet;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Contact {
    /// `[particle, a, b, c]`.
    indices: [usize; 4],
    bary: Vec3,
    normal: Vec3,
}

#[derive(Debug, Clone, Default)]
pub struct CollisionSpringConstraints {
    contacts: Vec<Contact>,
    thickness: f64,
    stiffness: f64,
}

impl CollisionSpringConstraints {
    /// Detect point/triangle contacts. `disabled` holds unordered particle
    /// pairs that must never collide, typically mesh neighbours.
    pub fn new(
        particles: &PbdParticles,
        triangles: &[[usize; 3]],
        disabled: &HashSet<(usize, usize)>,
        thickness: f64,
        stiffness: f64,
    ) -> Result<Self> {
        let stiffness = check_stiffness(stiffness)?;
        let thickness = check_thickness(thickness)?;
        for (t, tri) in triangles.iter().enumerate() {
            check_indices(t, tri, particles.len())?;
        }
        if triangles.is_empty() {
            return Ok(Self {
                contacts: Vec::new(),
                thickness,
                stiffness,
            });
        }

        let boxes: Vec<Aabb> = triangles
            .iter()
            .map(|&[a, b, c]| {
                Triangle::new(particles.p[a], particles.p[b], particles.p[c])
                    .bounding_box()
                    .thicken(thickness)
            })
            .collect();
        let mean_extent = boxes.iter().map(|b| b.extents().max()).sum::<f64>() / boxes.len() as f64;
        let hash = SpatialHash::new(mean_extent.max(thickness), &boxes);

        let is_disabled =
            |i: usize, j: usize| disabled.contains(&(i, j)) || disabled.contains(&(j, i));

        let found = parallel::map(particles.len(), |i| {
            if !particles.is_dynamic(i) {
                return None;
            }
            let (x, p) = (particles.x[i], particles.p[i]);
            let mut query = Aabb::from_point(x);
            query.grow_to_include(&p);
            let query = query.thicken(thickness);

            let mut best: Option<(f64, Contact)> = None;
            for t in hash.query(&query) {
                let tri = triangles[t];
                if tri.iter().any(|&v| v == i || is_disabled(i, v)) {
                    continue;
                }
                let [a, b, c] = tri;
                let now = Triangle::new(particles.p[a], particles.p[b], particles.p[c]);
                let Some(normal) = now.normal() else {
                    continue;
                };
                // Rank sweeps ahead of proximity hits.
                let (score, bary) = match now.intersect_segment(&x, &p) {
                    Some(hit) => (hit.time - 1.0, hit.bary),
                    None => {
                        let (closest, bary) = now.closest_point(&p);
                        let distance = (p - closest).norm();
                        if distance >= thickness {
                            continue;
                        }
                        (distance, bary)
                    }
                };
                if best.as_ref().is_some_and(|(s, _)| *s <= score) {
                    continue;
                }
                let before = Triangle::new(particles.x[a], particles.x[b], particles.x[c]);
                let side = (x - before.point_at(&bary)).dot(&normal);
                let normal = if side < 0.0 { -normal } else { normal };
                best = Some((
                    score,
                    Contact {
                        indices: [i, a, b, c],
                        bary,
                        normal,
                    },
                ));
            }
            best.map(|(_, contact)| contact)
        });

        let contacts: Vec<Contact> = found.into_iter().flatten().collect();
        trace!(count = contacts.len(), "self-collision contacts");
        Ok(Self {
            contacts,
            thickness,
            stiffness,
        })
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    /// `[particle, a, b, c]` of every contact.
    pub fn constraints(&self) -> impl Iterator<Item = [usize; 4]> + '_ {
        self.contacts.iter().map(|c| c.indices)
    }

    pub fn apply_single(&self, particles: &mut PbdParticles, index: usize) {
        let Contact {
            indices: [i, a, b, c],
            bary,
            normal,
        } = self.contacts[index];
        let q = particles.p[a] * bary.x + particles.p[b] * bary.y + particles.p[c] * bary.z;
        let depth = (particles.p[i] - q).dot(&normal);
        if depth >= self.thickness {
            return;
        }
        let w = [particles.inv_m[i], particles.inv_m[a], particles.inv_m[b], particles.inv_m[c]];
        let combined = w[0] + bary.x * bary.x * w[1] + bary.y * bary.y * w[2] + bary.z * bary.z * w[3];
        if combined <= 0.0 {
            return;
        }
        let lambda = self.stiffness * (self.thickness - depth) / combined;
        particles.p[i] += normal * (w[0] * lambda);
        particles.p[a] -= normal * (bary.x * w[1] * lambda);
        particles.p[b] -= normal * (bary.y * w[2] * lambda);
        particles.p[c] -= normal * (bary.z * w[3] * lambda);
    }
}

impl ConstraintRule for CollisionSpringConstraints {
    fn apply(&self, particles: &mut PbdParticles, _dt: f64) {
        for k in 0..self.contacts.len() {
            self.apply_single(particles, k);
        }
    }
}
