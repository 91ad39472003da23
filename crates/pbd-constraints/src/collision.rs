//! Particle collisions against kinematic geometry, plus friction.

use crate::Result;
use crate::error::check_thickness;
use pbd_math::{SMALL_NUMBER, Vec3};
use pbd_particles::{KinematicGeometryParticles, PbdParticles, parallel};
use serde::{Deserialize, Serialize};

/// What a particle hit during a step. The normal and proxy are from the
/// latest sweep that touched it; the correction sums every sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleContact {
    /// Outward surface normal at the contact.
    pub normal: Vec3,
    /// Velocity of the proxy surface at the contact point.
    pub proxy_velocity: Vec3,
    /// Total positional push-out so far this step.
    pub correction: f64,
    pub proxy: usize,
}

/// Projects particles out of every proxy to `thickness` above its surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerParticleCollision {
    pub thickness: f64,
}

impl PerParticleCollision {
    pub fn new(thickness: f64) -> Result<Self> {
        Ok(Self {
            thickness: check_thickness(thickness)?,
        })
    }

    /// Resolve all particles against all proxies. `contacts` is indexed by
    /// particle and accumulates push-out until the caller clears it;
    /// `collided` is indexed by proxy and only ever set.
    pub fn apply(
        &self,
        particles: &mut PbdParticles,
        proxies: &KinematicGeometryParticles,
        contacts: &mut [Option<ParticleContact>],
        collided: &mut [bool],
    ) {
        if proxies.is_empty() {
            return;
        }
        let thickness = self.thickness;
        let view = &*particles;
        let resolved = parallel::map(view.len(), |i| {
            if !view.is_dynamic(i) {
                return None;
            }
            let mut p = view.p[i];
            let mut contact: Option<ParticleContact> = None;
            let mut touched = Vec::new();
            for j in 0..proxies.len() {
                let (phi, normal) = proxies.phi_with_normal(j, &p);
                if phi >= thickness {
                    continue;
                }
                let push = thickness - phi;
                p += normal * push;
                touched.push(j);
                let correction = contact.map_or(0.0, |c| c.correction) + push;
                contact = Some(ParticleContact {
                    normal,
                    proxy_velocity: proxies.velocity_at(j, &p),
                    correction,
                    proxy: j,
                });
            }
            contact.map(|c| (p, c, touched))
        });

        for (i, hit) in resolved.into_iter().enumerate() {
            let Some((p, contact, touched)) = hit else {
                continue;
            };
            particles.p[i] = p;
            let earlier = contacts[i].map_or(0.0, |c| c.correction);
            contacts[i] = Some(ParticleContact {
                correction: earlier + contact.correction,
                ..contact
            });
            for j in touched {
                if let Some(flag) = collided.get_mut(j) {
                    *flag = true;
                }
            }
        }
    }
}

/// Coulomb friction on velocities, using contacts recorded by
/// [`PerParticleCollision`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerParticleFriction {
    pub coefficient: f64,
}

impl PerParticleFriction {
    pub fn new(coefficient: f64) -> Self {
        Self {
            coefficient: coefficient.max(0.0),
        }
    }

    /// Tangential velocity relative to the proxy loses at most
    /// `coefficient * correction / dt`; below that it sticks.
    pub fn apply_single(&self, v: &mut Vec3, contact: &ParticleContact, dt: f64) {
        let relative = *v - contact.proxy_velocity;
        let normal_part = contact.normal * relative.dot(&contact.normal);
        let tangent = relative - normal_part;
        let speed = tangent.norm();
        if speed < SMALL_NUMBER {
            return;
        }
        let normal_speed = contact.correction / dt;
        let scale = (1.0 - self.coefficient * normal_speed / speed).max(0.0);
        *v = contact.proxy_velocity + normal_part + tangent * scale;
    }

    pub fn apply(&self, particles: &mut PbdParticles, contacts: &[Option<ParticleContact>], dt: f64) {
        if self.coefficient <= 0.0 || dt <= 0.0 {
            return;
        }
        let inv_m = &particles.inv_m;
        parallel::for_each_mut(&mut particles.v, |i, v| {
            if inv_m[i] <= 0.0 {
                return;
            }
            if let Some(contact) = contacts.get(i).copied().flatten() {
                self.apply_single(v, &contact, dt);
            }
        });
    }
}
