//! Rigid narrow phase and contact detection.

use crate::{BodyState, RigidContact};
use pbd_geometry::{Aabb, Implicit, sweep_and_prune};
use pbd_math::{KINDA_SMALL_NUMBER, RigidTransform, Vec3};
use pbd_particles::{RigidParticles, parallel};
use tracing::trace;

/// Closest approach between two bodies at their predicted poses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactPoint {
    pub phi: f64,
    /// From `b` toward `a`.
    pub normal: Vec3,
    pub location: Vec3,
}

fn world_phi(shape: &Implicit, transform: &RigidTransform, x: &Vec3) -> (f64, Vec3) {
    let local = transform.inverse_transform_position(x);
    let (phi, normal) = shape.phi_with_normal(&local);
    (phi, transform.transform_vector(&normal))
}

fn sphere(shape: &Implicit) -> Option<(Vec3, f64)> {
    match shape {
        Implicit::Sphere { center, radius } => Some((*center, *radius)),
        _ => None,
    }
}

/// Evaluate the contact between `a` and `b`.
///
/// A sphere against anything is analytic: its center queried against the
/// other shape, less the radius. Otherwise the deepest surface sample of
/// either body inside the other wins. `None` when either body has no
/// shape or neither has surface samples.
pub fn contact_between(a: &BodyState, b: &BodyState) -> Option<ContactPoint> {
    let (shape_a, shape_b) = (a.geometry.as_deref()?, b.geometry.as_deref()?);
    let (ta, tb) = (a.predicted_transform(), b.predicted_transform());

    if let Some((center, radius)) = sphere(shape_a) {
        let c = ta.transform_position(&center);
        let (phi, normal) = world_phi(shape_b, &tb, &c);
        return Some(ContactPoint {
            phi: phi - radius,
            normal,
            location: c - normal * radius,
        });
    }
    if let Some((center, radius)) = sphere(shape_b) {
        let c = tb.transform_position(&center);
        let (phi, normal) = world_phi(shape_a, &ta, &c);
        return Some(ContactPoint {
            phi: phi - radius,
            normal: -normal,
            location: c + normal * radius,
        });
    }

    let mut best: Option<ContactPoint> = None;
    let mut consider = |candidate: ContactPoint| {
        if best.is_none_or(|b| candidate.phi < b.phi) {
            best = Some(candidate);
        }
    };
    for sample in shape_a.surface_samples() {
        let x = ta.transform_position(&sample);
        let (phi, normal) = world_phi(shape_b, &tb, &x);
        consider(ContactPoint { phi, normal, location: x });
    }
    for sample in shape_b.surface_samples() {
        let x = tb.transform_position(&sample);
        let (phi, normal) = world_phi(shape_a, &ta, &x);
        consider(ContactPoint {
            phi,
            normal: -normal,
            location: x,
        });
    }
    best
}

/// Refresh a contact's geometry in place. Returns false when the pair no
/// longer yields a contact point.
pub fn update_contact(a: &BodyState, b: &BodyState, contact: &mut RigidContact) -> bool {
    match contact_between(a, b) {
        Some(point) => {
            contact.phi = point.phi;
            contact.normal = point.normal;
            contact.location = point.location;
            true
        }
        None => false,
    }
}

fn participates(particles: &RigidParticles, i: usize) -> bool {
    !particles.disabled[i] && particles.geometry[i].is_some()
}

/// Upper bound on how far any point of body `i` travels from `x` to `p`.
fn motion_bound(particles: &RigidParticles, i: usize) -> f64 {
    let reach = particles.geometry[i]
        .as_ref()
        .and_then(|shape| shape.bounding_box())
        .map_or(0.0, |b| b.min.abs().sup(&b.max.abs()).norm());
    (particles.p[i] - particles.x[i]).norm() + particles.r[i].angle_to(&particles.q[i]) * reach
}

/// Find every contact that could close within the step.
///
/// A pair is kept while its gap at the predicted poses is below
/// `thickness` plus the distance the two bodies travel this step, so a
/// contact separating under gravity or push-out stays in the set. Resting
/// pairs sit exactly at `thickness`; a small slop keeps them. Pairs need
/// at least one awake dynamic body; a sleeping body touched by an awake
/// one is kept so the graph can wake it.
pub fn detect_contacts(particles: &RigidParticles, thickness: f64) -> Vec<RigidContact> {
    let tolerance = thickness + KINDA_SMALL_NUMBER;
    let motion: Vec<f64> = (0..particles.len()).map(|i| motion_bound(particles, i)).collect();
    let bounds: Vec<Option<Aabb>> = (0..particles.len())
        .map(|i| {
            let bounds = particles.world_bounds(i)?;
            Some(
                bounds
                    .thicken_along(&(particles.p[i] - particles.x[i]))
                    .thicken(tolerance + motion[i]),
            )
        })
        .collect();

    let pairs: Vec<(usize, usize)> = sweep_and_prune(&bounds)
        .into_iter()
        .filter(|&(i, j)| {
            participates(particles, i)
                && participates(particles, j)
                && (particles.is_active_dynamic(i) || particles.is_active_dynamic(j))
        })
        .collect();

    let contacts: Vec<RigidContact> = parallel::map_slice(&pairs, |&(i, j)| {
        // Keep a dynamic body first so its side of the normal is the one pushed.
        let (i, j) = if particles.is_dynamic(i) { (i, j) } else { (j, i) };
        let a = BodyState::from_particles(particles, i);
        let b = BodyState::from_particles(particles, j);
        let point = contact_between(&a, &b)?;
        (point.phi < tolerance + motion[i] + motion[j])
            .then(|| RigidContact::new([i, j], point.normal, point.location, point.phi))
    })
    .into_iter()
    .flatten()
    .collect();

    trace!(pairs = pairs.len(), contacts = contacts.len(), "narrow phase");
    contacts
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pbd_particles::RigidBodyDesc;

    fn state(particles: &RigidParticles, i: usize) -> BodyState {
        BodyState::from_particles(particles, i)
    }

    #[test]
    fn sphere_sphere_is_analytic() {
        let mut particles = RigidParticles::new();
        let a = particles.add(
            RigidBodyDesc::dynamic(1.0)
                .with_position(Vec3::new(0.0, 0.0, 1.5))
                .with_geometry(Implicit::sphere(1.0)),
        );
        let b = particles.add(RigidBodyDesc::fixed().with_geometry(Implicit::sphere(1.0)));

        let point = contact_between(&state(&particles, a), &state(&particles, b)).unwrap();
        assert_relative_eq!(point.phi, -0.5, epsilon = 1e-12);
        assert_relative_eq!(point.normal, Vec3::z(), epsilon = 1e-12);
        assert_relative_eq!(point.location, Vec3::new(0.0, 0.0, 0.5), epsilon = 1e-12);

        // Swapped order flips the normal.
        let point = contact_between(&state(&particles, b), &state(&particles, a)).unwrap();
        assert_relative_eq!(point.phi, -0.5, epsilon = 1e-12);
        assert_relative_eq!(point.normal, -Vec3::z(), epsilon = 1e-12);
    }

    #[test]
    fn box_on_plane_uses_deepest_corner() {
        let mut particles = RigidParticles::new();
        let cube = particles.add(
            RigidBodyDesc::dynamic(1.0)
                .with_position(Vec3::new(0.0, 0.0, 0.4))
                .with_geometry(Implicit::cuboid(Vec3::new(0.5, 0.5, 0.5))),
        );
        let floor = particles.add(
            RigidBodyDesc::fixed().with_geometry(Implicit::plane(Vec3::zeros(), Vec3::z())),
        );

        let point = contact_between(&state(&particles, cube), &state(&particles, floor)).unwrap();
        assert_relative_eq!(point.phi, -0.1, epsilon = 1e-12);
        assert_relative_eq!(point.normal, Vec3::z(), epsilon = 1e-12);
        assert_relative_eq!(point.location.z, -0.1, epsilon = 1e-12);
    }

    #[test]
    fn detection_skips_static_pairs_and_far_bodies() {
        let mut particles = RigidParticles::new();
        let floor = particles.add(
            RigidBodyDesc::fixed().with_geometry(Implicit::plane(Vec3::zeros(), Vec3::z())),
        );
        particles.add(
            RigidBodyDesc::fixed()
                .with_position(Vec3::new(5.0, 0.0, 0.0))
                .with_geometry(Implicit::sphere(1.0)),
        );
        let ball = particles.add(
            RigidBodyDesc::dynamic(1.0)
                .with_position(Vec3::new(0.0, 0.0, 0.9))
                .with_geometry(Implicit::sphere(1.0)),
        );
        particles.add(
            RigidBodyDesc::dynamic(1.0)
                .with_position(Vec3::new(-5.0, 0.0, 3.0))
                .with_geometry(Implicit::sphere(1.0)),
        );

        let contacts = detect_contacts(&particles, 0.0);
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].particles, [ball, floor]);
        assert_relative_eq!(contacts[0].phi, -0.1, epsilon = 1e-12);
    }

    #[test]
    fn detection_keeps_pairs_separating_within_the_step() {
        let mut particles = RigidParticles::new();
        let floor = particles.add(
            RigidBodyDesc::fixed().with_geometry(Implicit::plane(Vec3::zeros(), Vec3::z())),
        );
        let ball = particles.add(
            RigidBodyDesc::dynamic(1.0)
                .with_position(Vec3::new(0.0, 0.0, 0.6))
                .with_geometry(Implicit::sphere(1.0)),
        );
        // Predicted 0.5 clear of the floor after moving up by 0.5.
        particles.p[ball] = Vec3::new(0.0, 0.0, 1.1);
        let contacts = detect_contacts(&particles, 0.0);
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].particles, [ball, floor]);
        assert_relative_eq!(contacts[0].phi, 0.1, epsilon = 1e-12);

        // Resting exactly at the thickness.
        particles.x[ball] = Vec3::new(0.0, 0.0, 1.25);
        particles.p[ball] = particles.x[ball];
        assert_eq!(detect_contacts(&particles, 0.25).len(), 1);

        particles.x[ball] = Vec3::new(0.0, 0.0, 1.4);
        particles.p[ball] = particles.x[ball];
        assert!(detect_contacts(&particles, 0.25).is_empty());
    }
}
