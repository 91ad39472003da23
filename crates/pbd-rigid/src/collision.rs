//! Rigid contact resolution: velocity impulses and position push-out.

use crate::body::contact_mass_matrix;
use crate::narrow_phase::{detect_contacts, update_contact};
use crate::{BodyState, RigidContact};
use pbd_math::{SMALL_NUMBER, Vec3, try_normalize};
use pbd_particles::RigidParticles;

/// Contact set for one step plus the material settings that resolve it.
#[derive(Debug, Clone, Default)]
pub struct RigidCollisionConstraints {
    pub thickness: f64,
    pub friction: f64,
    pub restitution: f64,
    /// Gravity magnitude; approach speeds below `2 g dt` count as resting
    /// and get no bounce.
    pub gravity: f64,
    constraints: Vec<RigidContact>,
}

impl RigidCollisionConstraints {
    pub fn new(thickness: f64, friction: f64, restitution: f64, gravity: f64) -> Self {
        Self {
            thickness,
            friction,
            restitution,
            gravity,
            constraints: Vec::new(),
        }
    }

    /// Replace the contact set with the contacts found at the predicted
    /// poses. Contacts between bodies that are still asleep are carried over
    /// with their impulses cleared, so a sleeping island keeps its edges.
    pub fn compute_constraints(&mut self, particles: &RigidParticles) {
        let resting = |i: usize| {
            i < particles.len() && !particles.disabled[i] && !particles.is_active_dynamic(i)
        };
        let carried: Vec<RigidContact> = self
            .constraints
            .iter()
            .filter(|c| {
                let [a, b] = c.particles;
                resting(a) && resting(b) && (particles.is_dynamic(a) || particles.is_dynamic(b))
            })
            .map(|c| RigidContact {
                accumulated_impulse: Vec3::zeros(),
                ..*c
            })
            .collect();
        self.constraints = detect_contacts(particles, self.thickness);
        self.constraints.extend(carried);
    }

    pub fn constraints(&self) -> &[RigidContact] {
        &self.constraints
    }

    pub fn constraints_mut(&mut self) -> &mut [RigidContact] {
        &mut self.constraints
    }

    pub fn clear(&mut self) {
        self.constraints.clear();
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    fn restitution_for(&self, normal_speed: f64, dt: f64) -> f64 {
        if -normal_speed < 2.0 * self.gravity * dt {
            0.0
        } else {
            self.restitution
        }
    }

    /// Resolve one contact at the velocity level.
    ///
    /// Refreshes the contact at the predicted poses, then applies an
    /// impulse that sets the normal speed to its target: the restitution
    /// bounce, or just enough approach to close the remaining gap. With
    /// friction the contact sticks inside the Coulomb cone and slides along
    /// its boundary outside it. The impulse is scaled down if it would add
    /// kinetic energy. Velocities change and both poses are re-predicted
    /// from them. Returns whether an impulse was applied.
    pub fn apply(&self, pair: &mut [BodyState; 2], contact: &mut RigidContact, dt: f64) -> bool {
        let [a, b] = pair;
        if !update_contact(a, b, contact) || contact.phi >= self.thickness {
            return false;
        }
        let n = contact.normal;
        let ra = contact.location - a.p;
        let rb = contact.location - b.p;
        let relative = a.point_velocity(&ra) - b.point_velocity(&rb);
        let normal_speed = relative.dot(&n);
        if normal_speed >= 0.0 {
            return false;
        }

        // The predicted pose sits `normal_speed * dt` past the committed
        // one; approach that stops at the surface never needs correcting.
        let closing = (normal_speed - (contact.phi - self.thickness) / dt).min(0.0);
        let restitution = self.restitution_for(normal_speed, dt);
        let target = if restitution > 0.0 {
            -restitution * normal_speed
        } else {
            closing
        };
        let speed_change = target - normal_speed;

        let k = contact_mass_matrix(a, &ra, b, &rb);
        let along = |direction: Vec3| {
            let denominator = n.dot(&(k * direction));
            (denominator > SMALL_NUMBER).then(|| direction * (speed_change / denominator))
        };

        let impulse = if self.friction > 0.0 {
            let Some(k_inv) = k.try_inverse() else {
                return false;
            };
            let impulse = k_inv * (n * target - relative);
            let normal_impulse = impulse.dot(&n);
            let tangential = impulse - n * normal_impulse;
            if tangential.norm() <= self.friction * normal_impulse {
                Some(impulse)
            } else {
                match try_normalize(&(relative - n * normal_speed)) {
                    Some(tangent) => along(n - tangent * self.friction),
                    None => along(n),
                }
            }
        } else {
            along(n)
        };
        let Some(impulse) = impulse else {
            return false;
        };

        let impulse = energy_clamped(a, &ra, b, &rb, impulse);
        a.apply_impulse(&impulse, &ra);
        b.apply_impulse(&-impulse, &rb);
        contact.accumulated_impulse += impulse;
        a.predict(dt);
        b.predict(dt);
        true
    }

    /// Push one contact out of residual penetration at the position level.
    ///
    /// The contact is re-evaluated up to `pair_iterations` times; each pass
    /// moves the contact points apart by `scaling` of the remaining depth.
    /// Returns whether anything moved.
    pub fn apply_push_out(
        &self,
        pair: &mut [BodyState; 2],
        contact: &mut RigidContact,
        pair_iterations: usize,
        scaling: f64,
    ) -> bool {
        let [a, b] = pair;
        let mut moved = false;
        for _ in 0..pair_iterations {
            if !update_contact(a, b, contact) || contact.phi >= self.thickness {
                break;
            }
            let ra = contact.location - a.p;
            let rb = contact.location - b.p;
            let Some(k_inv) = contact_mass_matrix(a, &ra, b, &rb).try_inverse() else {
                break;
            };
            let difference = contact.normal * ((self.thickness - contact.phi) * scaling);
            let impulse = k_inv * difference;
            a.apply_position_impulse(&impulse, &ra);
            b.apply_position_impulse(&-impulse, &rb);
            moved = true;
        }
        moved
    }
}

/// Scale `impulse` so the pair's kinetic energy does not grow.
///
/// Energy after applying `s * impulse` is quadratic in `s`; the largest
/// `s` in `[0, 1]` that keeps it at or below the current energy is used.
fn energy_clamped(a: &BodyState, ra: &Vec3, b: &BodyState, rb: &Vec3, impulse: Vec3) -> Vec3 {
    let mut linear = 0.0;
    let mut quadratic = 0.0;
    for (body, r, j) in [(a, ra, impulse), (b, rb, -impulse)] {
        if !body.is_dynamic {
            continue;
        }
        let dv = j * body.inv_m;
        let dw = body.world_inv_inertia() * r.cross(&j);
        let inertia = body.world_inertia();
        linear += body.m * body.v.dot(&dv) + body.w.dot(&(inertia * dw));
        quadratic += 0.5 * (body.m * dv.norm_squared() + dw.dot(&(inertia * dw)));
    }
    if quadratic <= 0.0 || linear + quadratic <= 0.0 {
        return impulse;
    }
    impulse * (-linear / quadratic).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pbd_geometry::Implicit;
    use pbd_particles::{RigidBodyDesc, sphere_inertia};

    const DT: f64 = 1.0 / 60.0;

    fn ball_on_floor(z: f64, velocity: Vec3) -> (RigidParticles, [BodyState; 2]) {
        let mut particles = RigidParticles::new();
        let ball = particles.add(
            RigidBodyDesc::dynamic(1.0)
                .with_inertia(sphere_inertia(1.0, 1.0))
                .with_position(Vec3::new(0.0, 0.0, z))
                .with_velocity(velocity)
                .with_geometry(Implicit::sphere(1.0)),
        );
        let floor = particles.add(
            RigidBodyDesc::fixed().with_geometry(Implicit::plane(Vec3::zeros(), Vec3::z())),
        );
        let mut pair = [
            BodyState::from_particles(&particles, ball),
            BodyState::from_particles(&particles, floor),
        ];
        pair[0].predict(DT);
        (particles, pair)
    }

    fn contact() -> RigidContact {
        RigidContact::new([0, 1], Vec3::z(), Vec3::zeros(), 0.0)
    }

    #[test]
    fn inelastic_impact_stops_normal_motion() {
        let (_, mut pair) = ball_on_floor(0.95, Vec3::new(0.0, 0.0, -100.0));
        let constraints = RigidCollisionConstraints::new(0.0, 0.0, 0.0, 980.0);
        let mut c = contact();
        assert!(constraints.apply(&mut pair, &mut c, DT));
        assert_relative_eq!(pair[0].v.z, 0.0, epsilon = 1e-9);
        assert_relative_eq!(c.accumulated_impulse, Vec3::new(0.0, 0.0, 100.0), epsilon = 1e-9);
        // Re-predicted from the new velocity.
        assert_relative_eq!(pair[0].p.z, 0.95, epsilon = 1e-9);
    }

    #[test]
    fn restitution_only_above_resting_speed() {
        let constraints = RigidCollisionConstraints::new(0.0, 0.0, 0.5, 980.0);

        let (_, mut pair) = ball_on_floor(0.95, Vec3::new(0.0, 0.0, -100.0));
        constraints.apply(&mut pair, &mut contact(), DT);
        assert_relative_eq!(pair[0].v.z, 50.0, epsilon = 1e-9);

        // 2 g dt is about 32.7: a slower approach does not bounce.
        let (_, mut pair) = ball_on_floor(0.95, Vec3::new(0.0, 0.0, -20.0));
        constraints.apply(&mut pair, &mut contact(), DT);
        assert_relative_eq!(pair[0].v.z, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn separating_contact_is_left_alone() {
        let (_, mut pair) = ball_on_floor(0.95, Vec3::new(0.0, 0.0, 5.0));
        let constraints = RigidCollisionConstraints::new(0.0, 0.5, 0.0, 980.0);
        let mut c = contact();
        assert!(!constraints.apply(&mut pair, &mut c, DT));
        assert!(!c.has_impulse());
        assert_relative_eq!(pair[0].v.z, 5.0);
    }

    #[test]
    fn friction_never_gains_energy() {
        let (_, mut pair) = ball_on_floor(0.95, Vec3::new(30.0, 0.0, -10.0));
        let before = pair[0].kinetic_energy();
        let constraints = RigidCollisionConstraints::new(0.0, 0.3, 0.0, 980.0);
        let mut c = contact();
        assert!(constraints.apply(&mut pair, &mut c, DT));
        assert!(pair[0].kinetic_energy() <= before + 1e-9);
        assert!(pair[0].v.z >= -1e-9);
        // Sliding: the tangential impulse sits on the cone boundary.
        let normal = c.accumulated_impulse.z;
        let tangential = c.accumulated_impulse.xy().norm();
        assert_relative_eq!(tangential, 0.3 * normal, epsilon = 1e-9);
        assert!(pair[0].v.x < 30.0);
    }

    #[test]
    fn slow_approach_closes_gap_exactly() {
        // 0.1 above the floor, falling 0.5 per step.
        let (_, mut pair) = ball_on_floor(1.1, Vec3::new(0.0, 0.0, -30.0));
        let constraints = RigidCollisionConstraints::new(0.0, 0.0, 0.0, 980.0);
        assert!(constraints.apply(&mut pair, &mut contact(), DT));
        assert_relative_eq!(pair[0].v.z, -6.0, epsilon = 1e-9);
        assert_relative_eq!(pair[0].p.z, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn sleeping_contacts_carry_over() {
        let (mut particles, _) = ball_on_floor(1.0, Vec3::zeros());
        let mut constraints = RigidCollisionConstraints::new(0.0, 0.0, 0.0, 980.0);
        constraints.compute_constraints(&particles);
        assert_eq!(constraints.len(), 1);
        constraints.constraints_mut()[0].accumulated_impulse = Vec3::z();

        particles.sleep(0);
        constraints.compute_constraints(&particles);
        assert_eq!(constraints.len(), 1);
        assert_eq!(constraints.constraints()[0].particles, [0, 1]);
        assert!(!constraints.constraints()[0].has_impulse());

        // Awake again: detected afresh, not duplicated.
        particles.wake(0);
        constraints.compute_constraints(&particles);
        assert_eq!(constraints.len(), 1);

        particles.sleep(0);
        particles.disabled[0] = true;
        constraints.compute_constraints(&particles);
        assert!(constraints.is_empty());
    }

    #[test]
    fn push_out_removes_penetration() {
        let (_, mut pair) = ball_on_floor(0.8, Vec3::zeros());
        let constraints = RigidCollisionConstraints::new(0.0, 0.0, 0.0, 980.0);
        let mut c = contact();
        assert!(constraints.apply_push_out(&mut pair, &mut c, 1, 1.0));
        assert_relative_eq!(pair[0].p.z, 1.0, epsilon = 1e-9);

        // Already separated: nothing to do.
        assert!(!constraints.apply_push_out(&mut pair, &mut c, 1, 1.0));
    }
}
