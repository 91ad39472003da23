//! The deformable step.

use crate::{DampVelocity, EvolutionConfig, ForceRule, Result};
use pbd_constraints::{
    CollisionSpringConstraints, ConstraintError, ConstraintRule, ParticleContact,
    PerParticleCollision, PerParticleFriction,
};
use pbd_geometry::Implicit;
use pbd_math::{RigidTransform, Vec3};
use pbd_particles::{KinematicGeometryParticles, PbdParticles, parallel};
use std::collections::HashSet;
use std::ops::Range;
use tracing::{debug, debug_span, trace, warn};

/// Target position of a kinematic particle: `(index, dt, local_time)`.
/// `None` leaves the particle where it is.
pub type KinematicParticleUpdate = dyn Fn(usize, f64, f64) -> Option<Vec3> + Send + Sync;

/// Target transform of a collision proxy: `(index, dt, local_time)`.
pub type KinematicProxyUpdate = dyn Fn(usize, f64, f64) -> Option<RigidTransform> + Send + Sync;

/// Owns a deformable particle store and everything that moves it.
pub struct PbdEvolution {
    particles: PbdParticles,
    collision_particles: KinematicGeometryParticles,
    collided: Vec<bool>,
    contacts: Vec<Option<ParticleContact>>,
    collision_triangles: Vec<[usize; 3]>,
    disabled_collision_elements: HashSet<(usize, usize)>,
    force_rules: Vec<Box<dyn ForceRule>>,
    constraint_rules: Vec<Box<dyn ConstraintRule>>,
    kinematic_update: Option<Box<KinematicParticleUpdate>>,
    collision_kinematic_update: Option<Box<KinematicProxyUpdate>>,
    damping: DampVelocity,
    collision: PerParticleCollision,
    friction: PerParticleFriction,
    config: EvolutionConfig,
    time: f64,
}

impl std::fmt::Debug for PbdEvolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PbdEvolution")
            .field("particles", &self.particles.len())
            .field("collision_particles", &self.collision_particles.len())
            .field("force_rules", &self.force_rules.len())
            .field("constraint_rules", &self.constraint_rules.len())
            .field("config", &self.config)
            .field("time", &self.time)
            .finish()
    }
}

impl PbdEvolution {
    pub fn new(particles: PbdParticles, config: EvolutionConfig) -> Result<Self> {
        config.validate()?;
        let n = particles.len();
        Ok(Self {
            particles,
            collision_particles: KinematicGeometryParticles::new(),
            collided: Vec::new(),
            contacts: vec![None; n],
            collision_triangles: Vec::new(),
            disabled_collision_elements: HashSet::new(),
            force_rules: Vec::new(),
            constraint_rules: Vec::new(),
            kinematic_update: None,
            collision_kinematic_update: None,
            damping: DampVelocity::new(config.damping),
            collision: PerParticleCollision::new(config.collision_thickness)?,
            friction: PerParticleFriction::new(config.friction),
            config,
            time: 0.0,
        })
    }

    pub fn particles(&self) -> &PbdParticles {
        &self.particles
    }

    /// Mutable access for setup. Constraints built earlier keep their
    /// indices, so particles should only be appended.
    pub fn particles_mut(&mut self) -> &mut PbdParticles {
        &mut self.particles
    }

    /// Append `n` unit-mass particles.
    pub fn add_particles(&mut self, n: usize) -> Range<usize> {
        let range = self.particles.add_particles(n);
        self.contacts.resize(self.particles.len(), None);
        range
    }

    pub fn collision_particles(&self) -> &KinematicGeometryParticles {
        &self.collision_particles
    }

    pub fn collision_particles_mut(&mut self) -> &mut KinematicGeometryParticles {
        &mut self.collision_particles
    }

    pub fn add_collision_particle(&mut self, geometry: Implicit, transform: RigidTransform) -> usize {
        let index = self.collision_particles.add(geometry, transform);
        self.collided.resize(self.collision_particles.len(), false);
        index
    }

    /// Drop collision proxies from `len` onward.
    pub fn truncate_collision_particles(&mut self, len: usize) {
        self.collision_particles.truncate(len);
        self.collided.truncate(self.collision_particles.len());
    }

    /// Whether each proxy was touched during the last step.
    pub fn collided(&self) -> &[bool] {
        &self.collided
    }

    /// Contact recorded per particle during the last step.
    pub fn contacts(&self) -> &[Option<ParticleContact>] {
        &self.contacts
    }

    pub fn add_force_rule(&mut self, rule: impl ForceRule + 'static) {
        self.force_rules.push(Box::new(rule));
    }

    /// Register a constraint; rules run in registration order.
    pub fn add_constraint_rule(&mut self, rule: impl ConstraintRule + 'static) {
        self.constraint_rules.push(Box::new(rule));
    }

    pub fn add_boxed_constraint_rule(&mut self, rule: Box<dyn ConstraintRule>) {
        self.constraint_rules.push(rule);
    }

    pub fn constraint_rule_count(&self) -> usize {
        self.constraint_rules.len()
    }

    pub fn set_kinematic_update(
        &mut self,
        update: impl Fn(usize, f64, f64) -> Option<Vec3> + Send + Sync + 'static,
    ) {
        self.kinematic_update = Some(Box::new(update));
    }

    pub fn set_collision_kinematic_update(
        &mut self,
        update: impl Fn(usize, f64, f64) -> Option<RigidTransform> + Send + Sync + 'static,
    ) {
        self.collision_kinematic_update = Some(Box::new(update));
    }

    /// Triangles checked for self-collision each step.
    pub fn set_collision_triangles(&mut self, triangles: Vec<[usize; 3]>) -> Result<()> {
        let count = self.particles.len();
        for (t, tri) in triangles.iter().enumerate() {
            if let Some(&index) = tri.iter().find(|&&i| i >= count) {
                return Err(ConstraintError::IndexOutOfBounds {
                    constraint: t,
                    index,
                    count,
                }
                .into());
            }
        }
        self.collision_triangles = triangles;
        Ok(())
    }

    pub fn collision_triangles(&self) -> &[[usize; 3]] {
        &self.collision_triangles
    }

    pub fn set_disabled_collision_elements(&mut self, pairs: HashSet<(usize, usize)>) {
        self.disabled_collision_elements = pairs;
    }

    pub fn disabled_collision_elements_mut(&mut self) -> &mut HashSet<(usize, usize)> {
        &mut self.disabled_collision_elements
    }

    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    pub fn set_iterations(&mut self, iterations: usize) {
        self.config.iterations = iterations;
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// Advance by `dt`. Zero is a no-op; negative is ignored with a warning.
    pub fn advance_one_time_step(&mut self, dt: f64) {
        if dt < 0.0 || !dt.is_finite() {
            warn!(dt, "ignoring invalid time step");
            return;
        }
        if dt == 0.0 {
            return;
        }
        let _span = debug_span!("pbd_step", time = self.time, dt).entered();
        let local_time = self.time + dt;

        self.damping.update(&self.particles);
        self.collided.iter_mut().for_each(|c| *c = false);
        self.contacts.clear();
        self.contacts.resize(self.particles.len(), None);

        self.integrate(dt, local_time);
        self.update_collision_particles(dt, local_time);

        let self_collisions = self.build_self_collisions();
        for _ in 0..self.config.iterations {
            for rule in &self.constraint_rules {
                rule.apply(&mut self.particles, dt);
            }
            if let Some(springs) = &self_collisions {
                springs.apply(&mut self.particles, dt);
            }
            self.collision.apply(
                &mut self.particles,
                &self.collision_particles,
                &mut self.contacts,
                &mut self.collided,
            );
        }

        self.commit(dt);
        if self.config.friction > 0.0 {
            self.friction.apply(&mut self.particles, &self.contacts, dt);
        }
        self.time = local_time;
    }

    /// Forces, kinematic targets, damping and prediction.
    fn integrate(&mut self, dt: f64, local_time: f64) {
        let particles = &self.particles;
        let force_rules = &self.force_rules;
        let kinematic_update = self.kinematic_update.as_deref();
        let damping = &self.damping;

        let states = parallel::map(particles.len(), |i| {
            let x = particles.x[i];
            let v = particles.v[i];
            if !particles.is_dynamic(i) {
                return match kinematic_update.and_then(|update| update(i, dt, local_time)) {
                    Some(target) => (Vec3::zeros(), (target - x) / dt, target),
                    None => (Vec3::zeros(), v, x),
                };
            }
            let f: Vec3 = force_rules
                .iter()
                .map(|rule| rule.force(i, &x, &v, particles.m[i]))
                .sum();
            let v = damping.apply(&x, &(v + f * (particles.inv_m[i] * dt)));
            (f, v, x + v * dt)
        });

        for (i, (f, v, p)) in states.into_iter().enumerate() {
            self.particles.f[i] = f;
            self.particles.v[i] = v;
            self.particles.p[i] = p;
        }
    }

    fn update_collision_particles(&mut self, dt: f64, local_time: f64) {
        let Some(update) = self.collision_kinematic_update.as_deref() else {
            return;
        };
        for j in 0..self.collision_particles.len() {
            if let Some(target) = update(j, dt, local_time) {
                self.collision_particles.move_to(j, target, dt);
            }
        }
    }

    fn build_self_collisions(&self) -> Option<CollisionSpringConstraints> {
        if self.collision_triangles.is_empty() {
            return None;
        }
        match CollisionSpringConstraints::new(
            &self.particles,
            &self.collision_triangles,
            &self.disabled_collision_elements,
            self.config.self_collision_thickness,
            self.config.self_collision_stiffness,
        ) {
            Ok(springs) => {
                trace!(contacts = springs.len(), "self-collision springs");
                Some(springs)
            }
            Err(err) => {
                debug!(%err, "self-collision skipped");
                None
            }
        }
    }

    /// `v = (p - x) / dt`, then `x = p`.
    fn commit(&mut self, dt: f64) {
        let PbdParticles { x, v, p, .. } = &mut self.particles;
        {
            let (x, p) = (&*x, &*p);
            parallel::for_each_mut(v, |i, v| *v = (p[i] - x[i]) / dt);
        }
        x.clone_from(p);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PerParticleGravity;
    use approx::assert_relative_eq;
    use pbd_constraints::SpringConstraints;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn no_damping() -> EvolutionConfig {
        EvolutionConfig {
            damping: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn zero_and_negative_dt_do_nothing() {
        let mut particles = PbdParticles::new();
        particles.add_particle(Vec3::zeros(), 1.0);
        particles.v[0] = Vec3::x();
        let mut evolution = PbdEvolution::new(particles, no_damping()).expect("valid");
        evolution.advance_one_time_step(0.0);
        evolution.advance_one_time_step(-1.0);
        assert_eq!(evolution.particles().x[0], Vec3::zeros());
        assert_eq!(evolution.time(), 0.0);
    }

    #[test]
    fn free_fall_velocity() {
        let mut particles = PbdParticles::new();
        particles.add_particle(Vec3::zeros(), 1.0);
        let mut evolution = PbdEvolution::new(particles, no_damping()).expect("valid");
        evolution.add_force_rule(PerParticleGravity::new(-Vec3::z(), 10.0));
        evolution.advance_one_time_step(0.5);
        assert_relative_eq!(evolution.particles().v[0], Vec3::new(0.0, 0.0, -5.0), epsilon = 1e-12);
        assert_relative_eq!(evolution.particles().x[0], Vec3::new(0.0, 0.0, -2.5), epsilon = 1e-12);
        assert_relative_eq!(evolution.time(), 0.5);
    }

    #[test]
    fn rules_run_once_per_iteration_in_order() {
        let mut particles = PbdParticles::new();
        particles.add_particle(Vec3::zeros(), 1.0);
        let config = EvolutionConfig {
            iterations: 3,
            ..no_damping()
        };
        let mut evolution = PbdEvolution::new(particles, config).expect("valid");
        let calls = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        for tag in 0..2 {
            let calls = calls.clone();
            let order = order.clone();
            evolution.add_constraint_rule(move |_: &mut PbdParticles, _: f64| {
                calls.fetch_add(1, Ordering::SeqCst);
                order.lock().expect("lock").push(tag);
            });
        }
        evolution.advance_one_time_step(0.1);
        assert_eq!(calls.load(Ordering::SeqCst), 6);
        assert_eq!(*order.lock().expect("lock"), vec![0, 1, 0, 1, 0, 1]);
    }

    #[test]
    fn kinematic_particles_follow_callback_only() {
        let mut particles = PbdParticles::new();
        particles.add_particle(Vec3::zeros(), 0.0);
        particles.add_particle(Vec3::new(0.0, 0.0, -1.0), 1.0);
        let spring = SpringConstraints::new(&particles, vec![[0, 1]], 1.0).expect("valid");
        let mut evolution = PbdEvolution::new(particles, EvolutionConfig::default()).expect("valid");
        evolution.add_force_rule(PerParticleGravity::new(-Vec3::z(), 980.0));
        evolution.add_constraint_rule(spring);

        for _ in 0..10 {
            evolution.advance_one_time_step(1.0 / 60.0);
        }
        assert_eq!(evolution.particles().x[0], Vec3::zeros());

        evolution.set_kinematic_update(|i, _dt, t| (i == 0).then(|| Vec3::new(t, 0.0, 0.0)));
        let before = evolution.time();
        evolution.advance_one_time_step(0.5);
        assert_relative_eq!(evolution.particles().x[0], Vec3::new(before + 0.5, 0.0, 0.0));
        assert_relative_eq!(
            evolution.particles().v[0],
            Vec3::new((before + 0.5) / 0.5, 0.0, 0.0),
            epsilon = 1e-9
        );
    }

    #[test]
    fn collides_with_proxy_and_flags_it() {
        let mut particles = PbdParticles::new();
        particles.add_particle(Vec3::new(0.0, 0.0, 0.05), 1.0);
        let config = EvolutionConfig {
            collision_thickness: 0.1,
            ..no_damping()
        };
        let mut evolution = PbdEvolution::new(particles, config).expect("valid");
        evolution.add_force_rule(PerParticleGravity::new(-Vec3::z(), 10.0));
        evolution.add_collision_particle(
            Implicit::plane(Vec3::zeros(), Vec3::z()),
            RigidTransform::identity(),
        );
        evolution.advance_one_time_step(0.1);
        assert_relative_eq!(evolution.particles().x[0].z, 0.1, epsilon = 1e-12);
        assert_eq!(evolution.collided(), &[true]);
        assert!(evolution.contacts()[0].is_some());
    }

    #[test]
    fn friction_uses_push_out_from_every_iteration() {
        let mut particles = PbdParticles::new();
        particles.add_particle(Vec3::zeros(), 1.0);
        particles.v[0] = Vec3::new(4.0, 0.0, 0.0);
        let config = EvolutionConfig {
            iterations: 3,
            friction: 1.0,
            ..no_damping()
        };
        let mut evolution = PbdEvolution::new(particles, config).expect("valid");
        evolution.add_constraint_rule(|particles: &mut PbdParticles, _: f64| particles.p[0].z -= 0.1);
        evolution.add_collision_particle(
            Implicit::plane(Vec3::zeros(), Vec3::z()),
            RigidTransform::identity(),
        );
        evolution.advance_one_time_step(0.1);

        let contact = evolution.contacts()[0].expect("contact");
        assert_relative_eq!(contact.correction, 0.3, epsilon = 1e-9);
        // Normal speed 3 takes 3 off the tangential 4.
        assert_relative_eq!(evolution.particles().v[0], Vec3::new(1.0, 0.0, 0.0), epsilon = 1e-9);
        assert_relative_eq!(evolution.particles().x[0], Vec3::new(0.4, 0.0, 0.0), epsilon = 1e-9);
    }

    #[test]
    fn out_of_range_triangles_rejected() {
        let mut particles = PbdParticles::new();
        particles.add_particles(3);
        let mut evolution = PbdEvolution::new(particles, EvolutionConfig::default()).expect("valid");
        assert!(evolution.set_collision_triangles(vec![[0, 1, 3]]).is_err());
        assert!(evolution.set_collision_triangles(vec![[0, 1, 2]]).is_ok());
    }
}
