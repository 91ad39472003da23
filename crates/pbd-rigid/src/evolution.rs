//! The rigid step.

use crate::{
    BreakEvent, CollisionEvent, EventCollector, IslandBodies, Result, RigidClustering,
    RigidCollisionConstraints, RigidConstraintRule, RigidContact, RigidEvolutionConfig,
    TrailingEvent,
};
use pbd_contact::ContactGraph;
use pbd_math::{RigidTransform, Rotation, Vec3, rotation, world_inertia};
use pbd_particles::{ParticleKind, RigidBodyDesc, RigidParticles, parallel};
use tracing::{debug, debug_span, trace, warn};

/// Target pose of a kinematic body: `(index, dt, local_time)`. `None`
/// lets the body coast on its current velocity.
pub type KinematicBodyUpdate = dyn Fn(usize, f64, f64) -> Option<RigidTransform> + Send + Sync;

pub type CollisionCallback = Box<dyn FnMut(&[CollisionEvent]) + Send>;
pub type BreakCallback = Box<dyn FnMut(&[BreakEvent]) + Send>;
pub type TrailingCallback = Box<dyn FnMut(&[TrailingEvent]) + Send>;

/// Predicted state of one body after integration.
struct Integrated {
    v: Vec3,
    w: Vec3,
    p: Vec3,
    q: Rotation,
}

/// Owns a rigid body store and advances it.
pub struct PbdRigidsEvolution {
    particles: RigidParticles,
    config: RigidEvolutionConfig,
    collisions: RigidCollisionConstraints,
    graph: ContactGraph,
    rules: Vec<Box<dyn RigidConstraintRule>>,
    clustering: RigidClustering,
    kinematic_update: Option<Box<KinematicBodyUpdate>>,
    events: EventCollector,
    collision_callback: Option<CollisionCallback>,
    break_callback: Option<BreakCallback>,
    trailing_callback: Option<TrailingCallback>,
    time: f64,
}

impl std::fmt::Debug for PbdRigidsEvolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PbdRigidsEvolution")
            .field("particles", &self.particles.len())
            .field("contacts", &self.collisions.len())
            .field("islands", &self.graph.islands().len())
            .field("constraint_rules", &self.rules.len())
            .field("clusters", &self.clustering.num_clusters())
            .field("config", &self.config)
            .field("time", &self.time)
            .finish()
    }
}

impl PbdRigidsEvolution {
    pub fn new(particles: RigidParticles, config: RigidEvolutionConfig) -> Result<Self> {
        config.validate()?;
        let collisions = RigidCollisionConstraints::new(
            config.collision_thickness,
            config.friction,
            config.restitution,
            config.gravity.norm(),
        );
        Ok(Self {
            particles,
            collisions,
            graph: ContactGraph::new(config.graph),
            rules: Vec::new(),
            clustering: RigidClustering::new(config.collision_thickness),
            kinematic_update: None,
            events: EventCollector::new(),
            collision_callback: None,
            break_callback: None,
            trailing_callback: None,
            time: 0.0,
            config,
        })
    }

    pub fn particles(&self) -> &RigidParticles {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut RigidParticles {
        &mut self.particles
    }

    pub fn add_body(&mut self, desc: RigidBodyDesc) -> usize {
        self.particles.add(desc)
    }

    pub fn config(&self) -> &RigidEvolutionConfig {
        &self.config
    }

    /// Turn the whole evolution on or off.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn graph(&self) -> &ContactGraph {
        &self.graph
    }

    /// Contacts from the last step, with their accumulated impulses.
    pub fn contacts(&self) -> &[RigidContact] {
        self.collisions.constraints()
    }

    pub fn clustering(&self) -> &RigidClustering {
        &self.clustering
    }

    pub fn create_cluster(&mut self, children: &[usize], strain_threshold: f64) -> Result<usize> {
        self.clustering
            .create_cluster(&mut self.particles, children, strain_threshold)
    }

    pub fn deactivate_cluster(&mut self, cluster: usize) -> Result<Vec<BreakEvent>> {
        self.clustering.deactivate_cluster(&mut self.particles, cluster)
    }

    pub fn add_constraint_rule(&mut self, rule: impl RigidConstraintRule + 'static) {
        self.rules.push(Box::new(rule));
    }

    pub fn constraint_rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn set_kinematic_update(
        &mut self,
        update: impl Fn(usize, f64, f64) -> Option<RigidTransform> + Send + Sync + 'static,
    ) {
        self.kinematic_update = Some(Box::new(update));
    }

    /// Events from the last step.
    pub fn events(&self) -> &EventCollector {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventCollector {
        &mut self.events
    }

    pub fn set_collision_callback(&mut self, callback: impl FnMut(&[CollisionEvent]) + Send + 'static) {
        self.collision_callback = Some(Box::new(callback));
    }

    pub fn set_break_callback(&mut self, callback: impl FnMut(&[BreakEvent]) + Send + 'static) {
        self.break_callback = Some(Box::new(callback));
    }

    pub fn set_trailing_callback(&mut self, callback: impl FnMut(&[TrailingEvent]) + Send + 'static) {
        self.trailing_callback = Some(Box::new(callback));
    }

    /// Advance by `dt`: integrate, detect, build the contact graph, solve
    /// awake islands in parallel, sleep, break clusters, commit, report.
    pub fn advance_one_time_step(&mut self, dt: f64) {
        if !self.config.enabled {
            trace!("rigid evolution disabled");
            return;
        }
        if dt < 0.0 || !dt.is_finite() {
            warn!(dt, "ignoring invalid time step");
            return;
        }
        if dt == 0.0 {
            return;
        }
        let _span = debug_span!("rigid_step", time = self.time, dt).entered();
        self.events.begin_frame();

        self.integrate(dt);
        self.collisions.compute_constraints(&self.particles);

        let connections: Vec<[usize; 2]> = self.rules.iter().flat_map(|r| r.connections()).collect();
        self.graph
            .update(&mut self.particles, self.collisions.constraints(), &connections);

        self.solve(dt);
        self.graph.sleep_inactive(&mut self.particles);

        let breaks = self
            .clustering
            .advance(&mut self.particles, self.collisions.constraints());
        if !breaks.is_empty() {
            debug!(released = breaks.len(), "cluster breaks");
        }

        self.commit();
        self.report(breaks);
        self.time += dt;
    }

    fn integrate(&mut self, dt: f64) {
        let local_time = self.time + dt;
        let gravity = self.config.gravity;
        let linear_damping = (1.0 - self.config.linear_drag * dt).max(0.0);
        let angular_damping = (1.0 - self.config.angular_drag * dt).max(0.0);
        let particles = &self.particles;
        let kinematic_update = self.kinematic_update.as_deref();

        let integrated: Vec<Option<Integrated>> = parallel::map(particles.len(), |i| {
            if particles.disabled[i] {
                return None;
            }
            let (x, r) = (particles.x[i], particles.r[i]);
            let rest = Integrated {
                v: particles.v[i],
                w: particles.w[i],
                p: x,
                q: r,
            };
            match particles.kind[i] {
                ParticleKind::Static => Some(rest),
                ParticleKind::Kinematic => {
                    let target = kinematic_update.and_then(|update| update(i, dt, local_time));
                    Some(match target {
                        Some(target) => Integrated {
                            v: (target.translation - x) / dt,
                            w: rotation::angular_velocity(&r, &target.rotation, dt),
                            p: target.translation,
                            q: target.rotation,
                        },
                        None => Integrated {
                            p: x + rest.v * dt,
                            q: rotation::integrate(&r, &rest.w, dt),
                            ..rest
                        },
                    })
                }
                ParticleKind::Dynamic if particles.sleeping[i] => Some(rest),
                ParticleKind::Dynamic => {
                    let inv_i = world_inertia(&r, &particles.inv_i[i]);
                    let v = (rest.v + (gravity + particles.f[i] * particles.inv_m[i]) * dt) * linear_damping;
                    let w = (rest.w + inv_i * particles.torque[i] * dt) * angular_damping;
                    Some(Integrated {
                        v,
                        w,
                        p: x + v * dt,
                        q: rotation::integrate(&r, &w, dt),
                    })
                }
            }
        });

        let particles = &mut self.particles;
        for (i, state) in integrated.into_iter().enumerate() {
            let Some(state) = state else {
                continue;
            };
            particles.pre_v[i] = particles.v[i];
            particles.pre_w[i] = particles.w[i];
            particles.v[i] = state.v;
            particles.w[i] = state.w;
            particles.p[i] = state.p;
            particles.q[i] = state.q;
            particles.f[i] = Vec3::zeros();
            particles.torque[i] = Vec3::zeros();
        }
    }

    fn solve(&mut self, dt: f64) {
        let active = self.graph.active_islands();
        let work: Vec<IslandBodies> = active
            .iter()
            .map(|&island| {
                IslandBodies::gather(&self.particles, &self.graph, island, self.collisions.constraints())
            })
            .collect();

        let (collisions, rules, config) = (&self.collisions, &self.rules, &self.config);
        let solved = parallel::map_owned(work, |mut island| {
            island.solve(collisions, rules, config, dt);
            island
        });
        for island in solved {
            island.scatter(&mut self.particles, self.collisions.constraints_mut());
        }
        trace!(islands = active.len(), "islands solved");
    }

    fn commit(&mut self) {
        let RigidParticles {
            x, r, p, q, disabled, ..
        } = &mut self.particles;
        let (p, q, disabled) = (&*p, &*q, &*disabled);
        parallel::for_each_mut(x, |i, x| {
            if !disabled[i] {
                *x = p[i];
            }
        });
        parallel::for_each_mut(r, |i, r| {
            if !disabled[i] {
                *r = q[i];
            }
        });
    }

    fn report(&mut self, breaks: Vec<BreakEvent>) {
        let particles = &self.particles;
        if self.config.collision_events {
            for contact in self.collisions.constraints() {
                let [a, b] = contact.particles;
                self.events.report_contact(
                    contact,
                    [particles.v[a], particles.v[b]],
                    [particles.w[a], particles.w[b]],
                    [particles.m[a], particles.m[b]],
                );
            }
        }
        for event in breaks {
            self.events.report_break(event);
        }
        if self.config.trailing_events {
            let threshold = self.config.trailing_speed_threshold;
            for i in (0..particles.len()).filter(|&i| particles.is_active_dynamic(i)) {
                if particles.v[i].norm() >= threshold {
                    self.events.report_trailing(TrailingEvent {
                        particle: i,
                        location: particles.x[i],
                        velocity: particles.v[i],
                        angular_velocity: particles.w[i],
                        mass: particles.m[i],
                    });
                }
            }
        }

        if let Some(callback) = self.collision_callback.as_mut() {
            if !self.events.collisions().is_empty() {
                callback(self.events.collisions());
            }
        }
        if let Some(callback) = self.break_callback.as_mut() {
            if !self.events.breaks().is_empty() {
                callback(self.events.breaks());
            }
        }
        if let Some(callback) = self.trailing_callback.as_mut() {
            if !self.events.trailing().is_empty() {
                callback(self.events.trailing());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RigidSpringConstraints;
    use approx::assert_relative_eq;
    use pbd_geometry::Implicit;
    use pbd_particles::sphere_inertia;
    use std::sync::{Arc, Mutex};

    const DT: f64 = 1.0 / 60.0;

    fn ball(z: f64) -> RigidBodyDesc {
        RigidBodyDesc::dynamic(1.0)
            .with_inertia(sphere_inertia(1.0, 1.0))
            .with_position(Vec3::new(0.0, 0.0, z))
            .with_geometry(Implicit::sphere(1.0))
    }

    fn floor() -> RigidBodyDesc {
        RigidBodyDesc::fixed().with_geometry(Implicit::plane(Vec3::zeros(), Vec3::z()))
    }

    #[test]
    fn free_fall_matches_semi_implicit_euler() {
        let mut evolution = PbdRigidsEvolution::new(RigidParticles::new(), RigidEvolutionConfig::default()).unwrap();
        let body = evolution.add_body(RigidBodyDesc::dynamic(1.0));
        for _ in 0..60 {
            evolution.advance_one_time_step(DT);
        }
        let particles = evolution.particles();
        assert_relative_eq!(particles.v[body].z, -980.0, epsilon = 1e-6);
        // Σ k g dt² for k = 1..60.
        assert_relative_eq!(particles.x[body].z, -980.0 * 61.0 / 120.0, epsilon = 1e-6);
        assert_relative_eq!(evolution.time(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn static_and_kinematic_bodies_keep_their_pose() {
        let mut evolution = PbdRigidsEvolution::new(RigidParticles::new(), RigidEvolutionConfig::default()).unwrap();
        let ground = evolution.add_body(floor());
        let pusher = evolution.add_body(
            RigidBodyDesc::kinematic()
                .with_position(Vec3::new(0.0, 0.0, 1.0))
                .with_geometry(Implicit::sphere(1.0)),
        );
        evolution.add_body(ball(2.5));
        for _ in 0..30 {
            evolution.advance_one_time_step(DT);
        }
        let particles = evolution.particles();
        assert_eq!(particles.x[ground], Vec3::zeros());
        assert_eq!(particles.x[pusher], Vec3::new(0.0, 0.0, 1.0));
        assert_eq!(particles.r[pusher], Rotation::identity());
    }

    #[test]
    fn ball_comes_to_rest_on_floor_and_sleeps() {
        let mut evolution = PbdRigidsEvolution::new(RigidParticles::new(), RigidEvolutionConfig::default()).unwrap();
        evolution.add_body(floor());
        let body = evolution.add_body(ball(1.5));
        for _ in 0..120 {
            evolution.advance_one_time_step(DT);
        }
        let particles = evolution.particles();
        assert!(particles.x[body].z > 0.99, "z = {}", particles.x[body].z);
        assert!(particles.x[body].z < 1.01);
        assert!(particles.sleeping[body]);
    }

    #[test]
    fn two_ball_stack_settles_and_sleeps() {
        let mut evolution = PbdRigidsEvolution::new(RigidParticles::new(), RigidEvolutionConfig::default()).unwrap();
        evolution.add_body(floor());
        let lower = evolution.add_body(ball(1.0));
        let upper = evolution.add_body(ball(3.0));
        for step in 0..120 {
            evolution.advance_one_time_step(DT);
            assert_eq!(evolution.contacts().len(), 2, "step {step}");
        }
        let particles = evolution.particles();
        assert_relative_eq!(particles.x[lower].z, 1.0, max_relative = 0.01);
        assert_relative_eq!(particles.x[upper].z, 3.0, max_relative = 0.01);
        assert!(particles.sleeping[lower] && particles.sleeping[upper]);
        assert_eq!(evolution.graph().islands().len(), 1);
        assert!(evolution.graph().island(0).is_sleeping);
    }

    #[test]
    fn touching_bodies_stay_asleep() {
        let config = RigidEvolutionConfig {
            gravity: Vec3::zeros(),
            collision_thickness: 0.01,
            ..Default::default()
        };
        let mut evolution = PbdRigidsEvolution::new(RigidParticles::new(), config).unwrap();
        evolution.add_body(floor());
        let left = evolution.add_body(ball(1.0).with_position(Vec3::new(-1.0, 0.0, 1.0)));
        let right = evolution.add_body(ball(1.0).with_position(Vec3::new(1.0, 0.0, 1.0)));
        for _ in 0..10 {
            evolution.advance_one_time_step(DT);
        }
        assert!(evolution.particles().sleeping[left] && evolution.particles().sleeping[right]);

        for step in 0..30 {
            evolution.advance_one_time_step(DT);
            let particles = evolution.particles();
            assert!(particles.sleeping[left] && particles.sleeping[right], "woke at step {step}");
            assert_eq!(evolution.graph().islands().len(), 1, "split at step {step}");
            assert!(evolution.graph().island(0).is_sleeping);
            assert_eq!(evolution.contacts().len(), 3);
        }
    }

    #[test]
    fn kinematic_callback_drives_body() {
        let mut evolution = PbdRigidsEvolution::new(RigidParticles::new(), RigidEvolutionConfig::default()).unwrap();
        let body = evolution.add_body(RigidBodyDesc::kinematic());
        evolution.set_kinematic_update(|_, _, time| {
            Some(RigidTransform::from_translation(Vec3::new(10.0 * time, 0.0, 0.0)))
        });
        evolution.advance_one_time_step(0.5);
        let particles = evolution.particles();
        assert_relative_eq!(particles.x[body], Vec3::new(5.0, 0.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(particles.v[body], Vec3::new(10.0, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn disabled_switch_and_bad_steps_do_nothing() {
        let mut evolution = PbdRigidsEvolution::new(RigidParticles::new(), RigidEvolutionConfig::default()).unwrap();
        let body = evolution.add_body(RigidBodyDesc::dynamic(1.0));
        evolution.advance_one_time_step(-1.0);
        evolution.advance_one_time_step(f64::NAN);
        evolution.set_enabled(false);
        evolution.advance_one_time_step(DT);
        assert_eq!(evolution.particles().x[body], Vec3::zeros());
        assert_eq!(evolution.time(), 0.0);
    }

    #[test]
    fn disabled_bodies_are_frozen() {
        let mut evolution = PbdRigidsEvolution::new(RigidParticles::new(), RigidEvolutionConfig::default()).unwrap();
        let body = evolution.add_body(RigidBodyDesc::dynamic(1.0).with_velocity(Vec3::x()));
        evolution.particles_mut().disabled[body] = true;
        evolution.advance_one_time_step(DT);
        assert_eq!(evolution.particles().x[body], Vec3::zeros());
        assert_eq!(evolution.particles().v[body], Vec3::x());
    }

    #[test]
    fn impact_reports_collision_events() {
        let config = RigidEvolutionConfig {
            trailing_events: true,
            trailing_speed_threshold: 100.0,
            ..Default::default()
        };
        let mut evolution = PbdRigidsEvolution::new(RigidParticles::new(), config).unwrap();
        let ground = evolution.add_body(floor());
        let body = evolution.add_body(ball(1.05).with_velocity(Vec3::new(0.0, 0.0, -300.0)));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        evolution.set_collision_callback(move |events| {
            sink.lock().unwrap().extend_from_slice(events);
        });

        evolution.advance_one_time_step(DT);
        let events = seen.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].particles, [body, ground]);
        assert!(events[0].accumulated_impulse.z > 0.0);
        // Stopped by the floor, so no longer trailing.
        assert!(evolution.events().trailing().is_empty());
    }

    #[test]
    fn spring_rule_joins_islands_and_holds_length() {
        let mut particles = RigidParticles::new();
        let a = particles.add(RigidBodyDesc::fixed().with_position(Vec3::new(0.0, 0.0, 10.0)));
        let b = particles.add(RigidBodyDesc::dynamic(1.0).with_position(Vec3::new(1.0, 0.0, 10.0)));
        let springs = RigidSpringConstraints::new(
            &particles,
            vec![[a, b]],
            &[[Vec3::new(0.0, 0.0, 10.0), Vec3::new(1.0, 0.0, 10.0)]],
            1.0,
        )
        .unwrap();
        let mut evolution = PbdRigidsEvolution::new(particles, RigidEvolutionConfig::default()).unwrap();
        evolution.add_constraint_rule(springs);

        for _ in 0..60 {
            evolution.advance_one_time_step(DT);
        }
        let particles = evolution.particles();
        let length = (particles.x[b] - particles.x[a]).norm();
        assert_relative_eq!(length, 1.0, epsilon = 1e-6);
        assert!(particles.x[b].z < 10.0);
    }
}
