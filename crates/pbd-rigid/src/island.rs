//! Owned per-island working sets.
//!
//! Islands never share a dynamic body, so each one is copied out of the
//! particle store, solved on its own task and written back without any
//! two tasks touching the same state.

use crate::{BodyState, RigidCollisionConstraints, RigidConstraintRule, RigidContact, RigidEvolutionConfig};
use pbd_contact::ContactGraph;
use pbd_particles::{RigidParticles, parallel};
use std::collections::HashMap;
use tracing::trace;

#[derive(Debug, Clone, Default)]
pub struct IslandBodies {
    pub island: usize,
    bodies: Vec<BodyState>,
    /// Graph level per body, aligned with `bodies`.
    levels: Vec<Option<usize>>,
    local: HashMap<usize, usize>,
    contacts: Vec<RigidContact>,
    /// Island-local body indices per contact.
    contact_bodies: Vec<[usize; 2]>,
    /// Position of each contact in the step's contact list.
    contact_ids: Vec<usize>,
    /// Island-local contact indices bucketed `[level][color]`.
    batches: Vec<Vec<Vec<usize>>>,
}

impl IslandBodies {
    /// A working set over `bodies` with no contacts.
    pub fn new(island: usize, particles: &RigidParticles, bodies: impl IntoIterator<Item = usize>) -> Self {
        let mut set = Self {
            island,
            ..Default::default()
        };
        for index in bodies {
            set.insert(particles, index);
        }
        set
    }

    fn insert(&mut self, particles: &RigidParticles, index: usize) -> usize {
        if let Some(&local) = self.local.get(&index) {
            return local;
        }
        let local = self.bodies.len();
        self.bodies.push(BodyState::from_particles(particles, index));
        self.levels.push(None);
        self.local.insert(index, local);
        local
    }

    /// Copy island `island` of `graph` out of `particles`, with the
    /// contacts its edges stand for.
    pub fn gather(
        particles: &RigidParticles,
        graph: &ContactGraph,
        island: usize,
        contacts: &[RigidContact],
    ) -> Self {
        let data = graph.island(island);
        let mut set = Self::new(island, particles, data.bodies());
        let mut edge_to_local = HashMap::with_capacity(data.edges.len());
        for &edge in &data.edges {
            let id = graph.edges()[edge].constraint;
            let contact = contacts[id];
            let [a, b] = contact.particles;
            let pair = [set.insert(particles, a), set.insert(particles, b)];
            edge_to_local.insert(edge, set.contacts.len());
            set.contacts.push(contact);
            set.contact_bodies.push(pair);
            set.contact_ids.push(id);
        }
        set.batches = data
            .batches()
            .iter()
            .map(|level| {
                level
                    .iter()
                    .map(|color| color.iter().filter_map(|e| edge_to_local.get(e).copied()).collect())
                    .collect()
            })
            .collect();
        for (body, level) in set.bodies.iter().zip(&mut set.levels) {
            *level = graph.nodes().get(body.index).and_then(|node| node.level);
        }
        set
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn bodies(&self) -> &[BodyState] {
        &self.bodies
    }

    pub fn contacts(&self) -> &[RigidContact] {
        &self.contacts
    }

    /// Island-local slot of particle `index`.
    pub fn local_index(&self, index: usize) -> Option<usize> {
        self.local.get(&index).copied()
    }

    pub fn body(&self, index: usize) -> Option<&BodyState> {
        self.local_index(index).map(|i| &self.bodies[i])
    }

    pub fn body_mut(&mut self, index: usize) -> Option<&mut BodyState> {
        self.local_index(index).map(|i| &mut self.bodies[i])
    }

    /// Both bodies of a pair, mutably. `None` if either is missing or
    /// they are the same body.
    pub fn pair_mut(&mut self, a: usize, b: usize) -> Option<(&mut BodyState, &mut BodyState)> {
        let (la, lb) = (self.local_index(a)?, self.local_index(b)?);
        if la == lb {
            return None;
        }
        if la < lb {
            let (head, tail) = self.bodies.split_at_mut(lb);
            Some((&mut head[la], &mut tail[0]))
        } else {
            let (head, tail) = self.bodies.split_at_mut(la);
            Some((&mut tail[0], &mut head[lb]))
        }
    }

    /// Run `solve` over one color bucket. Every contact is evaluated from
    /// the same snapshot, then results are written back; the coloring
    /// guarantees no dynamic body appears twice in a bucket. With `shock`,
    /// the body of a dynamic pair nearer the anchors is frozen.
    fn solve_batch<F>(&mut self, batch: &[usize], shock: bool, solve: F) -> bool
    where
        F: Fn(&mut [BodyState; 2], &mut RigidContact) -> bool + Sync + Send,
    {
        let this = &*self;
        let results = parallel::map_slice(batch, |&k| {
            let [a, b] = this.contact_bodies[k];
            let mut pair = [this.bodies[a].clone(), this.bodies[b].clone()];
            if shock {
                this.freeze_lower(&mut pair, a, b);
            }
            let mut contact = this.contacts[k];
            let applied = solve(&mut pair, &mut contact);
            (k, pair, contact, applied)
        });

        let mut any = false;
        for (k, [a, b], contact, applied) in results {
            let [la, lb] = self.contact_bodies[k];
            self.contacts[k] = contact;
            if a.is_dynamic {
                self.bodies[la] = a;
            }
            if b.is_dynamic {
                self.bodies[lb] = b;
            }
            any |= applied;
        }
        any
    }

    fn freeze_lower(&self, pair: &mut [BodyState; 2], a: usize, b: usize) {
        if !(pair[0].is_dynamic && pair[1].is_dynamic) {
            return;
        }
        match (self.levels[a], self.levels[b]) {
            (Some(la), Some(lb)) if la < lb => pair[0].freeze(),
            (Some(la), Some(lb)) if lb < la => pair[1].freeze(),
            _ => {}
        }
    }

    /// Resolve the island: contact and joint iterations, velocity update,
    /// then push-out. The last contact iteration and the last push-out
    /// sweep propagate shock upward through the levels.
    pub fn solve(
        &mut self,
        collisions: &RigidCollisionConstraints,
        rules: &[Box<dyn RigidConstraintRule>],
        config: &RigidEvolutionConfig,
        dt: f64,
    ) {
        let batches = std::mem::take(&mut self.batches);

        for iteration in 0..config.iterations {
            let shock = config.shock_propagation && iteration + 1 == config.iterations;
            for level in &batches {
                for color in level {
                    self.solve_batch(color, shock, |pair, contact| collisions.apply(pair, contact, dt));
                }
            }
            for rule in rules {
                rule.apply(self, dt);
            }
        }

        for body in &mut self.bodies {
            body.update_velocities(dt);
        }

        let sweeps = config.push_out_iterations;
        let mut performed = 0;
        for iteration in 0..sweeps {
            let scaling = (iteration + 1) as f64 / sweeps as f64;
            let shock = config.shock_propagation && iteration + 1 == sweeps;
            let mut moved = false;
            for level in &batches {
                for color in level {
                    moved |= self.solve_batch(color, shock, |pair, contact| {
                        collisions.apply_push_out(pair, contact, config.push_out_pair_iterations, scaling)
                    });
                }
            }
            performed += 1;
            if !moved {
                break;
            }
        }
        trace!(
            island = self.island,
            bodies = self.bodies.len(),
            contacts = self.contacts.len(),
            push_out_sweeps = performed,
            "island solved"
        );

        self.batches = batches;
    }

    /// Write dynamic bodies and contact results back.
    pub fn scatter(self, particles: &mut RigidParticles, contacts: &mut [RigidContact]) {
        for body in &self.bodies {
            body.write_to(particles);
        }
        for (contact, &id) in self.contacts.iter().zip(&self.contact_ids) {
            contacts[id] = *contact;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pbd_contact::ContactGraphConfig;
    use pbd_geometry::Implicit;
    use pbd_math::Vec3;
    use pbd_particles::RigidBodyDesc;

    #[test]
    fn gather_solve_scatter_resolves_resting_stack() {
        let mut particles = RigidParticles::new();
        let floor = particles.add(
            RigidBodyDesc::fixed().with_geometry(Implicit::plane(Vec3::zeros(), Vec3::z())),
        );
        let lower = particles.add(
            RigidBodyDesc::dynamic(1.0)
                .with_position(Vec3::new(0.0, 0.0, 0.9))
                .with_geometry(Implicit::sphere(1.0)),
        );
        let upper = particles.add(
            RigidBodyDesc::dynamic(1.0)
                .with_position(Vec3::new(0.0, 0.0, 2.8))
                .with_geometry(Implicit::sphere(1.0)),
        );

        let mut collisions = RigidCollisionConstraints::new(0.0, 0.0, 0.0, 980.0);
        collisions.compute_constraints(&particles);
        assert_eq!(collisions.len(), 2);

        let mut graph = ContactGraph::new(ContactGraphConfig::default());
        graph.update(&mut particles, collisions.constraints(), &[]);
        let active = graph.active_islands();
        assert_eq!(active.len(), 1);

        let mut island = IslandBodies::gather(&particles, &graph, active[0], collisions.constraints());
        assert_eq!(island.len(), 3);
        assert!(island.body(floor).is_some());

        let config = RigidEvolutionConfig {
            push_out_iterations: 8,
            ..Default::default()
        };
        island.solve(&collisions, &[], &config, 1.0 / 60.0);
        island.scatter(&mut particles, collisions.constraints_mut());

        // The last sweep holds the lower ball while pushing the upper one.
        assert_relative_eq!(particles.p[lower].z, 1.0, epsilon = 1e-6);
        assert!(particles.p[upper].z - particles.p[lower].z >= 2.0 - 1e-6);
        assert_eq!(particles.p[floor], Vec3::zeros());
    }

    #[test]
    fn shock_freezes_the_body_nearer_the_floor() {
        let mut particles = RigidParticles::new();
        particles.add(RigidBodyDesc::fixed().with_geometry(Implicit::plane(Vec3::zeros(), Vec3::z())));
        let lower = particles.add(
            RigidBodyDesc::dynamic(1.0)
                .with_position(Vec3::new(0.0, 0.0, 1.0))
                .with_geometry(Implicit::sphere(1.0)),
        );
        let upper = particles.add(
            RigidBodyDesc::dynamic(1.0)
                .with_position(Vec3::new(0.0, 0.0, 2.5))
                .with_geometry(Implicit::sphere(1.0)),
        );
        let mut collisions = RigidCollisionConstraints::new(0.0, 0.0, 0.0, 980.0);
        collisions.compute_constraints(&particles);
        let mut graph = ContactGraph::new(ContactGraphConfig::default());
        graph.update(&mut particles, collisions.constraints(), &[]);
        let island = IslandBodies::gather(&particles, &graph, graph.active_islands()[0], collisions.constraints());
        assert_eq!(island.levels[island.local_index(lower).unwrap()], Some(0));
        assert_eq!(island.levels[island.local_index(upper).unwrap()], Some(1));

        let mut pair = [island.body(lower).unwrap().clone(), island.body(upper).unwrap().clone()];
        let (ll, lu) = (island.local_index(lower).unwrap(), island.local_index(upper).unwrap());
        island.freeze_lower(&mut pair, ll, lu);
        assert!(!pair[0].is_dynamic && pair[1].is_dynamic);

        let mut pair = [island.body(upper).unwrap().clone(), island.body(lower).unwrap().clone()];
        island.freeze_lower(&mut pair, lu, ll);
        assert!(pair[0].is_dynamic && !pair[1].is_dynamic);
    }

    #[test]
    fn pair_mut_handles_either_order() {
        let mut particles = RigidParticles::new();
        for _ in 0..3 {
            particles.add(RigidBodyDesc::dynamic(1.0));
        }
        let mut island = IslandBodies::new(0, &particles, [2, 0]);
        {
            let (a, b) = island.pair_mut(0, 2).unwrap();
            a.p = Vec3::x();
            b.p = Vec3::y();
        }
        assert_eq!(island.body(0).unwrap().p, Vec3::x());
        assert_eq!(island.body(2).unwrap().p, Vec3::y());
        assert!(island.pair_mut(0, 0).is_none());
        assert!(island.pair_mut(0, 1).is_none());
    }
}
