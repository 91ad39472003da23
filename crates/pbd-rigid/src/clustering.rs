//! Clustered (compound) rigid bodies that break apart under impact.
//!
//! A cluster is an ordinary dynamic particle whose shape is the union of
//! its children's shapes. Children stay in the store, disabled, with their
//! pose stored relative to the cluster. Contact impulses on the cluster are
//! charged as strain to the nearest child; children whose strain exceeds
//! their threshold are released and the remaining children are regrouped
//! by the connectivity recorded at creation.

use crate::error::check_body;
use crate::{BreakEvent, Result, RigidContact, RigidError};
use pbd_geometry::Implicit;
use pbd_math::{Mat3, RigidTransform, Vec3, point_inertia, world_inertia};
use pbd_particles::{RigidBodyDesc, RigidParticles};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

#[derive(Debug, Clone)]
struct Cluster {
    children: Vec<usize>,
    /// Child pose in the cluster frame, aligned with `children`.
    offsets: Vec<RigidTransform>,
    /// Child pairs that touched when the cluster was first built.
    connectivity: BTreeSet<[usize; 2]>,
}

#[derive(Debug, Clone, Default)]
pub struct RigidClustering {
    clusters: BTreeMap<usize, Cluster>,
    parent: HashMap<usize, usize>,
    strain_thresholds: HashMap<usize, f64>,
    /// Children closer than this are connected.
    connection_distance: f64,
}

impl RigidClustering {
    pub fn new(connection_distance: f64) -> Self {
        Self {
            connection_distance,
            ..Default::default()
        }
    }

    pub fn num_clusters(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_cluster(&self, index: usize) -> bool {
        self.clusters.contains_key(&index)
    }

    /// Cluster particles, ascending.
    pub fn clusters(&self) -> impl Iterator<Item = usize> + '_ {
        self.clusters.keys().copied()
    }

    pub fn children(&self, cluster: usize) -> Option<&[usize]> {
        self.clusters.get(&cluster).map(|c| c.children.as_slice())
    }

    pub fn parent(&self, child: usize) -> Option<usize> {
        self.parent.get(&child).copied()
    }

    /// Connected child pairs of a cluster.
    pub fn connectivity(&self, cluster: usize) -> Option<impl Iterator<Item = [usize; 2]> + '_> {
        self.clusters.get(&cluster).map(|c| c.connectivity.iter().copied())
    }

    /// Group `children` into a new cluster particle and return its index.
    ///
    /// The cluster gets the children's total mass, center of mass, momentum
    /// and full inertia tensor, with an identity orientation. Children are
    /// disabled until released. Two children are connected when their
    /// bounds, thickened by the connection distance, overlap.
    pub fn create_cluster(
        &mut self,
        particles: &mut RigidParticles,
        children: &[usize],
        strain_threshold: f64,
    ) -> Result<usize> {
        if children.is_empty() {
            return Err(RigidError::EmptyCluster);
        }
        if !(strain_threshold > 0.0) {
            return Err(RigidError::InvalidConfig(format!(
                "strain threshold must be positive, got {strain_threshold}"
            )));
        }
        let mut seen = BTreeSet::new();
        for &child in children {
            check_body(child, particles.len())?;
            if !particles.is_dynamic(child) || particles.disabled[child] || !(particles.m[child] > 0.0) {
                return Err(RigidError::NotDynamic(child));
            }
            if self.parent.contains_key(&child) || self.is_cluster(child) || !seen.insert(child) {
                return Err(RigidError::AlreadyClustered(child));
            }
        }

        let mut connectivity = BTreeSet::new();
        for (k, &a) in children.iter().enumerate() {
            let Some(bounds_a) = particles.world_bounds(a) else {
                continue;
            };
            let bounds_a = bounds_a.thicken(self.connection_distance);
            for &b in &children[k + 1..] {
                if particles.world_bounds(b).is_some_and(|bounds_b| bounds_a.overlaps(&bounds_b)) {
                    connectivity.insert(ordered(a, b));
                }
            }
        }
        for &child in children {
            self.strain_thresholds.insert(child, strain_threshold);
        }
        Ok(self.build(particles, children.to_vec(), connectivity))
    }

    fn build(
        &mut self,
        particles: &mut RigidParticles,
        children: Vec<usize>,
        connectivity: BTreeSet<[usize; 2]>,
    ) -> usize {
        let mass: f64 = children.iter().map(|&c| particles.m[c]).sum();
        let center = children
            .iter()
            .fold(Vec3::zeros(), |acc, &c| acc + particles.x[c] * particles.m[c])
            / mass;
        let velocity = children
            .iter()
            .fold(Vec3::zeros(), |acc, &c| acc + particles.v[c] * particles.m[c])
            / mass;

        let mut inertia = Mat3::zeros();
        let mut momentum = Vec3::zeros();
        for &c in &children {
            let offset = particles.x[c] - center;
            let local = world_inertia(&particles.r[c], &particles.i[c]);
            inertia += local + point_inertia(particles.m[c], &offset);
            momentum += offset.cross(&(particles.v[c] * particles.m[c])) + local * particles.w[c];
        }
        let angular_velocity = inertia
            .try_inverse()
            .map(|inv| inv * momentum)
            .unwrap_or_else(Vec3::zeros);

        let offsets: Vec<RigidTransform> = children
            .iter()
            .map(|&c| RigidTransform::new(particles.x[c] - center, particles.r[c]))
            .collect();
        let shapes: Vec<Implicit> = children
            .iter()
            .zip(&offsets)
            .filter_map(|(&c, offset)| {
                let shape = particles.geometry[c].as_deref()?;
                Some(shape.clone().transformed(*offset))
            })
            .collect();

        let mut desc = RigidBodyDesc::dynamic(mass)
            .with_position(center)
            .with_velocity(velocity)
            .with_angular_velocity(angular_velocity)
            .with_inertia(inertia);
        if !shapes.is_empty() {
            desc = desc.with_geometry(Implicit::Union(shapes));
        }
        let cluster = particles.add(desc);

        for &c in &children {
            particles.disabled[c] = true;
            particles.island[c] = None;
            self.parent.insert(c, cluster);
        }
        debug!(cluster, children = children.len(), mass, "cluster created");
        self.clusters.insert(
            cluster,
            Cluster {
                children,
                offsets,
                connectivity,
            },
        );
        cluster
    }

    /// Charge contact impulses to the nearest child of each cluster they
    /// touch, release children over their threshold and regroup the rest.
    pub fn advance(&mut self, particles: &mut RigidParticles, contacts: &[RigidContact]) -> Vec<BreakEvent> {
        let mut strain: BTreeMap<usize, BTreeMap<usize, f64>> = BTreeMap::new();
        for contact in contacts.iter().filter(|c| c.has_impulse()) {
            let magnitude = contact.accumulated_impulse.norm();
            for &body in &contact.particles {
                let Some(cluster) = self.clusters.get(&body) else {
                    continue;
                };
                if particles.disabled[body] {
                    continue;
                }
                let pose = RigidTransform::new(particles.p[body], particles.q[body]);
                let nearest = cluster
                    .children
                    .iter()
                    .zip(&cluster.offsets)
                    .map(|(&c, offset)| {
                        let position = pose.transform_position(&offset.translation);
                        (c, (position - contact.location).norm_squared())
                    })
                    .min_by(|a, b| a.1.total_cmp(&b.1));
                if let Some((child, _)) = nearest {
                    *strain.entry(body).or_default().entry(child).or_default() += magnitude;
                }
            }
        }

        let mut events = Vec::new();
        for (cluster, child_strain) in strain {
            let broken: BTreeMap<usize, f64> = child_strain
                .into_iter()
                .filter(|(child, s)| *s > self.strain_thresholds.get(child).copied().unwrap_or(f64::MAX))
                .collect();
            if !broken.is_empty() {
                events.extend(self.split(particles, cluster, &broken));
            }
        }
        events
    }

    /// Release every child of `cluster` and disable the cluster particle.
    pub fn deactivate_cluster(&mut self, particles: &mut RigidParticles, cluster: usize) -> Result<Vec<BreakEvent>> {
        let Some(data) = self.clusters.get(&cluster) else {
            return Err(RigidError::NotCluster(cluster));
        };
        let all: BTreeMap<usize, f64> = data.children.iter().map(|&c| (c, 0.0)).collect();
        Ok(self.split(particles, cluster, &all))
    }

    /// World pose of a child, from its cluster's predicted pose.
    pub fn child_transform(&self, particles: &RigidParticles, child: usize) -> Option<RigidTransform> {
        let cluster = self.parent(child)?;
        let data = self.clusters.get(&cluster)?;
        let k = data.children.iter().position(|&c| c == child)?;
        let pose = RigidTransform::new(particles.p[cluster], particles.q[cluster]);
        Some(pose.compose(&data.offsets[k]))
    }

    /// Remove `broken` children from `cluster`, regroup the rest by
    /// connectivity and disable the old cluster particle.
    fn split(
        &mut self,
        particles: &mut RigidParticles,
        cluster: usize,
        broken: &BTreeMap<usize, f64>,
    ) -> Vec<BreakEvent> {
        let Some(data) = self.clusters.remove(&cluster) else {
            return Vec::new();
        };
        let pose = RigidTransform::new(particles.p[cluster], particles.q[cluster]);
        let (v, w) = (particles.v[cluster], particles.w[cluster]);

        // Every child becomes a free body at its current world pose first.
        for (&child, offset) in data.children.iter().zip(&data.offsets) {
            let world = pose.compose(offset);
            particles.x[child] = world.translation;
            particles.p[child] = world.translation;
            particles.r[child] = world.rotation;
            particles.q[child] = world.rotation;
            particles.v[child] = v + w.cross(&(world.translation - pose.translation));
            particles.w[child] = w;
            particles.disabled[child] = false;
            particles.sleeping[child] = false;
            self.parent.remove(&child);
        }
        particles.disabled[cluster] = true;
        particles.island[cluster] = None;
        particles.v[cluster] = Vec3::zeros();
        particles.w[cluster] = Vec3::zeros();

        let remaining: BTreeSet<usize> = data
            .children
            .iter()
            .copied()
            .filter(|c| !broken.contains_key(c))
            .collect();
        let mut events = Vec::new();
        let mut report = |particles: &RigidParticles, particle: usize, strain: f64| {
            events.push(BreakEvent {
                cluster,
                particle,
                location: particles.x[particle],
                velocity: particles.v[particle],
                angular_velocity: particles.w[particle],
                mass: particles.m[particle],
                strain,
            });
        };
        for (&child, &strain) in broken {
            report(particles, child, strain);
        }

        for component in components(&remaining, &data.connectivity) {
            if let [single] = component.as_slice() {
                report(particles, *single, 0.0);
                continue;
            }
            let connectivity = data
                .connectivity
                .iter()
                .copied()
                .filter(|[a, b]| component.binary_search(a).is_ok() && component.binary_search(b).is_ok())
                .collect();
            let regrouped = self.build(particles, component, connectivity);
            report(particles, regrouped, 0.0);
        }
        debug!(cluster, released = broken.len(), "cluster split");
        events
    }
}

fn ordered(a: usize, b: usize) -> [usize; 2] {
    if a < b { [a, b] } else { [b, a] }
}

/// Connected components of `nodes` under `edges`, each sorted.
fn components(nodes: &BTreeSet<usize>, edges: &BTreeSet<[usize; 2]>) -> Vec<Vec<usize>> {
    let mut adjacency: HashMap<usize, Vec<usize>> = HashMap::new();
    for &[a, b] in edges {
        if nodes.contains(&a) && nodes.contains(&b) {
            adjacency.entry(a).or_default().push(b);
            adjacency.entry(b).or_default().push(a);
        }
    }
    let mut visited = BTreeSet::new();
    let mut out = Vec::new();
    for &start in nodes {
        if !visited.insert(start) {
            continue;
        }
        let mut component = vec![start];
        let mut stack = vec![start];
        while let Some(n) = stack.pop() {
            for &m in adjacency.get(&n).into_iter().flatten() {
                if visited.insert(m) {
                    component.push(m);
                    stack.push(m);
                }
            }
        }
        component.sort_unstable();
        out.push(component);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pbd_particles::sphere_inertia;

    /// Three unit spheres in a row along X, touching.
    fn row(particles: &mut RigidParticles) -> Vec<usize> {
        (0..3)
            .map(|k| {
                particles.add(
                    RigidBodyDesc::dynamic(1.0)
                        .with_inertia(sphere_inertia(1.0, 1.0))
                        .with_position(Vec3::new(2.0 * k as f64, 0.0, 0.0))
                        .with_geometry(Implicit::sphere(1.0)),
                )
            })
            .collect()
    }

    #[test]
    fn cluster_mass_properties() {
        let mut particles = RigidParticles::new();
        let children = row(&mut particles);
        let mut clustering = RigidClustering::new(0.1);
        let cluster = clustering.create_cluster(&mut particles, &children, 10.0).unwrap();

        assert_relative_eq!(particles.m[cluster], 3.0);
        assert_relative_eq!(particles.x[cluster], Vec3::new(2.0, 0.0, 0.0), epsilon = 1e-12);
        // 3 * 0.4 on every axis plus parallel-axis terms for offsets ±2 on X.
        assert_relative_eq!(particles.i[cluster][(0, 0)], 1.2, epsilon = 1e-12);
        assert_relative_eq!(particles.i[cluster][(1, 1)], 9.2, epsilon = 1e-12);
        assert_relative_eq!(particles.i[cluster][(2, 2)], 9.2, epsilon = 1e-12);
        assert!(children.iter().all(|&c| particles.disabled[c]));
        assert_eq!(clustering.parent(children[1]), Some(cluster));
        assert_eq!(clustering.connectivity(cluster).unwrap().count(), 2);
        assert_eq!(particles.r[cluster], pbd_math::Rotation::identity());
    }

    #[test]
    fn strain_breaks_nearest_child_and_regroups_rest() {
        let mut particles = RigidParticles::new();
        let children = row(&mut particles);
        let mut clustering = RigidClustering::new(0.1);
        let cluster = clustering.create_cluster(&mut particles, &children, 10.0).unwrap();

        let floor = particles.add(RigidBodyDesc::fixed());
        let mut hit = RigidContact::new([cluster, floor], Vec3::z(), Vec3::new(4.0, 0.0, -1.0), 0.0);
        hit.accumulated_impulse = Vec3::new(0.0, 0.0, 25.0);
        let mut soft = hit;
        soft.location = Vec3::new(0.0, 0.0, -1.0);
        soft.accumulated_impulse = Vec3::new(0.0, 0.0, 5.0);

        let events = clustering.advance(&mut particles, &[hit, soft]);

        assert!(particles.disabled[cluster]);
        assert!(!clustering.is_cluster(cluster));
        // The far-right child broke off; the two left ones stay together.
        let freed = events.iter().find(|e| e.particle == children[2]).unwrap();
        assert_relative_eq!(freed.strain, 25.0);
        assert!(!particles.disabled[children[2]]);
        assert_relative_eq!(particles.x[children[2]], Vec3::new(4.0, 0.0, 0.0), epsilon = 1e-12);

        let regrouped = clustering.parent(children[0]).unwrap();
        assert_eq!(clustering.parent(children[1]), Some(regrouped));
        assert_eq!(clustering.num_clusters(), 1);
        assert_relative_eq!(particles.x[regrouped], Vec3::new(1.0, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn released_children_inherit_rigid_motion() {
        let mut particles = RigidParticles::new();
        let children = row(&mut particles);
        let mut clustering = RigidClustering::new(0.1);
        let cluster = clustering.create_cluster(&mut particles, &children, 10.0).unwrap();
        particles.w[cluster] = Vec3::new(0.0, 0.0, 1.0);

        let events = clustering.deactivate_cluster(&mut particles, cluster).unwrap();
        assert_eq!(events.iter().filter(|e| children.contains(&e.particle)).count(), 3);
        assert_eq!(clustering.num_clusters(), 0);
        // ω × r for the child at +2 on X.
        assert_relative_eq!(particles.v[children[2]], Vec3::new(0.0, 2.0, 0.0), epsilon = 1e-12);
        assert!(children.iter().all(|&c| !particles.disabled[c]));
    }

    #[test]
    fn creation_errors() {
        let mut particles = RigidParticles::new();
        let children = row(&mut particles);
        let fixed = particles.add(RigidBodyDesc::fixed());
        let mut clustering = RigidClustering::new(0.1);

        assert_eq!(clustering.create_cluster(&mut particles, &[], 1.0), Err(RigidError::EmptyCluster));
        assert_eq!(
            clustering.create_cluster(&mut particles, &[fixed], 1.0),
            Err(RigidError::NotDynamic(fixed))
        );
        assert_eq!(
            clustering.create_cluster(&mut particles, &[children[0], children[0]], 1.0),
            Err(RigidError::AlreadyClustered(children[0]))
        );
        clustering.create_cluster(&mut particles, &children[..2], 1.0).unwrap();
        assert!(clustering.create_cluster(&mut particles, &children[1..], 1.0).is_err());
    }
}
