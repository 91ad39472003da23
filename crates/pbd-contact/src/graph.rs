//! The contact graph: nodes, edges, islands, coloring, levels and sleep.
//!
//! [`ContactGraph::update`] rebuilds everything from the current contacts.
//! Islands keep their sleep counters across rebuilds only while their
//! membership is unchanged.

use crate::{ContactEdge, ContactGraphConfig, IslandData};
use pbd_particles::RigidParticles;
use std::collections::{BTreeSet, VecDeque};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphNode {
    /// Incident contact edges.
    pub edges: Vec<usize>,
    /// Non-contact neighbours that still tie islands together.
    pub connections: Vec<usize>,
    pub island: Option<usize>,
    /// Dynamic and enabled when the graph was built.
    pub is_dynamic: bool,
    /// Contact distance from a static or kinematic body, when levels are on.
    pub level: Option<usize>,
    used_colors: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphEdge {
    pub nodes: [usize; 2],
    /// Index of the contact constraint this edge stands for.
    pub constraint: usize,
    pub island: Option<usize>,
    pub color: Option<usize>,
    pub level: Option<usize>,
}

impl GraphEdge {
    fn other(&self, node: usize) -> usize {
        if self.nodes[0] == node {
            self.nodes[1]
        } else {
            self.nodes[0]
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContactGraph {
    config: ContactGraphConfig,
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    islands: Vec<IslandData>,
}

impl ContactGraph {
    pub fn new(config: ContactGraphConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &ContactGraphConfig {
        &self.config
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn islands(&self) -> &[IslandData] {
        &self.islands
    }

    pub fn island(&self, index: usize) -> &IslandData {
        &self.islands[index]
    }

    /// Islands that are awake and have dynamic members.
    pub fn active_islands(&self) -> Vec<usize> {
        (0..self.islands.len())
            .filter(|&i| self.islands[i].is_active())
            .collect()
    }

    /// Largest color count over all islands.
    pub fn max_color(&self) -> usize {
        self.islands.iter().map(|i| i.color_count).max().unwrap_or(0)
    }

    /// Drop edges. Node island ids and the island list survive until the
    /// next [`ContactGraph::compute_islands`], which compares against them.
    pub fn reset(&mut self) {
        self.edges.clear();
        for node in &mut self.nodes {
            node.edges.clear();
            node.connections.clear();
            node.used_colors.clear();
            node.level = None;
        }
    }

    /// One node per particle, one edge per constraint touching a dynamic
    /// body. `connections` join islands without being colored.
    pub fn build<C: ContactEdge>(
        &mut self,
        particles: &RigidParticles,
        constraints: &[C],
        connections: &[[usize; 2]],
    ) {
        let n = particles.len();
        self.nodes.resize_with(n, GraphNode::default);
        self.nodes.truncate(n);
        for (i, node) in self.nodes.iter_mut().enumerate() {
            node.is_dynamic = particles.is_dynamic(i) && !particles.disabled[i];
        }
        let usable = |i: usize| i < n && !particles.disabled[i];

        for (constraint, c) in constraints.iter().enumerate() {
            let [a, b] = c.particle_indices();
            if a == b || !usable(a) || !usable(b) {
                debug!(constraint, a, b, "contact skipped");
                continue;
            }
            if !self.nodes[a].is_dynamic && !self.nodes[b].is_dynamic {
                continue;
            }
            let edge = self.edges.len();
            self.edges.push(GraphEdge {
                nodes: [a, b],
                constraint,
                island: None,
                color: None,
                level: None,
            });
            self.nodes[a].edges.push(edge);
            self.nodes[b].edges.push(edge);
        }
        for &[a, b] in connections {
            if a != b && usable(a) && usable(b) {
                self.nodes[a].connections.push(b);
                self.nodes[b].connections.push(a);
            }
        }
    }

    /// Flood-fill islands from dynamic nodes. Traversal enters static and
    /// kinematic nodes but never continues through them. An island whose
    /// membership changed since the last call is not persistent and wakes.
    pub fn compute_islands(&mut self, particles: &mut RigidParticles) {
        let previous_islands = std::mem::take(&mut self.islands);
        let previous: Vec<Option<usize>> = self.nodes.iter().map(|n| n.island).collect();
        for node in &mut self.nodes {
            node.island = None;
        }
        for island in particles.island.iter_mut() {
            *island = None;
        }

        let mut visited = vec![false; self.nodes.len()];
        for start in 0..self.nodes.len() {
            if !self.nodes[start].is_dynamic || visited[start] {
                continue;
            }
            let id = self.islands.len();
            let mut dynamic = Vec::new();
            let mut attached = BTreeSet::new();
            let mut edges = BTreeSet::new();
            let mut queue = VecDeque::from([start]);
            visited[start] = true;

            while let Some(v) = queue.pop_front() {
                dynamic.push(v);
                self.nodes[v].island = Some(id);
                let node = &self.nodes[v];
                let neighbours = node
                    .edges
                    .iter()
                    .map(|&e| self.edges[e].other(v))
                    .chain(node.connections.iter().copied());
                for other in neighbours {
                    if !self.nodes[other].is_dynamic {
                        attached.insert(other);
                    } else if !visited[other] {
                        visited[other] = true;
                        queue.push_back(other);
                    }
                }
                edges.extend(node.edges.iter().copied());
            }
            dynamic.sort_unstable();

            let before = previous.get(dynamic[0]).copied().flatten();
            let is_persistent = before.is_some_and(|p| {
                dynamic.iter().all(|&i| previous.get(i).copied().flatten() == Some(p))
                    && previous_islands.get(p).map(|old| old.dynamic.len()) == Some(dynamic.len())
            });
            let sleep_counter = match before {
                Some(p) if is_persistent => previous_islands[p].sleep_counter,
                _ => 0,
            };
            let is_sleeping = is_persistent && dynamic.iter().all(|&i| particles.sleeping[i]);
            if !is_persistent {
                debug!(island = id, members = dynamic.len(), "island changed");
            }
            for &i in &dynamic {
                if !is_sleeping {
                    particles.wake(i);
                }
                particles.island[i] = Some(id);
            }
            for &e in &edges {
                self.edges[e].island = Some(id);
            }
            self.islands.push(IslandData {
                dynamic,
                attached: attached.into_iter().collect(),
                edges: edges.into_iter().collect(),
                is_persistent,
                is_sleeping,
                sleep_counter,
                ..Default::default()
            });
        }
    }

    /// Greedy per-island coloring by depth-first traversal, then levels.
    pub fn compute_coloring(&mut self) {
        let mut visited = vec![false; self.nodes.len()];
        for id in 0..self.islands.len() {
            let mut color_count = 0;
            let starts = self.islands[id].dynamic.clone();
            for start in starts {
                if visited[start] {
                    continue;
                }
                visited[start] = true;
                let mut stack = vec![start];
                while let Some(v) = stack.pop() {
                    let incident = self.nodes[v].edges.clone();
                    for e in incident {
                        if self.edges[e].color.is_none() {
                            let color = self.assign_color(e);
                            color_count = color_count.max(color + 1);
                        }
                        let other = self.edges[e].other(v);
                        if self.nodes[other].is_dynamic && !visited[other] {
                            visited[other] = true;
                            stack.push(other);
                        }
                    }
                }
            }
            self.islands[id].color_count = color_count;
            self.compute_levels(id);
        }
    }

    /// Lowest color free at every dynamic endpoint.
    fn assign_color(&mut self, edge: usize) -> usize {
        let ends: Vec<usize> = self.edges[edge]
            .nodes
            .into_iter()
            .filter(|&n| self.nodes[n].is_dynamic)
            .collect();
        let color = (0..)
            .find(|c| ends.iter().all(|&n| !self.nodes[n].used_colors.contains(c)))
            .unwrap_or(0);
        for n in ends {
            self.nodes[n].used_colors.push(color);
        }
        self.edges[edge].color = Some(color);
        color
    }

    /// Breadth-first distance from anchored bodies, then the
    /// `[level][color]` buckets. A body touching a static or kinematic body
    /// is level zero; an edge takes the deeper level of its dynamic ends.
    /// Parts of an island out of reach of any anchor start over at zero.
    fn compute_levels(&mut self, id: usize) {
        let island = &self.islands[id];
        let mut level = vec![None; self.nodes.len()];

        if self.config.use_levels {
            let mut queue = VecDeque::new();
            for &v in &island.dynamic {
                let anchored = self.nodes[v]
                    .edges
                    .iter()
                    .any(|&e| !self.nodes[self.edges[e].other(v)].is_dynamic);
                if anchored {
                    level[v] = Some(0);
                    queue.push_back(v);
                }
            }
            expand_levels(&self.nodes, &self.edges, &mut level, &mut queue);
            for &v in &island.dynamic {
                if level[v].is_none() {
                    level[v] = Some(0);
                    queue.push_back(v);
                    expand_levels(&self.nodes, &self.edges, &mut level, &mut queue);
                }
            }
        }

        for k in 0..self.islands[id].dynamic.len() {
            let v = self.islands[id].dynamic[k];
            self.nodes[v].level = level[v];
        }

        let mut level_count = 0;
        for &e in &self.islands[id].edges {
            let edge_level = self.edges[e]
                .nodes
                .iter()
                .filter_map(|&n| level[n])
                .max()
                .unwrap_or(0);
            self.edges[e].level = Some(edge_level);
            level_count = level_count.max(edge_level + 1);
        }

        let island = &mut self.islands[id];
        let mut batches = vec![vec![Vec::new(); island.color_count]; level_count];
        for &e in &island.edges {
            let edge = &self.edges[e];
            if let (Some(l), Some(c)) = (edge.level, edge.color) {
                batches[l][c].push(e);
            }
        }
        island.level_count = level_count;
        island.batches = batches;
    }

    /// Reset, build, find islands and color them.
    pub fn update<C: ContactEdge>(
        &mut self,
        particles: &mut RigidParticles,
        constraints: &[C],
        connections: &[[usize; 2]],
    ) {
        self.reset();
        self.build(particles, constraints, connections);
        self.compute_islands(particles);
        self.compute_coloring();
        debug!(
            nodes = self.nodes.len(),
            edges = self.edges.len(),
            islands = self.islands.len(),
            max_color = self.max_color(),
            "contact graph"
        );
    }

    /// Count resting steps per persistent island and put islands to sleep
    /// once the count reaches the threshold. Returns the islands that fell
    /// asleep.
    pub fn sleep_inactive(&mut self, particles: &mut RigidParticles) -> Vec<usize> {
        let sleep = self.config.sleep;
        let linear = sleep.linear_threshold * sleep.linear_threshold;
        let angular = sleep.angular_threshold * sleep.angular_threshold;
        let mut fell_asleep = Vec::new();
        for (id, island) in self.islands.iter_mut().enumerate() {
            if island.is_sleeping || island.dynamic.is_empty() {
                continue;
            }
            if !island.is_persistent {
                island.sleep_counter = 0;
                continue;
            }
            let resting = island.dynamic.iter().all(|&i| {
                particles.v[i].norm_squared() < linear && particles.w[i].norm_squared() < angular
            });
            if !resting {
                island.sleep_counter = 0;
                continue;
            }
            island.sleep_counter += 1;
            if island.sleep_counter >= sleep.counter_threshold {
                for &i in &island.dynamic {
                    particles.sleep(i);
                }
                island.is_sleeping = true;
                fell_asleep.push(id);
            }
        }
        if !fell_asleep.is_empty() {
            debug!(islands = ?fell_asleep, "islands asleep");
        }
        fell_asleep
    }
}

fn expand_levels(
    nodes: &[GraphNode],
    edges: &[GraphEdge],
    level: &mut [Option<usize>],
    queue: &mut VecDeque<usize>,
) {
    while let Some(v) = queue.pop_front() {
        let depth = level[v].unwrap_or(0);
        for &e in &nodes[v].edges {
            let other = edges[e].other(v);
            if nodes[other].is_dynamic && level[other].is_none() {
                level[other] = Some(depth + 1);
                queue.push_back(other);
            }
        }
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use pbd_particles::RigidBodyDesc;
    use proptest::prelude::*;

    /// Union-find over dynamic-to-dynamic edges.
    fn components(n: usize, dynamic: &[bool], edges: &[[usize; 2]]) -> Vec<usize> {
        let mut parent: Vec<usize> = (0..n).collect();
        fn find(parent: &mut [usize], i: usize) -> usize {
            let mut root = i;
            while parent[root] != root {
                root = parent[root];
            }
            parent[i] = root;
            root
        }
        for &[a, b] in edges {
            if a != b && dynamic[a] && dynamic[b] {
                let (ra, rb) = (find(&mut parent, a), find(&mut parent, b));
                parent[ra] = rb;
            }
        }
        (0..n).map(|i| find(&mut parent, i)).collect()
    }

    proptest! {
        #[test]
        fn coloring_and_islands_hold(
            kinds in prop::collection::vec(any::<bool>(), 2..12),
            raw in prop::collection::vec((0usize..12, 0usize..12), 0..40),
        ) {
            let n = kinds.len();
            let mut particles = RigidParticles::new();
            for &dynamic in &kinds {
                particles.add(if dynamic { RigidBodyDesc::dynamic(1.0) } else { RigidBodyDesc::fixed() });
            }
            let contacts: Vec<[usize; 2]> = raw.into_iter().map(|(a, b)| [a % n, b % n]).collect();
            let mut graph = ContactGraph::new(ContactGraphConfig::default());
            graph.update(&mut particles, &contacts, &[]);

            for node in graph.nodes().iter().filter(|n| n.is_dynamic) {
                let mut colors: Vec<_> = node.edges.iter().map(|&e| graph.edges()[e].color).collect();
                prop_assert!(colors.iter().all(Option::is_some));
                let count = colors.len();
                colors.sort();
                colors.dedup();
                prop_assert_eq!(colors.len(), count);
            }

            let roots = components(n, &kinds, &contacts);
            for a in (0..n).filter(|&i| kinds[i]) {
                for b in (0..n).filter(|&i| kinds[i]) {
                    let same = particles.island[a] == particles.island[b];
                    prop_assert_eq!(same, roots[a] == roots[b]);
                }
            }
        }
    }
}
