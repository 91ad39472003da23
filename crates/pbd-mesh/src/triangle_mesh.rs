//! Index-only triangle mesh with adjacency queries.

use pbd_math::Vec3;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::ops::Range;

/// Triangles over particle indices. Queries are deterministic: every
/// list comes back in sorted order so constraint sets built from it are
/// reproducible.
#[derive(Debug, Clone, Default)]
pub struct TriangleMesh {
    elements: Vec<[usize; 3]>,
    start_idx: usize,
    num_indices: usize,
    point_to_triangles: HashMap<usize, Vec<usize>>,
}

#[inline]
fn sorted_edge(a: usize, b: usize) -> [usize; 2] {
    if a < b { [a, b] } else { [b, a] }
}

impl TriangleMesh {
    pub fn new(elements: Vec<[usize; 3]>) -> Self {
        let (start_idx, num_indices) = match (
            elements.iter().flatten().min(),
            elements.iter().flatten().max(),
        ) {
            (Some(&lo), Some(&hi)) => (lo, hi - lo + 1),
            _ => (0, 0),
        };
        let mut point_to_triangles: HashMap<usize, Vec<usize>> = HashMap::new();
        for (t, tri) in elements.iter().enumerate() {
            for &v in tri {
                point_to_triangles.entry(v).or_default().push(t);
            }
        }
        Self {
            elements,
            start_idx,
            num_indices,
            point_to_triangles,
        }
    }

    pub fn elements(&self) -> &[[usize; 3]] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Range spanning the smallest to largest referenced index.
    pub fn vertex_range(&self) -> Range<usize> {
        self.start_idx..self.start_idx + self.num_indices
    }

    /// Referenced vertices, sorted.
    pub fn vertices(&self) -> Vec<usize> {
        let set: BTreeSet<usize> = self.elements.iter().flatten().copied().collect();
        set.into_iter().collect()
    }

    /// Triangles incident on `point`.
    pub fn triangles_of(&self, point: usize) -> &[usize] {
        self.point_to_triangles
            .get(&point)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn point_to_triangle_map(&self) -> &HashMap<usize, Vec<usize>> {
        &self.point_to_triangles
    }

    /// Every edge and the triangles sharing it.
    fn edge_to_triangles(&self) -> BTreeMap<[usize; 2], Vec<usize>> {
        let mut map: BTreeMap<[usize; 2], Vec<usize>> = BTreeMap::new();
        for (t, &[a, b, c]) in self.elements.iter().enumerate() {
            for (i, j) in [(a, b), (b, c), (c, a)] {
                map.entry(sorted_edge(i, j)).or_default().push(t);
            }
        }
        map
    }

    /// Each undirected edge once, lower index first, sorted.
    pub fn unique_edges(&self) -> Vec<[usize; 2]> {
        self.edge_to_triangles().into_keys().collect()
    }

    fn opposite(&self, triangle: usize, edge: &[usize; 2]) -> Option<usize> {
        self.elements[triangle]
            .iter()
            .copied()
            .find(|v| !edge.contains(v))
    }

    /// Bending quads `[e0, e1, o0, o1]`: the shared edge then the two
    /// vertices opposite it, once per pair of edge-sharing triangles.
    pub fn unique_adjacent_elements(&self) -> Vec<[usize; 4]> {
        let mut out = Vec::new();
        for (edge, tris) in self.edge_to_triangles() {
            for (k, &t0) in tris.iter().enumerate() {
                for &t1 in &tris[k + 1..] {
                    let (Some(o0), Some(o1)) = (self.opposite(t0, &edge), self.opposite(t1, &edge))
                    else {
                        continue;
                    };
                    if o0 != o1 {
                        out.push([edge[0], edge[1], o0, o1]);
                    }
                }
            }
        }
        out
    }

    /// Vertex pairs across each shared edge, deduplicated.
    pub fn unique_adjacent_points(&self) -> Vec<[usize; 2]> {
        let set: BTreeSet<[usize; 2]> = self
            .unique_adjacent_elements()
            .iter()
            .map(|q| sorted_edge(q[2], q[3]))
            .collect();
        set.into_iter().collect()
    }

    /// Pairs of vertices that share a common neighbour in the
    /// [`unique_adjacent_points`](Self::unique_adjacent_points) graph.
    pub fn double_adjacent_points(&self) -> Vec<[usize; 2]> {
        let mut neighbours: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for [a, b] in self.unique_adjacent_points() {
            neighbours.entry(a).or_default().push(b);
            neighbours.entry(b).or_default().push(a);
        }
        let mut set = BTreeSet::new();
        for list in neighbours.values() {
            for (i, &a) in list.iter().enumerate() {
                for &b in &list[i + 1..] {
                    if a != b {
                        set.insert(sorted_edge(a, b));
                    }
                }
            }
        }
        set.into_iter().collect()
    }

    /// Edge neighbours of every referenced vertex.
    pub fn point_to_neighbors(&self) -> HashMap<usize, BTreeSet<usize>> {
        let mut map: HashMap<usize, BTreeSet<usize>> = HashMap::new();
        for [a, b] in self.unique_edges() {
            map.entry(a).or_default().insert(b);
            map.entry(b).or_default().insert(a);
        }
        map
    }

    /// Vertices within `n` edge hops of `index`, excluding `index`.
    pub fn n_ring(
        &self,
        neighbors: &HashMap<usize, BTreeSet<usize>>,
        index: usize,
        n: usize,
    ) -> BTreeSet<usize> {
        let mut ring = BTreeSet::new();
        let mut frontier = VecDeque::from([(index, 0usize)]);
        let mut seen = BTreeSet::from([index]);
        while let Some((v, depth)) = frontier.pop_front() {
            if depth == n {
                continue;
            }
            for &u in neighbors.get(&v).into_iter().flatten() {
                if seen.insert(u) {
                    ring.insert(u);
                    frontier.push_back((u, depth + 1));
                }
            }
        }
        ring
    }

    /// Unnormalized face normals (twice the area).
    fn area_normals(&self, points: &[Vec3]) -> Vec<Vec3> {
        self.elements
            .iter()
            .map(|&[a, b, c]| (points[b] - points[a]).cross(&(points[c] - points[a])))
            .collect()
    }

    /// Unit face normals; degenerate faces get zero.
    pub fn face_normals(&self, points: &[Vec3]) -> Vec<Vec3> {
        self.area_normals(points)
            .into_iter()
            .map(|n| n.try_normalize(pbd_math::SMALL_NUMBER).unwrap_or_else(Vec3::zeros))
            .collect()
    }

    /// Area-weighted vertex normals, indexed like `points`. Vertices not
    /// referenced by any triangle get zero.
    pub fn point_normals(&self, points: &[Vec3]) -> Vec<Vec3> {
        let mut normals = vec![Vec3::zeros(); points.len()];
        for (n, tri) in self.area_normals(points).iter().zip(&self.elements) {
            for &v in tri {
                normals[v] += n;
            }
        }
        for n in &mut normals {
            *n = n.try_normalize(pbd_math::SMALL_NUMBER).unwrap_or_else(Vec3::zeros);
        }
        normals
    }

    /// Vertex sets connected through edges, each sorted, ordered by
    /// smallest member.
    pub fn connected_components(&self) -> Vec<Vec<usize>> {
        let neighbors = self.point_to_neighbors();
        let mut seen = BTreeSet::new();
        let mut components = Vec::new();
        for start in self.vertices() {
            if !seen.insert(start) {
                continue;
            }
            let mut component = vec![start];
            let mut stack = vec![start];
            while let Some(v) = stack.pop() {
                for &u in neighbors.get(&v).into_iter().flatten() {
                    if seen.insert(u) {
                        component.push(u);
                        stack.push(u);
                    }
                }
            }
            component.sort_unstable();
            components.push(component);
        }
        components
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn edges_sorted_and_unique(tris in prop::collection::vec((0usize..12, 0usize..12, 0usize..12), 1..20)) {
            let tris: Vec<[usize; 3]> = tris
                .into_iter()
                .filter(|(a, b, c)| a != b && b != c && a != c)
                .map(|(a, b, c)| [a, b, c])
                .collect();
            let m = TriangleMesh::new(tris);
            let edges = m.unique_edges();
            for w in edges.windows(2) {
                prop_assert!(w[0] < w[1]);
            }
            for e in &edges {
                prop_assert!(e[0] < e[1]);
            }
        }
    }
}
