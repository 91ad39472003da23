//! Shortest paths along mesh edges.

use pbd_math::Vec3;
use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

/// For every point: distance along edges to the nearest source and which
/// source that is. Unreachable points keep `f64::INFINITY` and `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct GeodesicField {
    pub distance: Vec<f64>,
    pub source: Vec<Option<usize>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Visit {
    distance: f64,
    point: usize,
}

impl Eq for Visit {}

impl Ord for Visit {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on distance, ties broken by index for determinism.
        other
            .distance
            .total_cmp(&self.distance)
            .then_with(|| other.point.cmp(&self.point))
    }
}

impl PartialOrd for Visit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Multi-source Dijkstra over edge lengths measured on `points`.
pub fn nearest_sources(
    neighbors: &HashMap<usize, BTreeSet<usize>>,
    points: &[Vec3],
    sources: &[usize],
) -> GeodesicField {
    let mut field = GeodesicField {
        distance: vec![f64::INFINITY; points.len()],
        source: vec![None; points.len()],
    };
    let mut heap = BinaryHeap::new();
    for &s in sources {
        if s < points.len() && field.distance[s] > 0.0 {
            field.distance[s] = 0.0;
            field.source[s] = Some(s);
            heap.push(Visit {
                distance: 0.0,
                point: s,
            });
        }
    }
    while let Some(Visit { distance, point }) = heap.pop() {
        if distance > field.distance[point] {
            continue;
        }
        for &next in neighbors.get(&point).into_iter().flatten() {
            if next >= points.len() {
                continue;
            }
            let candidate = distance + (points[next] - points[point]).norm();
            if candidate < field.distance[next] {
                field.distance[next] = candidate;
                field.source[next] = field.source[point];
                heap.push(Visit {
                    distance: candidate,
                    point: next,
                });
            }
        }
    }
    field
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TriangleMesh;
    use approx::assert_relative_eq;

    #[test]
    fn path_around_a_corner() {
        // L-shaped strip: 0-1-2 along x, then 2-3 along y.
        let points = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(2.0, 1.0, 0.0),
        ];
        let mut neighbors: HashMap<usize, BTreeSet<usize>> = HashMap::new();
        for (a, b) in [(0, 1), (1, 2), (2, 3)] {
            neighbors.entry(a).or_default().insert(b);
            neighbors.entry(b).or_default().insert(a);
        }
        let field = nearest_sources(&neighbors, &points, &[0]);
        assert_relative_eq!(field.distance[3], 3.0);
        assert_eq!(field.source[3], Some(0));
    }

    #[test]
    fn nearest_of_two_sources() {
        let m = TriangleMesh::new(vec![[0, 1, 2], [1, 3, 2], [2, 3, 4], [3, 5, 4]]);
        let points: Vec<Vec3> = (0..6)
            .map(|k| Vec3::new((k / 2) as f64, (k % 2) as f64, 0.0))
            .collect();
        let field = nearest_sources(&m.point_to_neighbors(), &points, &[0, 5]);
        assert_eq!(field.source[1], Some(0));
        assert_eq!(field.source[4], Some(5));
        assert_relative_eq!(field.distance[0], 0.0);
    }

    #[test]
    fn unreachable_stays_infinite() {
        let points = vec![Vec3::zeros(), Vec3::x()];
        let field = nearest_sources(&HashMap::new(), &points, &[0]);
        assert!(field.distance[1].is_infinite());
        assert_eq!(field.source[1], None);
    }
}
