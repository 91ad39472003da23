//! Level sets: signed distance sampled on a uniform grid.

use crate::{Aabb, GeometryError, Implicit, Result, Triangle};
use pbd_math::{SMALL_NUMBER, Vec3};
use std::f64::consts::PI;
use tracing::debug;

/// Uniform grid with values stored at cell centers.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformGrid {
    min_corner: Vec3,
    cell_size: Vec3,
    counts: [usize; 3],
}

impl UniformGrid {
    /// Grid covering `bounds` with `counts` cells per axis.
    pub fn new(bounds: &Aabb, counts: [usize; 3]) -> Result<Self> {
        if counts.iter().any(|&c| c == 0) {
            return Err(GeometryError::EmptyGrid(counts));
        }
        let extents = bounds.extents();
        let cell_size = Vec3::new(
            extents.x / counts[0] as f64,
            extents.y / counts[1] as f64,
            extents.z / counts[2] as f64,
        );
        let smallest = cell_size.min();
        if !(smallest > 0.0) {
            return Err(GeometryError::InvalidCellSize(smallest));
        }
        Ok(Self {
            min_corner: bounds.min,
            cell_size,
            counts,
        })
    }

    /// Cubic-ish cells of edge `cell_size` covering `bounds`.
    pub fn with_cell_size(bounds: &Aabb, cell_size: f64) -> Result<Self> {
        if !(cell_size > 0.0) {
            return Err(GeometryError::InvalidCellSize(cell_size));
        }
        let extents = bounds.extents();
        let counts = [
            ((extents.x / cell_size).ceil() as usize).max(1),
            ((extents.y / cell_size).ceil() as usize).max(1),
            ((extents.z / cell_size).ceil() as usize).max(1),
        ];
        let max = bounds.min + Vec3::new(
            counts[0] as f64 * cell_size,
            counts[1] as f64 * cell_size,
            counts[2] as f64 * cell_size,
        );
        Self::new(&Aabb::new(bounds.min, max), counts)
    }

    pub fn counts(&self) -> [usize; 3] {
        self.counts
    }

    pub fn cell_size(&self) -> Vec3 {
        self.cell_size
    }

    pub fn num_cells(&self) -> usize {
        self.counts[0] * self.counts[1] * self.counts[2]
    }

    pub fn bounds(&self) -> Aabb {
        let max = self.min_corner
            + Vec3::new(
                self.cell_size.x * self.counts[0] as f64,
                self.cell_size.y * self.counts[1] as f64,
                self.cell_size.z * self.counts[2] as f64,
            );
        Aabb::new(self.min_corner, max)
    }

    #[inline]
    pub fn flat_index(&self, [i, j, k]: [usize; 3]) -> usize {
        (i * self.counts[1] + j) * self.counts[2] + k
    }

    pub fn cell_center(&self, [i, j, k]: [usize; 3]) -> Vec3 {
        self.min_corner
            + Vec3::new(
                (i as f64 + 0.5) * self.cell_size.x,
                (j as f64 + 0.5) * self.cell_size.y,
                (k as f64 + 0.5) * self.cell_size.z,
            )
    }

    pub fn cells(&self) -> impl Iterator<Item = [usize; 3]> + '_ {
        let [ni, nj, nk] = self.counts;
        (0..ni).flat_map(move |i| (0..nj).flat_map(move |j| (0..nk).map(move |k| [i, j, k])))
    }
}

/// Signed distance sampled on a [`UniformGrid`], trilinearly interpolated.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelSet {
    grid: UniformGrid,
    phi: Vec<f64>,
}

impl LevelSet {
    /// Sample another shape's distance at every cell center.
    pub fn from_implicit(grid: UniformGrid, shape: &Implicit) -> Self {
        let phi = grid
            .cells()
            .map(|cell| shape.signed_distance(&grid.cell_center(cell)))
            .collect();
        Self { grid, phi }
    }

    /// Distance to a closed triangle mesh; inside/outside from the
    /// generalized winding number, so either winding order works.
    pub fn from_triangles(
        grid: UniformGrid,
        vertices: &[Vec3],
        triangles: &[[usize; 3]],
    ) -> Result<Self> {
        if triangles.is_empty() {
            return Err(GeometryError::EmptyMesh);
        }
        for (t, tri) in triangles.iter().enumerate() {
            if let Some(&index) = tri.iter().find(|&&i| i >= vertices.len()) {
                return Err(GeometryError::VertexOutOfBounds {
                    triangle: t,
                    index,
                    count: vertices.len(),
                });
            }
        }
        let faces: Vec<Triangle> = triangles
            .iter()
            .map(|&[a, b, c]| Triangle::new(vertices[a], vertices[b], vertices[c]))
            .collect();

        let phi = grid
            .cells()
            .map(|cell| {
                let x = grid.cell_center(cell);
                let distance = faces
                    .iter()
                    .map(|f| (f.closest_point(&x).0 - x).norm())
                    .fold(f64::MAX, f64::min);
                let winding: f64 = faces.iter().map(|f| f.solid_angle(&x)).sum::<f64>() / (4.0 * PI);
                if winding.abs() > 0.5 { -distance } else { distance }
            })
            .collect();

        debug!(
            cells = grid.num_cells(),
            triangles = faces.len(),
            "built level set from mesh"
        );
        Ok(Self { grid, phi })
    }

    pub fn grid(&self) -> &UniformGrid {
        &self.grid
    }

    pub fn bounding_box(&self) -> Aabb {
        self.grid.bounds()
    }

    fn sample(&self, [i, j, k]: [usize; 3]) -> f64 {
        self.phi[self.grid.flat_index([i, j, k])]
    }

    /// Trilinear interpolation; `x` must already be clamped into the
    /// region spanned by cell centers.
    fn interpolate(&self, x: &Vec3) -> f64 {
        let mut base = [0usize; 3];
        let mut frac = [0.0f64; 3];
        for axis in 0..3 {
            let n = self.grid.counts[axis];
            let rel = (x[axis] - self.grid.min_corner[axis]) / self.grid.cell_size[axis] - 0.5;
            if n == 1 {
                base[axis] = 0;
                frac[axis] = 0.0;
                continue;
            }
            let clamped = rel.clamp(0.0, (n - 1) as f64);
            let cell = (clamped.floor() as usize).min(n - 2);
            base[axis] = cell;
            frac[axis] = clamped - cell as f64;
        }
        let mut value = 0.0;
        for corner in 0..8 {
            let mut idx = base;
            let mut weight = 1.0;
            for axis in 0..3 {
                let upper = (corner >> axis) & 1 == 1;
                if upper && self.grid.counts[axis] > 1 {
                    idx[axis] += 1;
                    weight *= frac[axis];
                } else if upper {
                    weight = 0.0;
                } else {
                    weight *= 1.0 - frac[axis];
                }
            }
            if weight > 0.0 {
                value += weight * self.sample(idx);
            }
        }
        value
    }

    /// Signed distance; outside the grid the distance to the grid is added.
    pub fn signed_distance(&self, x: &Vec3) -> f64 {
        let bounds = self.grid.bounds();
        let clamped = x.sup(&bounds.min).inf(&bounds.max);
        self.interpolate(&clamped) + (x - clamped).norm()
    }

    pub fn phi_with_normal(&self, x: &Vec3) -> (f64, Vec3) {
        let phi = self.signed_distance(x);
        let h = self.grid.cell_size * 0.5;
        let mut gradient = Vec3::zeros();
        for axis in 0..3 {
            let mut offset = Vec3::zeros();
            offset[axis] = h[axis];
            gradient[axis] = (self.signed_distance(&(x + offset))
                - self.signed_distance(&(x - offset)))
                / (2.0 * h[axis]);
        }
        let normal = gradient.try_normalize(SMALL_NUMBER).unwrap_or_else(Vec3::z);
        (phi, normal)
    }

    /// Cells close to the zero crossing, projected onto the surface.
    pub fn surface_samples(&self) -> Vec<Vec3> {
        let band = self.grid.cell_size.max();
        self.grid
            .cells()
            .filter_map(|cell| {
                let phi = self.sample(cell);
                if phi.abs() > band {
                    return None;
                }
                let center = self.grid.cell_center(cell);
                let (phi, normal) = self.phi_with_normal(&center);
                Some(center - normal * phi)
            })
            .collect()
    }
}
