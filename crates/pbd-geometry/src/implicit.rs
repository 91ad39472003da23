//! Signed-distance shapes.

use crate::{Aabb, LevelSet};
use pbd_math::{RigidTransform, SMALL_NUMBER, Vec3, orthogonal, try_normalize};

/// Signed-distance collision shape. Negative phi is inside.
#[derive(Debug, Clone)]
pub enum Implicit {
    /// Sphere around a local center.
    Sphere { center: Vec3, radius: f64 },
    /// Axis-aligned box in local coordinates.
    Box { min: Vec3, max: Vec3 },
    /// Segment `a`-`b` swept by `radius`.
    Capsule { a: Vec3, b: Vec3, radius: f64 },
    /// Infinite half-space `normal · (x - point) <= 0`.
    Plane { point: Vec3, normal: Vec3 },
    /// Intersection of half-spaces.
    Convex(Convex),
    /// Sampled signed distance on a grid.
    LevelSet(LevelSet),
    /// Union of shapes; phi is the minimum over members.
    Union(Vec<Implicit>),
    /// A shape placed by a rigid transform.
    Transformed {
        transform: RigidTransform,
        shape: Box<Implicit>,
    },
}

/// Plane `normal · x = distance`; the convex lies on the negative side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HalfSpace {
    pub normal: Vec3,
    pub distance: f64,
}

impl HalfSpace {
    /// Half-space bounded by the plane through `point` with outward `normal`.
    pub fn new(point: &Vec3, normal: &Vec3) -> Option<Self> {
        let normal = try_normalize(normal)?;
        Some(Self {
            normal,
            distance: normal.dot(point),
        })
    }

    #[inline]
    pub fn phi(&self, x: &Vec3) -> f64 {
        self.normal.dot(x) - self.distance
    }
}

/// Convex polytope given as half-spaces. Vertices are derived once at
/// construction; a polytope that does not close yields none and is
/// treated as unbounded.
#[derive(Debug, Clone, PartialEq)]
pub struct Convex {
    planes: Vec<HalfSpace>,
    vertices: Vec<Vec3>,
}

impl Convex {
    pub fn from_planes(planes: Vec<HalfSpace>) -> Self {
        let vertices = polytope_vertices(&planes);
        Self { planes, vertices }
    }

    /// Axis-aligned box as a polytope.
    pub fn from_aabb(aabb: &Aabb) -> Self {
        let planes = vec![
            HalfSpace { normal: Vec3::x(), distance: aabb.max.x },
            HalfSpace { normal: -Vec3::x(), distance: -aabb.min.x },
            HalfSpace { normal: Vec3::y(), distance: aabb.max.y },
            HalfSpace { normal: -Vec3::y(), distance: -aabb.min.y },
            HalfSpace { normal: Vec3::z(), distance: aabb.max.z },
            HalfSpace { normal: -Vec3::z(), distance: -aabb.min.z },
        ];
        Self::from_planes(planes)
    }

    pub fn planes(&self) -> &[HalfSpace] {
        &self.planes
    }

    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    fn phi_with_normal(&self, x: &Vec3) -> (f64, Vec3) {
        let mut best = (f64::NEG_INFINITY, Vec3::z());
        for plane in &self.planes {
            let phi = plane.phi(x);
            if phi > best.0 {
                best = (phi, plane.normal);
            }
        }
        if self.planes.is_empty() {
            (f64::MAX, Vec3::z())
        } else {
            best
        }
    }
}

/// Corners of the polytope: every triple-plane intersection inside all planes.
fn polytope_vertices(planes: &[HalfSpace]) -> Vec<Vec3> {
    const TOLERANCE: f64 = 1e-6;
    let mut vertices: Vec<Vec3> = Vec::new();
    for i in 0..planes.len() {
        for j in (i + 1)..planes.len() {
            for k in (j + 1)..planes.len() {
                let (a, b, c) = (&planes[i], &planes[j], &planes[k]);
                let det = a.normal.dot(&b.normal.cross(&c.normal));
                if det.abs() < SMALL_NUMBER {
                    continue;
                }
                let p = (b.normal.cross(&c.normal) * a.distance
                    + c.normal.cross(&a.normal) * b.distance
                    + a.normal.cross(&b.normal) * c.distance)
                    / det;
                let inside = planes.iter().all(|pl| pl.phi(&p) <= TOLERANCE);
                let duplicate = vertices.iter().any(|v| (v - p).norm() < TOLERANCE);
                if inside && !duplicate {
                    vertices.push(p);
                }
            }
        }
    }
    vertices
}

impl Implicit {
    /// Sphere centered at the local origin.
    pub fn sphere(radius: f64) -> Self {
        Implicit::Sphere {
            center: Vec3::zeros(),
            radius,
        }
    }

    /// Box centered at the local origin.
    pub fn cuboid(half_extents: Vec3) -> Self {
        Implicit::Box {
            min: -half_extents,
            max: half_extents,
        }
    }

    /// Capsule along local Z.
    pub fn capsule(half_length: f64, radius: f64) -> Self {
        Implicit::Capsule {
            a: Vec3::new(0.0, 0.0, -half_length),
            b: Vec3::new(0.0, 0.0, half_length),
            radius,
        }
    }

    /// Ground plane through `point` facing `normal`.
    pub fn plane(point: Vec3, normal: Vec3) -> Self {
        let normal = try_normalize(&normal).unwrap_or_else(Vec3::z);
        Implicit::Plane { point, normal }
    }

    pub fn transformed(self, transform: RigidTransform) -> Self {
        Implicit::Transformed {
            transform,
            shape: Box::new(self),
        }
    }

    /// Signed distance to the surface.
    pub fn signed_distance(&self, x: &Vec3) -> f64 {
        self.phi_with_normal(x).0
    }

    /// Signed distance and outward unit normal at `x`.
    pub fn phi_with_normal(&self, x: &Vec3) -> (f64, Vec3) {
        match self {
            Implicit::Sphere { center, radius } => {
                let d = x - center;
                let len = d.norm();
                let normal = if len > SMALL_NUMBER { d / len } else { Vec3::z() };
                (len - radius, normal)
            }
            Implicit::Box { min, max } => box_phi(min, max, x),
            Implicit::Capsule { a, b, radius } => {
                let closest = closest_on_segment(a, b, x);
                let d = x - closest;
                let len = d.norm();
                let normal = if len > SMALL_NUMBER {
                    d / len
                } else {
                    orthogonal(&(b - a))
                };
                (len - radius, normal)
            }
            Implicit::Plane { point, normal } => (normal.dot(&(x - point)), *normal),
            Implicit::Convex(convex) => convex.phi_with_normal(x),
            Implicit::LevelSet(level_set) => level_set.phi_with_normal(x),
            Implicit::Union(shapes) => shapes
                .iter()
                .map(|s| s.phi_with_normal(x))
                .min_by(|a, b| a.0.total_cmp(&b.0))
                .unwrap_or((f64::MAX, Vec3::z())),
            Implicit::Transformed { transform, shape } => {
                let local = transform.inverse_transform_position(x);
                let (phi, normal) = shape.phi_with_normal(&local);
                (phi, transform.transform_vector(&normal))
            }
        }
    }

    /// Local-space bounds, `None` for unbounded shapes.
    pub fn bounding_box(&self) -> Option<Aabb> {
        match self {
            Implicit::Sphere { center, radius } => {
                Some(Aabb::from_point(*center).thicken(*radius))
            }
            Implicit::Box { min, max } => Some(Aabb::new(*min, *max)),
            Implicit::Capsule { a, b, radius } => {
                let mut aabb = Aabb::from_point(*a);
                aabb.grow_to_include(b);
                Some(aabb.thicken(*radius))
            }
            Implicit::Plane { .. } => None,
            Implicit::Convex(convex) => Aabb::from_points(convex.vertices()),
            Implicit::LevelSet(level_set) => Some(level_set.bounding_box()),
            Implicit::Union(shapes) => {
                let mut out: Option<Aabb> = None;
                for shape in shapes {
                    let aabb = shape.bounding_box()?;
                    out = Some(match out {
                        Some(acc) => acc.union(&aabb),
                        None => aabb,
                    });
                }
                out
            }
            Implicit::Transformed { transform, shape } => {
                shape.bounding_box().map(|b| b.transformed(transform))
            }
        }
    }

    pub fn has_bounding_box(&self) -> bool {
        self.bounding_box().is_some()
    }

    /// Points on the surface, used to probe another shape's distance field.
    pub fn surface_samples(&self) -> Vec<Vec3> {
        match self {
            Implicit::Sphere { center, radius } => unit_directions()
                .iter()
                .map(|d| center + d * *radius)
                .collect(),
            Implicit::Box { min, max } => {
                let aabb = Aabb::new(*min, *max);
                let c = aabb.center();
                let mut samples = aabb.corners().to_vec();
                for axis in 0..3 {
                    for &end in &[min[axis], max[axis]] {
                        let mut face = c;
                        face[axis] = end;
                        samples.push(face);
                    }
                }
                // Edge midpoints.
                for axis in 0..3 {
                    let (u, v) = ((axis + 1) % 3, (axis + 2) % 3);
                    for &eu in &[min[u], max[u]] {
                        for &ev in &[min[v], max[v]] {
                            let mut mid = c;
                            mid[u] = eu;
                            mid[v] = ev;
                            samples.push(mid);
                        }
                    }
                }
                samples
            }
            Implicit::Capsule { a, b, radius } => {
                let axis = try_normalize(&(b - a)).unwrap_or_else(Vec3::z);
                let side = orthogonal(&axis);
                let other = axis.cross(&side);
                let mut samples = vec![a - axis * *radius, b + axis * *radius];
                for t in [0.0, 0.5, 1.0] {
                    let p = a.lerp(b, t);
                    for dir in [side, -side, other, -other] {
                        samples.push(p + dir * *radius);
                    }
                }
                samples
            }
            Implicit::Plane { .. } => Vec::new(),
            Implicit::Convex(convex) => convex.vertices().to_vec(),
            Implicit::LevelSet(level_set) => level_set.surface_samples(),
            Implicit::Union(shapes) => shapes.iter().flat_map(|s| s.surface_samples()).collect(),
            Implicit::Transformed { transform, shape } => shape
                .surface_samples()
                .iter()
                .map(|p| transform.transform_position(p))
                .collect(),
        }
    }

    /// Geometric center of the local bounds, or the origin when unbounded.
    pub fn center(&self) -> Vec3 {
        self.bounding_box().map(|b| b.center()).unwrap_or_else(Vec3::zeros)
    }
}

fn box_phi(min: &Vec3, max: &Vec3, x: &Vec3) -> (f64, Vec3) {
    let center = (min + max) * 0.5;
    let half = (max - min) * 0.5;
    let local = x - center;
    let q = local.abs() - half;

    let outside = q.sup(&Vec3::zeros());
    let outside_len = outside.norm();
    if outside_len > 0.0 {
        let signed = Vec3::new(
            outside.x.copysign(local.x),
            outside.y.copysign(local.y),
            outside.z.copysign(local.z),
        );
        return (outside_len, signed / outside_len);
    }

    // Inside: nearest face wins.
    let axis = q.imax();
    let mut normal = Vec3::zeros();
    normal[axis] = if local[axis] >= 0.0 { 1.0 } else { -1.0 };
    (q[axis], normal)
}

fn closest_on_segment(a: &Vec3, b: &Vec3, x: &Vec3) -> Vec3 {
    let ab = b - a;
    let len_sq = ab.norm_squared();
    if len_sq < SMALL_NUMBER {
        return *a;
    }
    let t = ((x - a).dot(&ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}

/// Axis and diagonal directions used to sample round shapes.
fn unit_directions() -> Vec<Vec3> {
    let mut dirs = Vec::with_capacity(14);
    for axis in 0..3 {
        for sign in [1.0, -1.0] {
            let mut d = Vec3::zeros();
            d[axis] = sign;
            dirs.push(d);
        }
    }
    let k = 1.0 / 3.0_f64.sqrt();
    for sx in [1.0, -1.0] {
        for sy in [1.0, -1.0] {
            for sz in [1.0, -1.0] {
                dirs.push(Vec3::new(sx, sy, sz) * k);
            }
        }
    }
    dirs
}
