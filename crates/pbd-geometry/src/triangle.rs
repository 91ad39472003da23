//! Triangle queries: closest point and segment intersection, both with
//! barycentric coordinates.

use crate::Aabb;
use pbd_math::{SMALL_NUMBER, Vec3, try_normalize};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub a: Vec3,
    pub b: Vec3,
    pub c: Vec3,
}

/// Where a segment crosses a triangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentHit {
    /// Fraction along the segment, in [0, 1].
    pub time: f64,
    pub point: Vec3,
    /// Weights of (a, b, c).
    pub bary: Vec3,
}

impl Triangle {
    pub fn new(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Self { a, b, c }
    }

    /// Unit normal following the (a, b, c) winding, `None` when degenerate.
    pub fn normal(&self) -> Option<Vec3> {
        try_normalize(&(self.b - self.a).cross(&(self.c - self.a)))
    }

    pub fn area(&self) -> f64 {
        0.5 * (self.b - self.a).cross(&(self.c - self.a)).norm()
    }

    pub fn bounding_box(&self) -> Aabb {
        let mut aabb = Aabb::from_point(self.a);
        aabb.grow_to_include(&self.b);
        aabb.grow_to_include(&self.c);
        aabb
    }

    /// Point with the given barycentric weights.
    pub fn point_at(&self, bary: &Vec3) -> Vec3 {
        self.a * bary.x + self.b * bary.y + self.c * bary.z
    }

    /// Closest point on the triangle to `p`, with its barycentrics.
    ///
    /// Region tests follow Ericson, Real-Time Collision Detection 5.1.5.
    pub fn closest_point(&self, p: &Vec3) -> (Vec3, Vec3) {
        let (a, b, c) = (self.a, self.b, self.c);
        let ab = b - a;
        let ac = c - a;

        let ap = p - a;
        let d1 = ab.dot(&ap);
        let d2 = ac.dot(&ap);
        if d1 <= 0.0 && d2 <= 0.0 {
            return (a, Vec3::new(1.0, 0.0, 0.0));
        }

        let bp = p - b;
        let d3 = ab.dot(&bp);
        let d4 = ac.dot(&bp);
        if d3 >= 0.0 && d4 <= d3 {
            return (b, Vec3::new(0.0, 1.0, 0.0));
        }

        let vc = d1 * d4 - d3 * d2;
        if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
            let v = d1 / (d1 - d3);
            return (a + ab * v, Vec3::new(1.0 - v, v, 0.0));
        }

        let cp = p - c;
        let d5 = ab.dot(&cp);
        let d6 = ac.dot(&cp);
        if d6 >= 0.0 && d5 <= d6 {
            return (c, Vec3::new(0.0, 0.0, 1.0));
        }

        let vb = d5 * d2 - d1 * d6;
        if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
            let w = d2 / (d2 - d6);
            return (a + ac * w, Vec3::new(1.0 - w, 0.0, w));
        }

        let va = d3 * d6 - d5 * d4;
        if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
            let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
            return (b + (c - b) * w, Vec3::new(0.0, 1.0 - w, w));
        }

        let sum = va + vb + vc;
        if sum.abs() < SMALL_NUMBER {
            return (a, Vec3::new(1.0, 0.0, 0.0));
        }
        let v = vb / sum;
        let w = vc / sum;
        (a + ab * v + ac * w, Vec3::new(1.0 - v - w, v, w))
    }

    /// Segment/triangle intersection (Möller–Trumbore), two-sided.
    pub fn intersect_segment(&self, start: &Vec3, end: &Vec3) -> Option<SegmentHit> {
        let dir = end - start;
        let e1 = self.b - self.a;
        let e2 = self.c - self.a;
        let h = dir.cross(&e2);
        let det = e1.dot(&h);
        if det.abs() < SMALL_NUMBER {
            return None;
        }
        let inv_det = 1.0 / det;
        let s = start - self.a;
        let u = inv_det * s.dot(&h);
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let q = s.cross(&e1);
        let v = inv_det * dir.dot(&q);
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let time = inv_det * e2.dot(&q);
        if !(0.0..=1.0).contains(&time) {
            return None;
        }
        Some(SegmentHit {
            time,
            point: start + dir * time,
            bary: Vec3::new(1.0 - u - v, u, v),
        })
    }

    /// Solid angle subtended at `p` (Van Oosterom and Strackee), signed by winding.
    pub fn solid_angle(&self, p: &Vec3) -> f64 {
        let a = self.a - p;
        let b = self.b - p;
        let c = self.c - p;
        let (la, lb, lc) = (a.norm(), b.norm(), c.norm());
        let numerator = a.dot(&b.cross(&c));
        let denominator = la * lb * lc + a.dot(&b) * lc + b.dot(&c) * la + c.dot(&a) * lb;
        2.0 * numerator.atan2(denominator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit() -> Triangle {
        Triangle::new(
            Vec3::zeros(),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        )
    }

    #[test]
    fn closest_point_interior() {
        let (p, bary) = unit().closest_point(&Vec3::new(0.25, 0.25, 3.0));
        assert_relative_eq!(p, Vec3::new(0.25, 0.25, 0.0), epsilon = 1e-12);
        assert_relative_eq!(bary, Vec3::new(0.5, 0.25, 0.25), epsilon = 1e-12);
    }

    #[test]
    fn closest_point_vertex_and_edge() {
        let t = unit();
        let (p, _) = t.closest_point(&Vec3::new(-1.0, -1.0, 0.0));
        assert_relative_eq!(p, Vec3::zeros(), epsilon = 1e-12);
        let (p, bary) = t.closest_point(&Vec3::new(0.5, -2.0, 1.0));
        assert_relative_eq!(p, Vec3::new(0.5, 0.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(bary, Vec3::new(0.5, 0.5, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn segment_hits_and_misses() {
        let t = unit();
        let hit = t
            .intersect_segment(&Vec3::new(0.2, 0.2, 1.0), &Vec3::new(0.2, 0.2, -1.0))
            .expect("segment crosses the triangle");
        assert_relative_eq!(hit.time, 0.5, epsilon = 1e-12);
        assert_relative_eq!(hit.point, Vec3::new(0.2, 0.2, 0.0), epsilon = 1e-12);
        assert_relative_eq!(t.point_at(&hit.bary), hit.point, epsilon = 1e-12);

        assert!(
            t.intersect_segment(&Vec3::new(0.2, 0.2, 1.0), &Vec3::new(0.2, 0.2, 0.5))
                .is_none()
        );
        assert!(
            t.intersect_segment(&Vec3::new(2.0, 2.0, 1.0), &Vec3::new(2.0, 2.0, -1.0))
                .is_none()
        );
    }

    #[test]
    fn degenerate_triangle_has_no_normal() {
        let t = Triangle::new(Vec3::zeros(), Vec3::x(), Vec3::x() * 2.0);
        assert!(t.normal().is_none());
        assert_relative_eq!(t.area(), 0.0);
    }
}
