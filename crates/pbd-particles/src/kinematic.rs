//! Kinematic collision proxies: posed shapes driven from outside.

use pbd_geometry::Implicit;
use pbd_math::{RigidTransform, Rotation, Vec3, rotation};

/// Posed signed-distance shapes with the velocities of their last move.
#[derive(Debug, Clone, Default)]
pub struct KinematicGeometryParticles {
    pub x: Vec<Vec3>,
    pub r: Vec<Rotation>,
    pub v: Vec<Vec3>,
    pub w: Vec<Vec3>,
    pub geometry: Vec<Implicit>,
}

impl KinematicGeometryParticles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Append a proxy at rest.
    pub fn add(&mut self, geometry: Implicit, transform: RigidTransform) -> usize {
        self.x.push(transform.translation);
        self.r.push(transform.rotation);
        self.v.push(Vec3::zeros());
        self.w.push(Vec3::zeros());
        self.geometry.push(geometry);
        self.x.len() - 1
    }

    /// Drop every proxy at or after `len`.
    pub fn truncate(&mut self, len: usize) {
        self.x.truncate(len);
        self.r.truncate(len);
        self.v.truncate(len);
        self.w.truncate(len);
        self.geometry.truncate(len);
    }

    pub fn transform(&self, index: usize) -> RigidTransform {
        RigidTransform::new(self.x[index], self.r[index])
    }

    /// Move a proxy and derive its velocities from the displacement.
    pub fn move_to(&mut self, index: usize, target: RigidTransform, dt: f64) {
        if dt > 0.0 {
            self.v[index] = (target.translation - self.x[index]) / dt;
            self.w[index] = rotation::angular_velocity(&self.r[index], &target.rotation, dt);
        } else {
            self.v[index] = Vec3::zeros();
            self.w[index] = Vec3::zeros();
        }
        self.x[index] = target.translation;
        self.r[index] = target.rotation;
    }

    /// Velocity of the point of proxy `index` currently at `point`.
    pub fn velocity_at(&self, index: usize, point: &Vec3) -> Vec3 {
        self.v[index] + self.w[index].cross(&(point - self.x[index]))
    }

    /// World-space signed distance and normal of proxy `index` at `point`.
    pub fn phi_with_normal(&self, index: usize, point: &Vec3) -> (f64, Vec3) {
        let transform = self.transform(index);
        let local = transform.inverse_transform_position(point);
        let (phi, normal) = self.geometry[index].phi_with_normal(&local);
        (phi, transform.transform_vector(&normal))
    }
}
