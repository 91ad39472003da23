//! Rigid particles: position plus orientation, inertia and shape.

use crate::ParticleKind;
use pbd_geometry::{Aabb, Implicit};
use pbd_math::{Mat3, RigidTransform, Rotation, Vec3, world_inertia};
use std::sync::Arc;

/// Solid sphere inertia about its center.
pub fn sphere_inertia(mass: f64, radius: f64) -> Mat3 {
    Mat3::identity() * (0.4 * mass * radius * radius)
}

/// Solid box inertia about its center.
pub fn box_inertia(mass: f64, half_extents: &Vec3) -> Mat3 {
    let e = half_extents * 2.0;
    let k = mass / 12.0;
    Mat3::from_diagonal(&Vec3::new(
        k * (e.y * e.y + e.z * e.z),
        k * (e.x * e.x + e.z * e.z),
        k * (e.x * e.x + e.y * e.y),
    ))
}

/// Description of a rigid body to append to a [`RigidParticles`] store.
#[derive(Debug, Clone)]
pub struct RigidBodyDesc {
    pub kind: ParticleKind,
    pub position: Vec3,
    pub rotation: Rotation,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
    pub mass: f64,
    pub inertia: Mat3,
    pub geometry: Option<Arc<Implicit>>,
}

impl RigidBodyDesc {
    pub fn dynamic(mass: f64) -> Self {
        Self {
            kind: ParticleKind::Dynamic,
            position: Vec3::zeros(),
            rotation: Rotation::identity(),
            velocity: Vec3::zeros(),
            angular_velocity: Vec3::zeros(),
            mass,
            inertia: Mat3::identity() * mass,
            geometry: None,
        }
    }

    pub fn kinematic() -> Self {
        Self {
            kind: ParticleKind::Kinematic,
            ..Self::dynamic(0.0)
        }
    }

    pub fn fixed() -> Self {
        Self {
            kind: ParticleKind::Static,
            ..Self::dynamic(0.0)
        }
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_angular_velocity(mut self, angular_velocity: Vec3) -> Self {
        self.angular_velocity = angular_velocity;
        self
    }

    pub fn with_inertia(mut self, inertia: Mat3) -> Self {
        self.inertia = inertia;
        self
    }

    pub fn with_geometry(mut self, geometry: Implicit) -> Self {
        self.geometry = Some(Arc::new(geometry));
        self
    }

    /// Attach a shared shape.
    pub fn with_shared_geometry(mut self, geometry: Arc<Implicit>) -> Self {
        self.geometry = Some(geometry);
        self
    }
}

/// Structure-of-arrays rigid body store.
///
/// `p`/`q` are the predicted pose the solver works on and are committed
/// to `x`/`r` at the end of a step. Inertia tensors are body-frame.
#[derive(Debug, Clone, Default)]
pub struct RigidParticles {
    pub x: Vec<Vec3>,
    pub p: Vec<Vec3>,
    pub r: Vec<Rotation>,
    pub q: Vec<Rotation>,
    pub v: Vec<Vec3>,
    pub w: Vec<Vec3>,
    /// Velocities before this step's integration.
    pub pre_v: Vec<Vec3>,
    pub pre_w: Vec<Vec3>,
    /// External force and torque, cleared after every integration.
    pub f: Vec<Vec3>,
    pub torque: Vec<Vec3>,
    pub m: Vec<f64>,
    pub inv_m: Vec<f64>,
    pub i: Vec<Mat3>,
    pub inv_i: Vec<Mat3>,
    pub geometry: Vec<Option<Arc<Implicit>>>,
    pub kind: Vec<ParticleKind>,
    pub sleeping: Vec<bool>,
    pub disabled: Vec<bool>,
    pub island: Vec<Option<usize>>,
}

impl RigidParticles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Append a body and return its index.
    pub fn add(&mut self, desc: RigidBodyDesc) -> usize {
        let index = self.x.len();
        self.x.push(desc.position);
        self.p.push(desc.position);
        self.r.push(desc.rotation);
        self.q.push(desc.rotation);
        self.v.push(desc.velocity);
        self.w.push(desc.angular_velocity);
        self.pre_v.push(desc.velocity);
        self.pre_w.push(desc.angular_velocity);
        self.f.push(Vec3::zeros());
        self.torque.push(Vec3::zeros());
        self.m.push(desc.mass);
        self.inv_m.push(0.0);
        self.i.push(desc.inertia);
        self.inv_i.push(Mat3::zeros());
        self.geometry.push(desc.geometry);
        self.kind.push(desc.kind);
        self.sleeping.push(false);
        self.disabled.push(false);
        self.island.push(None);
        self.set_mass_properties(index, desc.mass, desc.inertia);
        self.set_kind(index, desc.kind);
        index
    }

    /// Set mass and body-frame inertia; inverses follow the particle kind.
    pub fn set_mass_properties(&mut self, index: usize, mass: f64, inertia: Mat3) {
        self.m[index] = mass;
        self.i[index] = inertia;
        self.refresh_inverses(index);
    }

    /// Change kind. Non-dynamic kinds get zero inverse mass and inertia;
    /// static bodies also lose their velocity.
    pub fn set_kind(&mut self, index: usize, kind: ParticleKind) {
        self.kind[index] = kind;
        if kind == ParticleKind::Static {
            self.v[index] = Vec3::zeros();
            self.w[index] = Vec3::zeros();
        }
        self.refresh_inverses(index);
    }

    fn refresh_inverses(&mut self, index: usize) {
        let mass = self.m[index];
        if self.kind[index].is_dynamic() && mass > 0.0 && mass.is_finite() {
            self.inv_m[index] = 1.0 / mass;
            self.inv_i[index] = self.i[index].try_inverse().unwrap_or_else(Mat3::zeros);
        } else {
            self.inv_m[index] = 0.0;
            self.inv_i[index] = Mat3::zeros();
        }
    }

    #[inline]
    pub fn is_dynamic(&self, index: usize) -> bool {
        self.kind[index].is_dynamic()
    }

    /// Dynamic, awake and enabled.
    #[inline]
    pub fn is_active_dynamic(&self, index: usize) -> bool {
        self.is_dynamic(index) && !self.sleeping[index] && !self.disabled[index]
    }

    /// Committed pose.
    pub fn transform(&self, index: usize) -> RigidTransform {
        RigidTransform::new(self.x[index], self.r[index])
    }

    /// Predicted pose.
    pub fn predicted_transform(&self, index: usize) -> RigidTransform {
        RigidTransform::new(self.p[index], self.q[index])
    }

    /// World-frame inverse inertia at the predicted orientation.
    pub fn world_inv_inertia(&self, index: usize) -> Mat3 {
        world_inertia(&self.q[index], &self.inv_i[index])
    }

    /// World bounds at the predicted pose, `None` without a bounded shape.
    pub fn world_bounds(&self, index: usize) -> Option<Aabb> {
        let shape = self.geometry[index].as_ref()?;
        shape
            .bounding_box()
            .map(|b| b.transformed(&self.predicted_transform(index)))
    }

    /// Wake a body.
    pub fn wake(&mut self, index: usize) {
        self.sleeping[index] = false;
    }

    /// Put a body to sleep, zeroing its velocities.
    pub fn sleep(&mut self, index: usize) {
        self.sleeping[index] = true;
        self.v[index] = Vec3::zeros();
        self.w[index] = Vec3::zeros();
    }
}
