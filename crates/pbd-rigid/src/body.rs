//! Detached copy of one rigid body's solver state.

use pbd_geometry::Implicit;
use pbd_math::{Mat3, RigidTransform, Rotation, Vec3, rotation, world_inertia};
use pbd_particles::RigidParticles;
use std::sync::Arc;

/// Everything a contact or joint solve reads and writes for one body.
///
/// Solvers work on copies so that independent pairs can be evaluated
/// from a shared borrow and written back afterwards.
#[derive(Debug, Clone)]
pub struct BodyState {
    /// Index in the owning [`RigidParticles`].
    pub index: usize,
    pub x: Vec3,
    pub r: Rotation,
    pub p: Vec3,
    pub q: Rotation,
    pub v: Vec3,
    pub w: Vec3,
    pub m: f64,
    pub inv_m: f64,
    /// Body-frame inertia and its inverse.
    pub inertia: Mat3,
    pub inv_inertia: Mat3,
    pub geometry: Option<Arc<Implicit>>,
    /// Dynamic and enabled; only dynamic states are ever written back.
    pub is_dynamic: bool,
}

impl BodyState {
    pub fn from_particles(particles: &RigidParticles, index: usize) -> Self {
        Self {
            index,
            x: particles.x[index],
            r: particles.r[index],
            p: particles.p[index],
            q: particles.q[index],
            v: particles.v[index],
            w: particles.w[index],
            m: particles.m[index],
            inv_m: particles.inv_m[index],
            inertia: particles.i[index],
            inv_inertia: particles.inv_i[index],
            geometry: particles.geometry[index].clone(),
            is_dynamic: particles.is_dynamic(index) && !particles.disabled[index],
        }
    }

    /// Copy the mutable state back. Non-dynamic bodies are left alone.
    pub fn write_to(&self, particles: &mut RigidParticles) {
        if !self.is_dynamic {
            return;
        }
        let i = self.index;
        particles.p[i] = self.p;
        particles.q[i] = self.q;
        particles.v[i] = self.v;
        particles.w[i] = self.w;
    }

    pub fn predicted_transform(&self) -> RigidTransform {
        RigidTransform::new(self.p, self.q)
    }

    /// World inverse inertia at the predicted orientation.
    pub fn world_inv_inertia(&self) -> Mat3 {
        world_inertia(&self.q, &self.inv_inertia)
    }

    pub fn world_inertia(&self) -> Mat3 {
        world_inertia(&self.q, &self.inertia)
    }

    /// Velocity of the material point at world offset `r` from `p`.
    pub fn point_velocity(&self, r: &Vec3) -> Vec3 {
        self.v + self.w.cross(r)
    }

    /// Apply a velocity impulse at offset `r`.
    pub fn apply_impulse(&mut self, impulse: &Vec3, r: &Vec3) {
        if !self.is_dynamic {
            return;
        }
        self.v += impulse * self.inv_m;
        self.w += self.world_inv_inertia() * r.cross(impulse);
    }

    /// Apply a position-level impulse at offset `r`, moving `p` and `q`.
    pub fn apply_position_impulse(&mut self, impulse: &Vec3, r: &Vec3) {
        if !self.is_dynamic {
            return;
        }
        let dtheta = self.world_inv_inertia() * r.cross(impulse);
        self.p += impulse * self.inv_m;
        self.q = rotation::integrate(&self.q, &dtheta, 1.0);
    }

    /// Re-predict the pose from the committed pose and current velocities.
    pub fn predict(&mut self, dt: f64) {
        if !self.is_dynamic {
            return;
        }
        self.p = self.x + self.v * dt;
        self.q = rotation::integrate(&self.r, &self.w, dt);
    }

    /// Velocities implied by the move from the committed to the predicted pose.
    pub fn update_velocities(&mut self, dt: f64) {
        if !self.is_dynamic || dt <= 0.0 {
            return;
        }
        self.v = (self.p - self.x) / dt;
        self.w = rotation::angular_velocity(&self.r, &self.q, dt);
    }

    /// Make the body immovable for the rest of a solve. A frozen state is
    /// never written back.
    pub fn freeze(&mut self) {
        self.is_dynamic = false;
        self.inv_m = 0.0;
        self.inv_inertia = Mat3::zeros();
    }

    /// Kinetic energy from the current velocities.
    pub fn kinetic_energy(&self) -> f64 {
        if !self.is_dynamic {
            return 0.0;
        }
        0.5 * (self.m * self.v.norm_squared() + self.w.dot(&(self.world_inertia() * self.w)))
    }
}

/// Effective inverse mass of a contact point pair: the matrix mapping an
/// impulse at the contact to the change in relative point velocity.
pub fn contact_mass_matrix(a: &BodyState, ra: &Vec3, b: &BodyState, rb: &Vec3) -> Mat3 {
    let mut k = Mat3::identity() * (a.inv_m + b.inv_m);
    for (body, r) in [(a, ra), (b, rb)] {
        if body.is_dynamic {
            let skew = pbd_math::skew(r);
            k += skew * body.world_inv_inertia() * skew.transpose();
        }
    }
    k
}
