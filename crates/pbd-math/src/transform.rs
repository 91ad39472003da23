//! Rigid transforms: a rotation followed by a translation.

use crate::{rotation, Rotation, Vec3};
use serde::{Deserialize, Serialize};

/// Maps local coordinates into a parent frame: x_parent = R x_local + t.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidTransform {
    /// Position of the local origin in the parent frame.
    pub translation: Vec3,
    /// Orientation of the local frame in the parent frame.
    pub rotation: Rotation,
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl RigidTransform {
    pub fn new(translation: Vec3, rotation: Rotation) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    pub fn identity() -> Self {
        Self {
            translation: Vec3::zeros(),
            rotation: Rotation::identity(),
        }
    }

    /// Pure translation.
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            rotation: Rotation::identity(),
        }
    }

    #[inline]
    pub fn transform_position(&self, p: &Vec3) -> Vec3 {
        self.rotation * p + self.translation
    }

    #[inline]
    pub fn transform_vector(&self, v: &Vec3) -> Vec3 {
        self.rotation * v
    }

    #[inline]
    pub fn inverse_transform_position(&self, p: &Vec3) -> Vec3 {
        self.rotation.inverse_transform_vector(&(p - self.translation))
    }

    #[inline]
    pub fn inverse_transform_vector(&self, v: &Vec3) -> Vec3 {
        self.rotation.inverse_transform_vector(v)
    }

    /// `self ∘ other`: first apply `other`, then `self`.
    pub fn compose(&self, other: &RigidTransform) -> RigidTransform {
        RigidTransform {
            translation: self.transform_position(&other.translation),
            rotation: self.rotation * other.rotation,
        }
    }

    pub fn inverse(&self) -> RigidTransform {
        let rotation = self.rotation.inverse();
        RigidTransform {
            translation: -(rotation * self.translation),
            rotation,
        }
    }

    /// `other` expressed in the frame of `self`.
    pub fn relative(&self, other: &RigidTransform) -> RigidTransform {
        self.inverse().compose(other)
    }

    /// Linear blend of translation, spherical blend of rotation.
    pub fn blend(&self, other: &RigidTransform, alpha: f64) -> RigidTransform {
        RigidTransform {
            translation: self.translation.lerp(&other.translation, alpha),
            rotation: rotation::slerp(&self.rotation, &other.rotation, alpha),
        }
    }
}
