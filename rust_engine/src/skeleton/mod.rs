//! Bone hierarchy

mod bone;
mod hierarchy;

pub use bone::Bone;
pub use hierarchy::Skeleton;

use glam::{Mat4, Quat, Vec3};

/// Decomposed bone transform
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoneTransform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for BoneTransform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl BoneTransform {
    pub fn from_matrix(matrix: Mat4) -> Self {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        Self {
            translation,
            rotation: rotation.normalize(),
            scale,
        }
    }

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    /// Blend towards `other`: translation and scale linearly, rotation by slerp
    pub fn blend(&self, other: &BoneTransform, t: f32) -> BoneTransform {
        BoneTransform {
            translation: self.translation.lerp(other.translation, t),
            rotation: self.rotation.slerp(other.rotation, t),
            scale: self.scale.lerp(other.scale, t),
        }
    }
}

/// Spherical interpolation between two rigid matrices
pub fn matrix_slerp(from: Mat4, to: Mat4, t: f32) -> Mat4 {
    BoneTransform::from_matrix(from)
        .blend(&BoneTransform::from_matrix(to), t)
        .to_matrix()
}
