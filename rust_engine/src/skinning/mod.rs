//! Vertex skinning

mod skinning;

pub use skinning::{compute_skinning, skinning_matrix, SkinningContext};

use glam::{Mat4, Vec3, Vec4};

use crate::model::MAX_INFLUENCES;

/// Bind pose vertex data and the current bone matrices
pub struct SkinningInput<'a> {
    /// Bind pose positions
    pub positions: &'a [Vec3],
    /// Bind pose normals, may be empty
    pub normals: &'a [Vec3],
    /// Bind pose tangents, may be empty
    pub tangents: &'a [Vec4],
    pub bone_indices: &'a [[u16; MAX_INFLUENCES]],
    pub bone_weights: &'a [[f32; MAX_INFLUENCES]],
    /// Vertices without bone influence, copied through
    pub unconnected: &'a [bool],
    /// Skinning matrices (already multiplied by the inverse bind)
    pub bone_matrices: &'a [Mat4],
}

/// Skinned vertex data, written in place
pub struct SkinningOutput<'a> {
    pub positions: &'a mut [Vec3],
    /// Left untouched when empty
    pub normals: &'a mut [Vec3],
    /// Left untouched when empty
    pub tangents: &'a mut [Vec4],
}
