//! Linear blend skinning

use glam::{Mat4, Vec3, Vec4};
use rayon::prelude::*;

use super::{SkinningInput, SkinningOutput};
use crate::config::EngineConfig;

/// Skinning options
#[derive(Clone, Copy, Debug)]
pub struct SkinningContext {
    /// Spread vertices over the rayon pool
    pub parallel: bool,
    /// Also skin tangents
    pub tangents: bool,
}

impl Default for SkinningContext {
    fn default() -> Self {
        Self {
            parallel: true,
            tangents: true,
        }
    }
}

impl SkinningContext {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            parallel: config.parallel_skinning,
            tangents: config.skin_tangents(),
        }
    }
}

/// Matrix moving a bind pose vertex to its animated position
///
/// `inv_parent_space` brings the result back into the space of the entity
/// (usually the inverse of its world matrix).
pub fn skinning_matrix(inv_parent_space: Mat4, bone_world: Mat4, inv_bind: Mat4) -> Mat4 {
    inv_parent_space * bone_world * inv_bind
}

fn get_matrix(matrices: &[Mat4], index: u16) -> Mat4 {
    matrices.get(index as usize).copied().unwrap_or(Mat4::IDENTITY)
}

/// Weighted sum of the vertex's bone matrices, `None` for unconnected vertices
fn blended_matrix(input: &SkinningInput, vertex: usize) -> Option<Mat4> {
    if input.unconnected.get(vertex).copied().unwrap_or(true) {
        return None;
    }
    let bones = input.bone_indices[vertex];
    let weights = input.bone_weights[vertex];

    let mut m = Mat4::ZERO;
    for (bone, weight) in bones.iter().zip(weights.iter()) {
        if *weight > 0.0 {
            m += get_matrix(input.bone_matrices, *bone) * *weight;
        }
    }
    Some(m)
}

/// Skin all vertices of `input` into `output`
///
/// Positions are always skinned. Normals and tangents are skinned when their
/// streams match the positions and are skipped otherwise. Parallel and
/// sequential runs produce identical results.
pub fn compute_skinning(ctx: &SkinningContext, input: &SkinningInput, output: &mut SkinningOutput) {
    let skin_position = |i: usize, pos: &mut Vec3| {
        *pos = match blended_matrix(input, i) {
            Some(m) => m.transform_point3(input.positions[i]),
            None => input.positions[i],
        };
    };
    let skin_normal = |i: usize, norm: &mut Vec3| {
        *norm = match blended_matrix(input, i) {
            Some(m) => m.transform_vector3(input.normals[i]).normalize_or_zero(),
            None => input.normals[i],
        };
    };
    let skin_tangent = |i: usize, tan: &mut Vec4| {
        let src = input.tangents[i];
        *tan = match blended_matrix(input, i) {
            Some(m) => m.transform_vector3(src.truncate()).normalize_or_zero().extend(src.w),
            None => src,
        };
    };

    let count = input.positions.len().min(output.positions.len());
    let do_normals = !output.normals.is_empty()
        && input.normals.len() >= count
        && output.normals.len() == output.positions.len();
    let do_tangents = ctx.tangents
        && !output.tangents.is_empty()
        && input.tangents.len() >= count
        && input.tangents.len() == output.tangents.len();

    if ctx.parallel {
        output.positions[..count]
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, pos)| skin_position(i, pos));

        if do_normals {
            output.normals[..count]
                .par_iter_mut()
                .enumerate()
                .for_each(|(i, norm)| skin_normal(i, norm));
        }
        if do_tangents {
            output.tangents[..count]
                .par_iter_mut()
                .enumerate()
                .for_each(|(i, tan)| skin_tangent(i, tan));
        }
    } else {
        output.positions[..count]
            .iter_mut()
            .enumerate()
            .for_each(|(i, pos)| skin_position(i, pos));

        if do_normals {
            output.normals[..count]
                .iter_mut()
                .enumerate()
                .for_each(|(i, norm)| skin_normal(i, norm));
        }
        if do_tangents {
            output.tangents[..count]
                .iter_mut()
                .enumerate()
                .for_each(|(i, tan)| skin_tangent(i, tan));
        }
    }
}
