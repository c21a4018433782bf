//! Per-instance sub-mesh output

use glam::Mat4;

use crate::model::{geometry, SubMesh, TriangleData, VertexBuffer};
use crate::skinning::{compute_skinning, SkinningContext, SkinningInput, SkinningOutput};

/// Skinned copy of one sub-mesh
#[derive(Clone, Debug)]
pub struct SubMeshEntity {
    pub name: String,
    sub_mesh_index: usize,
    vertex_buffer: VertexBuffer,
    triangles: Vec<TriangleData>,
    visible: bool,
}

impl SubMeshEntity {
    pub fn new(sub_mesh_index: usize, sub_mesh: &SubMesh) -> Self {
        Self {
            name: sub_mesh.name.clone(),
            sub_mesh_index,
            vertex_buffer: sub_mesh.vertex_buffer.clone(),
            triangles: sub_mesh.triangles.clone(),
            visible: true,
        }
    }

    pub fn sub_mesh_index(&self) -> usize {
        self.sub_mesh_index
    }

    /// Current (skinned) vertices, in entity space
    pub fn vertex_buffer(&self) -> &VertexBuffer {
        &self.vertex_buffer
    }

    pub fn triangles(&self) -> &[TriangleData] {
        &self.triangles
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Re-skin from the bind pose of `sub_mesh`
    ///
    /// Triangle normals and the shadow double are refreshed when
    /// `shadows` is set. Sub-meshes without skin data are left as is.
    pub fn update_skin(
        &mut self,
        sub_mesh: &SubMesh,
        bone_matrices: &[Mat4],
        ctx: &SkinningContext,
        shadows: bool,
    ) {
        if !sub_mesh.is_skinned() {
            return;
        }
        let src = &sub_mesh.vertex_buffer;
        let input = SkinningInput {
            positions: &src.positions,
            normals: &src.normals,
            tangents: &src.tangents,
            bone_indices: sub_mesh.bone_indices(),
            bone_weights: sub_mesh.bone_weights(),
            unconnected: sub_mesh.unconnected(),
            bone_matrices,
        };
        let dst = &mut self.vertex_buffer;
        let mut output = SkinningOutput {
            positions: &mut dst.positions,
            normals: &mut dst.normals,
            tangents: &mut dst.tangents,
        };
        compute_skinning(ctx, &input, &mut output);

        if shadows {
            geometry::update_triangle_normals(&mut self.triangles, &dst.positions, &dst.indices);
            if dst.has_shadow_double() {
                dst.update_shadow_double();
            }
        }
    }

    /// Place an unskinned sub-mesh: its bind vertices moved by `matrix`
    pub fn update_transform(&mut self, sub_mesh: &SubMesh, matrix: Mat4, shadows: bool) {
        let src = &sub_mesh.vertex_buffer;
        let dst = &mut self.vertex_buffer;
        dst.positions.clone_from(&src.positions);
        dst.normals.clone_from(&src.normals);
        dst.tangents.clone_from(&src.tangents);
        dst.transform(matrix);

        if shadows {
            geometry::update_triangle_normals(&mut self.triangles, &dst.positions, &dst.indices);
        }
    }
}
