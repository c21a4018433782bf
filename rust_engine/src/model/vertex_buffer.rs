//! Vertex buffer

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};

/// Vertex streams of one sub-mesh
///
/// Tangents carry the bitangent handedness in `w`.
#[derive(Clone, Debug, Default)]
pub struct VertexBuffer {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tangents: Vec<Vec4>,
    pub uvs: Vec<Vec2>,
    pub indices: Vec<u32>,
    /// Positions with w = 1 followed by the same positions with w = 0
    pub(crate) shadow_double: Vec<Vec4>,
}

impl VertexBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer from loose streams; tangents are left for `SubMesh::compile`
    pub fn from_streams(
        positions: Vec<Vec3>,
        normals: Vec<Vec3>,
        uvs: Vec<Vec2>,
        indices: Vec<u32>,
    ) -> Self {
        Self {
            positions,
            normals,
            uvs,
            indices,
            ..Self::default()
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Transform all vertices
    ///
    /// Positions are transformed as points; normals and tangents by the
    /// inverse transpose of the upper 3x3 and renormalised.
    pub fn transform(&mut self, matrix: Mat4) {
        let normal_matrix = Mat3::from_mat4(matrix).inverse().transpose();

        for p in &mut self.positions {
            *p = matrix.transform_point3(*p);
        }
        for n in &mut self.normals {
            *n = (normal_matrix * *n).normalize_or_zero();
        }
        for t in &mut self.tangents {
            let dir = (Mat3::from_mat4(matrix) * t.truncate()).normalize_or_zero();
            *t = dir.extend(t.w);
        }

        if !self.shadow_double.is_empty() {
            self.update_shadow_double();
        }
    }

    /// Axis aligned bounds of the positions, `None` when empty
    pub fn bounding_box(&self) -> Option<(Vec3, Vec3)> {
        let first = *self.positions.first()?;
        Some(self.positions.iter().fold((first, first), |(min, max), &p| {
            (min.min(p), max.max(p))
        }))
    }

    /// Build the extruded copy used by stencil shadow volumes
    pub fn create_shadow_double(&mut self) {
        self.shadow_double = Vec::with_capacity(self.positions.len() * 2);
        self.update_shadow_double();
    }

    /// Refresh the shadow copy after the positions changed
    pub fn update_shadow_double(&mut self) {
        write_shadow_double(&self.positions, &mut self.shadow_double);
    }

    pub fn has_shadow_double(&self) -> bool {
        !self.shadow_double.is_empty()
    }

    pub fn shadow_double(&self) -> &[Vec4] {
        &self.shadow_double
    }
}

fn write_shadow_double(positions: &[Vec3], out: &mut Vec<Vec4>) {
    out.clear();
    out.extend(positions.iter().map(|p| p.extend(1.0)));
    out.extend(positions.iter().map(|p| p.extend(0.0)));
}
