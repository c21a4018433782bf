//! Sub-mesh: one vertex buffer plus its skin weights

use glam::{Mat4, Vec3};

use super::geometry::{self, Edge, TriangleData};
use super::VertexBuffer;
use crate::config::EngineConfig;

/// Maximum bone influences per vertex
pub const MAX_INFLUENCES: usize = 4;

/// Raw skin weight as it comes out of a loader
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VertexBonePair {
    pub vertex: u32,
    pub bone: u32,
    pub weight: f32,
}

impl VertexBonePair {
    pub fn new(vertex: u32, bone: u32, weight: f32) -> Self {
        Self { vertex, bone, weight }
    }
}

#[derive(Clone, Debug)]
pub struct SubMesh {
    pub name: String,
    pub material_name: String,
    /// Scene node the geometry was instanced from
    pub node_name: String,
    /// Node of the mesh's node tree carrying this sub-mesh
    pub node_index: Option<usize>,
    pub local_transform: Mat4,
    pub model_scale: Vec3,
    pub double_sided: bool,

    pub vertex_buffer: VertexBuffer,
    pub triangles: Vec<TriangleData>,
    pub edges: Vec<Edge>,

    pairs: Vec<VertexBonePair>,
    // Compiled skin, one entry per vertex
    bone_indices: Vec<[u16; MAX_INFLUENCES]>,
    bone_weights: Vec<[f32; MAX_INFLUENCES]>,
    unconnected: Vec<bool>,
}

impl SubMesh {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            material_name: String::new(),
            node_name: String::new(),
            node_index: None,
            local_transform: Mat4::IDENTITY,
            model_scale: Vec3::ONE,
            double_sided: false,
            vertex_buffer: VertexBuffer::new(),
            triangles: Vec::new(),
            edges: Vec::new(),
            pairs: Vec::new(),
            bone_indices: Vec::new(),
            bone_weights: Vec::new(),
            unconnected: Vec::new(),
        }
    }

    pub fn set_vertex_buffer(&mut self, vertex_buffer: VertexBuffer) {
        self.vertex_buffer = vertex_buffer;
    }

    // ========== Skin weights ==========

    pub fn add_vertex_bone_pair(&mut self, pair: VertexBonePair) {
        self.pairs.push(pair);
    }

    pub fn vertex_bone_pairs(&self) -> &[VertexBonePair] {
        &self.pairs
    }

    /// Pack the raw pairs into fixed per-vertex arrays
    ///
    /// Per vertex the first four pairs with a weight above `weight_epsilon`
    /// are kept and normalised to sum to 1. Vertices without any weight are
    /// flagged unconnected and skip skinning.
    pub fn compile_bone_pairs(&mut self, weight_epsilon: f32) {
        let count = self.vertex_buffer.vertex_count();
        self.bone_indices = vec![[0; MAX_INFLUENCES]; count];
        self.bone_weights = vec![[0.0; MAX_INFLUENCES]; count];
        self.unconnected = vec![false; count];

        let mut used = vec![0usize; count];
        let mut dropped = vec![0usize; count];

        for pair in &self.pairs {
            let v = pair.vertex as usize;
            if v >= count {
                log::warn!(
                    "Sub mesh '{}': pair for vertex {} out of range ({} vertices)",
                    self.name,
                    v,
                    count
                );
                continue;
            }
            if pair.weight <= weight_epsilon {
                continue;
            }
            let Ok(bone) = u16::try_from(pair.bone) else {
                log::warn!("Sub mesh '{}': bone index {} too large", self.name, pair.bone);
                continue;
            };

            let slot = used[v];
            if slot >= MAX_INFLUENCES {
                dropped[v] += 1;
                continue;
            }
            self.bone_indices[v][slot] = bone;
            self.bone_weights[v][slot] = pair.weight;
            used[v] += 1;
        }

        for v in 0..count {
            if dropped[v] > 0 {
                log::warn!(
                    "Sub mesh '{}': vertex {} has more than {} bones, dropped {}",
                    self.name,
                    v,
                    MAX_INFLUENCES,
                    dropped[v]
                );
            }

            let total: f32 = self.bone_weights[v].iter().sum();
            if total <= 0.0 {
                log::warn!("Sub mesh '{}': vertex {} is not connected to a bone", self.name, v);
                self.unconnected[v] = true;
                continue;
            }
            for w in &mut self.bone_weights[v] {
                *w /= total;
            }
        }
    }

    /// Follow bones that moved or were removed from the skeleton
    ///
    /// `remap[old]` is the new index of a bone, `None` once it is gone.
    /// Influences of removed bones are dropped and the rest renormalised.
    pub fn remap_bones(&mut self, remap: &[Option<usize>]) {
        let lookup = |bone: usize| remap.get(bone).copied().flatten();

        self.pairs.retain_mut(|pair| match lookup(pair.bone as usize) {
            Some(bone) => {
                pair.bone = bone as u32;
                true
            }
            None => false,
        });

        for v in 0..self.bone_weights.len() {
            if self.unconnected[v] {
                continue;
            }
            let mut total = 0.0;
            for slot in 0..MAX_INFLUENCES {
                if self.bone_weights[v][slot] <= 0.0 {
                    continue;
                }
                let bone = lookup(self.bone_indices[v][slot] as usize)
                    .and_then(|b| u16::try_from(b).ok());
                match bone {
                    Some(bone) => {
                        self.bone_indices[v][slot] = bone;
                        total += self.bone_weights[v][slot];
                    }
                    None => {
                        self.bone_indices[v][slot] = 0;
                        self.bone_weights[v][slot] = 0.0;
                    }
                }
            }

            if total <= 0.0 {
                log::warn!("Sub mesh '{}': vertex {} lost all its bones", self.name, v);
                self.unconnected[v] = true;
                continue;
            }
            for w in &mut self.bone_weights[v] {
                *w /= total;
            }
        }
    }

    pub fn bone_indices(&self) -> &[[u16; MAX_INFLUENCES]] {
        &self.bone_indices
    }

    pub fn bone_weights(&self) -> &[[f32; MAX_INFLUENCES]] {
        &self.bone_weights
    }

    pub fn unconnected(&self) -> &[bool] {
        &self.unconnected
    }

    /// Compiled skin data is present
    pub fn is_skinned(&self) -> bool {
        !self.bone_weights.is_empty()
    }

    // ========== Compile ==========

    /// Derive the render-side data from the vertex buffer
    pub fn compile(&mut self, config: &EngineConfig) {
        let vb = &mut self.vertex_buffer;

        self.triangles = geometry::create_triangle_data(&vb.positions, &vb.indices);

        if config.shadow_volumes {
            let (edges, open) = geometry::create_edges(&vb.positions, &vb.indices);
            self.edges = edges;
            self.double_sided |= open;
            vb.create_shadow_double();
        }

        if config.skin_tangents() && vb.tangents.len() != vb.positions.len() {
            vb.tangents =
                geometry::create_vertex_tangents(&vb.positions, &vb.normals, &vb.uvs, &vb.indices);
        }
    }
}
