//! Mesh resources and loaders

mod bounding;
pub mod collada;
pub mod geometry;
mod mesh;
mod submesh;
mod vertex_buffer;

pub use bounding::BoundingVolume;
pub use collada::ColladaLoader;
pub use geometry::{Edge, TriangleData};
pub use mesh::Mesh;
pub use submesh::{SubMesh, VertexBonePair, MAX_INFLUENCES};
pub use vertex_buffer::VertexBuffer;

use std::path::Path;

use crate::animation::Animation;
use crate::Result;

/// File format loader
pub trait MeshLoader {
    fn load_mesh(&self, path: &Path) -> Result<Mesh>;

    fn load_animation(&self, path: &Path) -> Result<Animation>;

    /// `file_type` is an extension, with or without the dot
    fn is_supported(&self, file_type: &str) -> bool;

    fn supported_types(&self) -> &'static [&'static str];
}
