//! Collada (.dae) mesh and animation loader
//!
//! Reads the subset of COLLADA 1.4 that skinned game meshes use:
//! triangle geometry, skin controllers, the JOINT node tree and
//! sampled node animations.

mod build;
mod document;
mod xml_tree;

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use super::{Mesh, MeshLoader};
use crate::animation::Animation;
use crate::config::EngineConfig;
use crate::{EngineError, Result};

use document::Document;
use xml_tree::Element;

const SUPPORTED_TYPES: &[&str] = &["dae"];

/// Collada loader
#[derive(Debug, Clone, Default)]
pub struct ColladaLoader {
    config: EngineConfig,
}

impl ColladaLoader {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn read_document<R: Read>(source: R) -> Result<Document> {
        let root = Element::parse(source)?;
        Document::parse(&root)
    }

    fn open(path: &Path) -> Result<Document> {
        let file = File::open(path)?;
        Self::read_document(BufReader::new(file))
    }

    /// Load a mesh from Collada text
    pub fn load_mesh_from_str(&self, name: &str, text: &str) -> Result<Mesh> {
        let doc = Self::read_document(text.as_bytes())?;
        build::build_mesh(&doc, name, &self.config)
    }

    /// Load the animation of a Collada text, named `name`
    pub fn load_animation_from_str(&self, name: &str, text: &str) -> Result<Animation> {
        let doc = Self::read_document(text.as_bytes())?;
        Self::animation_from(&doc, name)
    }

    fn animation_from(doc: &Document, name: &str) -> Result<Animation> {
        if doc.channels.is_empty() {
            return Err(EngineError::Collada(format!("'{}' contains no animation", name)));
        }
        // The skeleton is only needed to make the keys bone relative
        let skeleton = build::build_skeleton(doc);
        build::build_animation(doc, skeleton.as_ref(), name, false)
    }
}

impl MeshLoader for ColladaLoader {
    /// The mesh is named after the file
    fn load_mesh(&self, path: &Path) -> Result<Mesh> {
        let doc = Self::open(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        build::build_mesh(&doc, &name, &self.config)
    }

    /// The animation is named after the file stem
    fn load_animation(&self, path: &Path) -> Result<Animation> {
        let doc = Self::open(path)?;
        let name = path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| build::DEFAULT_ANIMATION.to_owned());
        Self::animation_from(&doc, &name)
    }

    fn is_supported(&self, file_type: &str) -> bool {
        SUPPORTED_TYPES
            .iter()
            .any(|t| t.eq_ignore_ascii_case(file_type.trim_start_matches('.')))
    }

    fn supported_types(&self) -> &'static [&'static str] {
        SUPPORTED_TYPES
    }
}
