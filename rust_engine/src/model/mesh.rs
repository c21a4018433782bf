//! Mesh: shared, immutable model data

use std::collections::HashMap;

use super::SubMesh;
use crate::animation::Animation;
use crate::skeleton::Skeleton;
use crate::{EngineError, Result};

/// Mesh resource
///
/// Owns an optional skeleton, the animations that drive it and the
/// sub-meshes. Entities share it through an `Arc` and never mutate it.
///
/// Animated meshes without a skin keep their scene nodes in `node_tree`, a
/// hierarchy shaped like a skeleton. Tracks then target nodes instead of
/// bones and each sub-mesh rides on its node.
#[derive(Clone, Debug, Default)]
pub struct Mesh {
    pub name: String,
    skeleton: Option<Skeleton>,
    node_tree: Skeleton,

    animations: Vec<Animation>,
    animation_index: HashMap<String, usize>,

    sub_meshes: Vec<SubMesh>,
    sub_mesh_index: HashMap<String, usize>,
}

impl Mesh {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    // ========== Skeleton ==========

    pub fn set_skeleton(&mut self, mut skeleton: Skeleton) {
        skeleton.refresh_world_transforms();
        self.skeleton = Some(skeleton);
        for i in 0..self.animations.len() {
            self.bind_tracks(i, true);
        }
    }

    pub fn skeleton(&self) -> Option<&Skeleton> {
        self.skeleton.as_ref()
    }

    /// Change the skeleton after it was set
    ///
    /// Afterwards the world transforms (and so the inverse binds) are fresh,
    /// skin weights follow bones that moved or vanished in the arena, and
    /// every track is bound again by name. `None` without a skeleton.
    pub fn edit_skeleton<R>(&mut self, edit: impl FnOnce(&mut Skeleton) -> R) -> Option<R> {
        let skeleton = self.skeleton.as_mut()?;
        let names: Vec<String> = skeleton.bones().iter().map(|b| b.name.clone()).collect();

        let result = edit(&mut *skeleton);
        skeleton.refresh_world_transforms();

        let remap: Vec<Option<usize>> =
            names.iter().map(|n| skeleton.bone_index_by_name(n)).collect();
        if remap.iter().enumerate().any(|(old, new)| *new != Some(old)) {
            for sub in &mut self.sub_meshes {
                sub.remap_bones(&remap);
            }
        }
        for i in 0..self.animations.len() {
            self.bind_tracks(i, false);
        }
        Some(result)
    }

    pub fn is_skinned(&self) -> bool {
        self.skeleton.as_ref().is_some_and(|s| !s.is_empty())
    }

    // ========== Node tree ==========

    /// Scene nodes of an unskinned animated mesh
    pub fn set_node_tree(&mut self, mut nodes: Skeleton) {
        nodes.refresh_world_transforms();
        self.node_tree = nodes;
        for i in 0..self.animations.len() {
            self.bind_tracks(i, true);
        }
    }

    pub fn node_tree(&self) -> &Skeleton {
        &self.node_tree
    }

    // ========== Sub meshes ==========

    pub fn create_sub_mesh(&mut self, name: impl Into<String>) -> Result<&mut SubMesh> {
        let name = name.into();
        if self.sub_mesh_index.contains_key(&name) {
            return Err(EngineError::Mesh(format!(
                "mesh '{}' already has a sub mesh '{}'",
                self.name, name
            )));
        }
        let index = self.sub_meshes.len();
        self.sub_mesh_index.insert(name.clone(), index);
        self.sub_meshes.push(SubMesh::new(name));
        Ok(&mut self.sub_meshes[index])
    }

    pub fn has_sub_mesh(&self, name: &str) -> bool {
        self.sub_mesh_index.contains_key(name)
    }

    pub fn sub_mesh(&self, index: usize) -> Option<&SubMesh> {
        self.sub_meshes.get(index)
    }

    pub fn sub_mesh_mut(&mut self, index: usize) -> Option<&mut SubMesh> {
        self.sub_meshes.get_mut(index)
    }

    pub fn sub_mesh_by_name(&self, name: &str) -> Option<&SubMesh> {
        self.sub_mesh_index.get(name).map(|&i| &self.sub_meshes[i])
    }

    pub fn sub_mesh_count(&self) -> usize {
        self.sub_meshes.len()
    }

    pub fn sub_meshes(&self) -> &[SubMesh] {
        &self.sub_meshes
    }

    // ========== Animations ==========

    /// Add an animation; its tracks are bound to bones by name
    pub fn add_animation(&mut self, animation: Animation) -> Result<usize> {
        if self.animation_index.contains_key(&animation.name) {
            return Err(EngineError::Mesh(format!(
                "mesh '{}' already has an animation '{}'",
                self.name, animation.name
            )));
        }
        let index = self.animations.len();
        self.animation_index.insert(animation.name.clone(), index);
        self.animations.push(animation);
        self.bind_tracks(index, true);
        Ok(index)
    }

    pub fn animation(&self, index: usize) -> Option<&Animation> {
        self.animations.get(index)
    }

    pub fn animation_by_name(&self, name: &str) -> Option<&Animation> {
        self.animation_index_by_name(name).map(|i| &self.animations[i])
    }

    pub fn animation_index_by_name(&self, name: &str) -> Option<usize> {
        self.animation_index.get(name).copied()
    }

    pub fn animation_count(&self) -> usize {
        self.animations.len()
    }

    pub fn animations(&self) -> &[Animation] {
        &self.animations
    }

    /// Resolve the tracks of an animation against the skeleton, or the node
    /// tree when there is none
    ///
    /// With `keep_bound` a track that already points at a valid index keeps it.
    fn bind_tracks(&mut self, index: usize, keep_bound: bool) {
        let targets = match &self.skeleton {
            Some(skeleton) => skeleton,
            None if !self.node_tree.is_empty() => &self.node_tree,
            None => return,
        };
        let animation = &mut self.animations[index];
        let name = animation.name.clone();
        for track in animation.tracks_mut() {
            let bound = track
                .node_index
                .filter(|&i| keep_bound && i < targets.bone_count());
            track.node_index = bound.or_else(|| targets.bone_index_by_name(&track.name));
            if track.node_index.is_none() {
                log::warn!("Animation '{}': no bone or node named '{}' for track", name, track.name);
            }
        }
    }
}
