//! Mesh entity: one animated, skinned instance of a shared mesh

use std::sync::Arc;

use glam::Mat4;

use super::physics::{BodyAttachment, PhysicsBody, SkeletonPhysics};
use super::{BoneState, SubMeshEntity};
use crate::animation::AnimationState;
use crate::config::EngineConfig;
use crate::model::{BoundingVolume, Mesh};
use crate::skeleton::matrix_slerp;
use crate::skinning::{skinning_matrix, SkinningContext};
use crate::{EngineError, Result};

/// What an entity did during one tick
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Off screen and throttled; elapsed time was banked
    Sleeping,
    /// Nothing to animate
    Static,
    /// Animation states were applied and the mesh re-skinned
    Animated,
    /// Skeleton physics drove at least part of the pose
    Physics,
}

/// Off-screen update throttling
///
/// Ticks 1 to `offscreen_sleep_frames` without a render still update; from
/// the next one on the entity sleeps and batches its time.
#[derive(Clone, Copy, Debug, Default)]
struct Throttle {
    rendered: bool,
    unrendered_ticks: u32,
    sleep_ticks: u32,
    banked_time: f32,
    sleeping: bool,
}

pub struct MeshEntity {
    pub name: String,
    mesh: Arc<Mesh>,
    config: EngineConfig,
    skinning: SkinningContext,
    world_matrix: Mat4,

    bone_states: Vec<BoneState>,
    node_states: Vec<BoneState>,
    animation_states: Vec<AnimationState>,
    sub_entities: Vec<SubMeshEntity>,
    skinning_matrices: Vec<Mat4>,

    bounding_volume: BoundingVolume,
    physics: SkeletonPhysics,
    throttle: Throttle,
    /// The last update moved something off the bind pose
    posed: bool,
}

impl MeshEntity {
    pub fn new(name: impl Into<String>, mesh: Arc<Mesh>, config: &EngineConfig) -> Self {
        let name = name.into();

        // 1. One bone state per bone, starting at the bind pose
        let bone_states: Vec<BoneState> = mesh
            .skeleton()
            .map(|s| s.bones().iter().map(|b| BoneState::new(b.local_transform())).collect())
            .unwrap_or_default();

        // 2. Node states for unskinned animated meshes
        let node_states: Vec<BoneState> = mesh
            .node_tree()
            .bones()
            .iter()
            .map(|n| BoneState::new(n.local_transform()))
            .collect();

        // 3. One playback cursor per animation
        let animation_states: Vec<AnimationState> = mesh
            .animations()
            .iter()
            .enumerate()
            .map(|(i, a)| AnimationState::new(a.name.clone(), i, a.length()))
            .collect();

        // 4. One output buffer per sub mesh
        let sub_entities: Vec<SubMeshEntity> = mesh
            .sub_meshes()
            .iter()
            .enumerate()
            .map(|(i, s)| SubMeshEntity::new(i, s))
            .collect();

        let bone_count = mesh.skeleton().map(|s| s.bone_count()).unwrap_or(0);
        let mut entity = Self {
            name,
            skinning: SkinningContext::from_config(config),
            config: config.clone(),
            world_matrix: Mat4::IDENTITY,
            bone_states,
            node_states,
            animation_states,
            sub_entities,
            skinning_matrices: vec![Mat4::IDENTITY; bone_count],
            bounding_volume: BoundingVolume::default(),
            physics: SkeletonPhysics::default(),
            throttle: Throttle::default(),
            posed: false,
            mesh,
        };
        entity.update_bone_worlds();
        entity.update_node_worlds();
        entity.place_node_sub_meshes();
        entity.update_bounding_volume();

        log::info!(
            "Created mesh entity '{}' from '{}' ({} bones, {} animations)",
            entity.name,
            entity.mesh.name,
            entity.bone_states.len(),
            entity.animation_states.len()
        );
        entity
    }

    pub fn mesh(&self) -> &Arc<Mesh> {
        &self.mesh
    }

    // ========== Transform ==========

    /// Move the entity; bone world matrices follow on the next update
    pub fn set_world_matrix(&mut self, matrix: Mat4) {
        self.world_matrix = matrix;
        self.bounding_volume.set_transform(matrix);
    }

    pub fn world_matrix(&self) -> Mat4 {
        self.world_matrix
    }

    pub fn bounding_volume(&self) -> &BoundingVolume {
        &self.bounding_volume
    }

    // ========== Animation ==========

    /// Start an animation from the beginning at full weight
    pub fn play(&mut self, index: usize, looping: bool, stop_previous: bool) -> Result<()> {
        if index >= self.animation_states.len() {
            return Err(EngineError::Animation(format!(
                "entity '{}' has no animation {}",
                self.name, index
            )));
        }
        if stop_previous {
            self.stop();
        }
        let state = &mut self.animation_states[index];
        state.set_active(true);
        state.set_time_position(0.0);
        state.set_loop(looping);
        state.set_weight(1.0);
        Ok(())
    }

    pub fn play_name(&mut self, name: &str, looping: bool, stop_previous: bool) -> Result<()> {
        let index = self.mesh.animation_index_by_name(name).ok_or_else(|| {
            EngineError::Animation(format!("entity '{}' has no animation '{}'", self.name, name))
        })?;
        self.play(index, looping, stop_previous)
    }

    /// Deactivate every animation state and rewind it
    pub fn stop(&mut self) {
        for state in &mut self.animation_states {
            state.set_active(false);
            state.set_time_position(0.0);
        }
    }

    pub fn animation_state_count(&self) -> usize {
        self.animation_states.len()
    }

    pub fn animation_state(&self, index: usize) -> Option<&AnimationState> {
        self.animation_states.get(index)
    }

    pub fn animation_state_mut(&mut self, index: usize) -> Option<&mut AnimationState> {
        self.animation_states.get_mut(index)
    }

    pub fn animation_state_by_name(&self, name: &str) -> Option<&AnimationState> {
        let index = self.mesh.animation_index_by_name(name)?;
        self.animation_states.get(index)
    }

    pub fn animation_state_by_name_mut(&mut self, name: &str) -> Option<&mut AnimationState> {
        let index = self.mesh.animation_index_by_name(name)?;
        self.animation_states.get_mut(index)
    }

    // ========== Bones ==========

    pub fn bone_state_count(&self) -> usize {
        self.bone_states.len()
    }

    pub fn bone_state(&self, index: usize) -> Option<&BoneState> {
        self.bone_states.get(index)
    }

    pub fn bone_state_by_name(&self, name: &str) -> Option<&BoneState> {
        let index = self.mesh.skeleton()?.bone_index_by_name(name)?;
        self.bone_states.get(index)
    }

    pub fn node_state_count(&self) -> usize {
        self.node_states.len()
    }

    pub fn node_state(&self, index: usize) -> Option<&BoneState> {
        self.node_states.get(index)
    }

    pub fn node_state_by_name(&self, name: &str) -> Option<&BoneState> {
        let index = self.mesh.node_tree().bone_index_by_name(name)?;
        self.node_states.get(index)
    }

    /// Bone matrices used by the last skin update
    pub fn skinning_matrices(&self) -> &[Mat4] {
        &self.skinning_matrices
    }

    // ========== Sub meshes ==========

    pub fn sub_mesh_entity_count(&self) -> usize {
        self.sub_entities.len()
    }

    pub fn sub_mesh_entity(&self, index: usize) -> Option<&SubMeshEntity> {
        self.sub_entities.get(index)
    }

    pub fn sub_mesh_entity_mut(&mut self, index: usize) -> Option<&mut SubMeshEntity> {
        self.sub_entities.get_mut(index)
    }

    pub fn sub_mesh_entity_by_name(&self, name: &str) -> Option<&SubMeshEntity> {
        self.sub_entities.iter().find(|s| s.name == name)
    }

    pub fn sub_mesh_entities(&self) -> &[SubMeshEntity] {
        &self.sub_entities
    }

    // ========== Skeleton physics ==========

    /// Let a body drive a bone
    ///
    /// The bone keeps its current offset from the body, so attach while the
    /// body sits where the bone is.
    pub fn attach_body(&mut self, bone: usize, body: Arc<dyn PhysicsBody>) -> Result<()> {
        let state = self.bone_states.get_mut(bone).ok_or_else(|| {
            EngineError::Skeleton(format!("entity '{}' has no bone {}", self.name, bone))
        })?;
        state.body = Some(BodyAttachment::new(body, state.world_matrix()));
        Ok(())
    }

    pub fn detach_body(&mut self, bone: usize) {
        if let Some(state) = self.bone_states.get_mut(bone) {
            state.body = None;
        }
    }

    /// Switch physics on or off without fading
    pub fn set_skeleton_physics_active(&mut self, active: bool) {
        self.physics.set_active(active);
    }

    pub fn is_skeleton_physics_active(&self) -> bool {
        self.physics.active
    }

    /// Cross-fade towards physics (or back) over the configured fade time
    pub fn fade_skeleton_physics(&mut self, to_physics: bool) {
        self.physics.fade(to_physics, self.config.skeleton_physics_fade_time);
    }

    /// 0 = animated pose, 1 = physics pose
    pub fn skeleton_physics_weight(&self) -> f32 {
        self.physics.weight
    }

    // ========== Update ==========

    /// Tell the entity it was drawn this frame
    pub fn set_rendered(&mut self, rendered: bool) {
        self.throttle.rendered = rendered;
    }

    pub fn is_sleeping(&self) -> bool {
        self.throttle.sleeping
    }

    /// Advance the entity by `dt` seconds
    pub fn update_logic(&mut self, dt: f32) -> TickOutcome {
        let Some(dt) = self.throttled_time_step(dt) else {
            return TickOutcome::Sleeping;
        };

        // 1. Advance playback cursors and fades
        for state in &mut self.animation_states {
            if state.is_active() {
                state.add_time_position(dt);
                state.update_fade(dt);
            }
        }
        self.physics.update(dt);

        let animating = self.animation_states.iter().any(AnimationState::is_active);
        let physics = self.physics.is_driving();
        if !animating && !physics {
            if self.posed {
                // The last influence ended this tick: settle on the bind pose
                self.posed = false;
                self.evaluate_animations();
                self.update_pose();
            }
            return TickOutcome::Static;
        }
        self.posed = true;

        // 2. Pose: bind, then every active animation on top
        self.evaluate_animations();

        // 3. World matrices, physics override, skin
        self.update_pose();

        if physics {
            TickOutcome::Physics
        } else {
            TickOutcome::Animated
        }
    }

    /// Time step to use this tick, `None` while asleep
    fn throttled_time_step(&mut self, dt: f32) -> Option<f32> {
        if !self.config.offscreen_throttle {
            return Some(dt);
        }
        let t = &mut self.throttle;

        if t.rendered {
            t.unrendered_ticks = 0;
        } else {
            t.unrendered_ticks = t.unrendered_ticks.saturating_add(1);
        }
        t.rendered = false;

        let should_sleep = t.unrendered_ticks > self.config.offscreen_sleep_frames;
        if should_sleep != t.sleeping {
            log::debug!(
                "Entity '{}' {} off-screen sleep",
                self.name,
                if should_sleep { "entering" } else { "leaving" }
            );
            t.sleeping = should_sleep;
            t.sleep_ticks = 0;
        }

        if !t.sleeping {
            let step = dt + t.banked_time;
            t.banked_time = 0.0;
            return Some(step);
        }

        t.banked_time += dt;
        t.sleep_ticks += 1;
        if t.sleep_ticks < self.config.offscreen_batch_ticks.max(1) {
            return None;
        }
        t.sleep_ticks = 0;
        let step = t.banked_time;
        t.banked_time = 0.0;
        Some(step)
    }

    /// Tracks drive bones, or scene nodes when the mesh has no skeleton
    fn evaluate_animations(&mut self) {
        let targets = if self.mesh.skeleton().is_some() {
            &mut self.bone_states
        } else {
            &mut self.node_states
        };
        for target in targets.iter_mut() {
            target.reset();
        }

        for state in self.animation_states.iter().filter(|s| s.is_active()) {
            let Some(animation) = self.mesh.animation(state.animation_index()) else {
                continue;
            };
            for track in animation.tracks() {
                let Some(target) = track.node_index.and_then(|i| targets.get_mut(i)) else {
                    continue;
                };
                track.apply_to_node(target, state.time_position(), state.weight());
            }
        }

        for target in targets.iter_mut() {
            target.update_local_matrix();
        }
    }

    fn update_pose(&mut self) {
        self.update_bone_worlds();
        self.update_node_worlds();
        self.update_skin();
        self.update_bounding_volume();
    }

    /// Parent-first pass producing world and skinning matrices
    fn update_bone_worlds(&mut self) {
        let Some(skeleton) = self.mesh.skeleton() else {
            return;
        };
        let inv_entity = self.world_matrix.inverse();
        let physics_weight = if self.physics.is_driving() { self.physics.weight } else { 0.0 };

        for index in skeleton.update_order() {
            let Some(bone) = skeleton.bone_by_index(index) else {
                continue;
            };
            let parent_world = match bone.parent() {
                Some(p) => self.bone_states[p].world_matrix(),
                None => self.world_matrix,
            };

            let state = &mut self.bone_states[index];
            if physics_weight > 0.0 {
                if let Some(attachment) = &state.body {
                    let physics_local = parent_world.inverse() * attachment.bone_world();
                    let local = if physics_weight >= 1.0 {
                        physics_local
                    } else {
                        matrix_slerp(state.local_matrix(), physics_local, physics_weight)
                    };
                    state.set_local_matrix(local);
                }
            }

            let world = parent_world * state.local_matrix();
            state.set_world_matrix(world);
            self.skinning_matrices[index] =
                skinning_matrix(inv_entity, world, bone.inv_world_transform());
        }
    }

    /// Parent-first pass over the node tree
    fn update_node_worlds(&mut self) {
        let nodes = self.mesh.node_tree();
        for index in nodes.update_order() {
            let Some(node) = nodes.bone_by_index(index) else {
                continue;
            };
            let parent_world = match node.parent() {
                Some(p) => self.node_states[p].world_matrix(),
                None => self.world_matrix,
            };
            let state = &mut self.node_states[index];
            let world = parent_world * state.local_matrix();
            state.set_world_matrix(world);
        }
    }

    fn update_skin(&mut self) {
        let shadows = self.config.shadow_volumes;
        for sub_entity in &mut self.sub_entities {
            let Some(sub_mesh) = self.mesh.sub_mesh(sub_entity.sub_mesh_index()) else {
                continue;
            };
            sub_entity.update_skin(sub_mesh, &self.skinning_matrices, &self.skinning, shadows);
        }
        self.place_node_sub_meshes();
    }

    /// Move unskinned sub-meshes to their node, in entity space
    fn place_node_sub_meshes(&mut self) {
        if self.node_states.is_empty() {
            return;
        }
        let inv_entity = self.world_matrix.inverse();
        let shadows = self.config.shadow_volumes;
        for sub_entity in &mut self.sub_entities {
            let Some(sub_mesh) = self.mesh.sub_mesh(sub_entity.sub_mesh_index()) else {
                continue;
            };
            if sub_mesh.is_skinned() {
                continue;
            }
            let Some(node) = sub_mesh.node_index.and_then(|i| self.node_states.get(i)) else {
                continue;
            };
            sub_entity.update_transform(sub_mesh, inv_entity * node.world_matrix(), shadows);
        }
    }

    fn update_bounding_volume(&mut self) {
        let mut boxes = self
            .sub_entities
            .iter()
            .filter_map(|s| s.vertex_buffer().bounding_box());
        let mut volume = match boxes.next() {
            Some((min, max)) => BoundingVolume::new(min, max),
            None => BoundingVolume::default(),
        };
        for (min, max) in boxes {
            volume.add_box(min, max);
        }
        volume.set_transform(self.world_matrix);
        self.bounding_volume = volume;
    }
}
