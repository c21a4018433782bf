//! Skeleton: bone arena, name index and lazy world transforms

use glam::Mat4;
use std::collections::HashMap;

use super::Bone;
use crate::{EngineError, Result};

/// Skeleton
///
/// Bones are stored in a flat arena. A parent is always inserted before its
/// children, so arena order is a valid top-down traversal order.
#[derive(Clone, Debug, Default)]
pub struct Skeleton {
    bones: Vec<Bone>,
    name_to_index: HashMap<String, usize>,
}

impl Skeleton {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a bone under `parent` (`None` for a root bone)
    pub fn add_bone(
        &mut self,
        name: impl Into<String>,
        parent: Option<usize>,
        local_transform: Mat4,
    ) -> Result<usize> {
        let name = name.into();
        if self.name_to_index.contains_key(&name) {
            return Err(EngineError::Skeleton(format!("bone '{}' already exists", name)));
        }
        if let Some(parent_idx) = parent {
            if parent_idx >= self.bones.len() {
                return Err(EngineError::Skeleton(format!(
                    "parent index {} out of range for bone '{}'",
                    parent_idx, name
                )));
            }
        }

        let index = self.bones.len();
        self.name_to_index.insert(name.clone(), index);
        self.bones.push(Bone::new(name, parent, local_transform));
        if let Some(parent_idx) = parent {
            self.bones[parent_idx].children.push(index);
        }
        Ok(index)
    }

    /// Remove a bone together with its whole subtree
    ///
    /// Remaining bones are compacted, so indices above the removed ones shift.
    pub fn remove_bone(&mut self, index: usize) -> Result<()> {
        if index >= self.bones.len() {
            return Err(EngineError::Skeleton(format!("bone index {} out of range", index)));
        }

        // 1. Mark the subtree (children always have larger indices)
        let mut removed = vec![false; self.bones.len()];
        removed[index] = true;
        for i in index + 1..self.bones.len() {
            if let Some(p) = self.bones[i].parent {
                if removed[p] {
                    removed[i] = true;
                }
            }
        }

        // 2. Old index -> new index
        let mut remap = vec![None; self.bones.len()];
        let mut next = 0;
        for (i, gone) in removed.iter().enumerate() {
            if !gone {
                remap[i] = Some(next);
                next += 1;
            }
        }

        // 3. Rebuild the arena with remapped links
        let old = std::mem::take(&mut self.bones);
        self.bones = old
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !removed[*i])
            .map(|(_, mut bone)| {
                bone.parent = bone.parent.and_then(|p| remap[p]);
                bone.children = bone.children.iter().filter_map(|&c| remap[c]).collect();
                bone
            })
            .collect();

        self.name_to_index = self
            .bones
            .iter()
            .enumerate()
            .map(|(i, b)| (b.name.clone(), i))
            .collect();
        Ok(())
    }

    /// Number of bones
    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    pub fn bone_by_index(&self, index: usize) -> Option<&Bone> {
        self.bones.get(index)
    }

    pub fn bone_by_name(&self, name: &str) -> Option<&Bone> {
        self.bone_index_by_name(name).map(|i| &self.bones[i])
    }

    pub fn bone_index_by_name(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    /// Root bones (children of the implicit identity root)
    pub fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        self.bones
            .iter()
            .enumerate()
            .filter(|(_, b)| b.parent.is_none())
            .map(|(i, _)| i)
    }

    /// Parent-before-child traversal order
    ///
    /// `add_bone` only accepts existing parents and `remove_bone` compacts
    /// without reordering, so arena order already satisfies this.
    pub fn update_order(&self) -> std::ops::Range<usize> {
        0..self.bones.len()
    }

    /// Set a bone's parent-relative transform and invalidate its subtree
    pub fn set_local_transform(&mut self, index: usize, transform: Mat4) -> Result<()> {
        let bone = self
            .bones
            .get_mut(index)
            .ok_or_else(|| EngineError::Skeleton(format!("bone index {} out of range", index)))?;
        bone.local_transform = transform;
        self.mark_dirty(index);
        Ok(())
    }

    /// Mark a bone and every descendant stale
    fn mark_dirty(&mut self, index: usize) {
        let mut stack = vec![index];
        while let Some(i) = stack.pop() {
            // A stale bone already has a stale subtree
            if self.bones[i].dirty && i != index {
                continue;
            }
            self.bones[i].dirty = true;
            stack.extend_from_slice(&self.bones[i].children);
        }
    }

    /// World transform of a bone, recomputed only if stale
    pub fn world_transform(&mut self, index: usize) -> Option<Mat4> {
        if index >= self.bones.len() {
            return None;
        }
        Some(self.resolve(index))
    }

    /// Inverse world transform of a bone, recomputed only if stale
    pub fn inv_world_transform(&mut self, index: usize) -> Option<Mat4> {
        if index >= self.bones.len() {
            return None;
        }
        self.resolve(index);
        Some(self.bones[index].inv_world_transform)
    }

    /// Walk up the stale part of the parent chain
    fn resolve(&mut self, index: usize) -> Mat4 {
        if !self.bones[index].dirty {
            return self.bones[index].world_transform;
        }
        let parent_world = match self.bones[index].parent {
            Some(p) => self.resolve(p),
            None => Mat4::IDENTITY,
        };
        let bone = &mut self.bones[index];
        bone.world_transform = parent_world * bone.local_transform;
        bone.inv_world_transform = bone.world_transform.inverse();
        bone.dirty = false;
        bone.world_transform
    }

    /// Resolve every stale bone top-down
    pub fn refresh_world_transforms(&mut self) {
        for i in 0..self.bones.len() {
            if !self.bones[i].dirty {
                continue;
            }
            // Parents come first in the arena, so they are already fresh
            let parent_world = self.bones[i]
                .parent
                .map(|p| self.bones[p].world_transform)
                .unwrap_or(Mat4::IDENTITY);
            let bone = &mut self.bones[i];
            bone.world_transform = parent_world * bone.local_transform;
            bone.inv_world_transform = bone.world_transform.inverse();
            bone.dirty = false;
        }
    }

    /// Rebuild local transforms from global bind matrices
    ///
    /// `globals` holds the bind-pose world matrix of every bone used by a skin
    /// controller; those bones are flagged attached. Locals become
    /// `inv(parent_global) * global`, walking down from the roots. A bone that
    /// is not attached stops the walk for its subtree.
    pub fn rebase_bind_pose(&mut self, globals: &HashMap<usize, Mat4>) {
        for (&index, &global) in globals {
            if let Some(bone) = self.bones.get_mut(index) {
                bone.attached = true;
                bone.local_transform = global;
            }
        }

        let roots: Vec<usize> = self.roots().collect();
        let mut stack: Vec<(usize, Mat4)> = roots.into_iter().map(|r| (r, Mat4::IDENTITY)).collect();
        while let Some((index, parent_global)) = stack.pop() {
            if !self.bones[index].attached {
                log::warn!("Bone '{}' is not attached to skin", self.bones[index].name);
                continue;
            }
            let global = self.bones[index].local_transform;
            self.bones[index].local_transform = parent_global.inverse() * global;
            for &child in &self.bones[index].children {
                stack.push((child, global));
            }
        }

        for bone in &mut self.bones {
            bone.dirty = true;
        }
        self.refresh_world_transforms();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};

    fn chain() -> Skeleton {
        let mut skeleton = Skeleton::new();
        let root = skeleton
            .add_bone("root", None, Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0)))
            .unwrap();
        let mid = skeleton
            .add_bone(
                "mid",
                Some(root),
                Mat4::from_rotation_translation(Quat::from_rotation_z(0.5), Vec3::X),
            )
            .unwrap();
        skeleton
            .add_bone("tip", Some(mid), Mat4::from_translation(Vec3::new(0.0, 2.0, 0.0)))
            .unwrap();
        skeleton
    }

    #[test]
    fn test_world_is_parent_times_local() {
        let mut skeleton = chain();
        skeleton.refresh_world_transforms();
        for i in 0..skeleton.bone_count() {
            let bone = skeleton.bone_by_index(i).unwrap().clone();
            let parent_world = bone
                .parent()
                .map(|p| skeleton.bone_by_index(p).unwrap().world_transform())
                .unwrap_or(Mat4::IDENTITY);
            let expected = parent_world * bone.local_transform();
            assert!(bone.world_transform().abs_diff_eq(expected, 1e-5));
        }
    }

    #[test]
    fn test_lookup_by_name() {
        let skeleton = chain();
        assert_eq!(skeleton.bone_index_by_name("mid"), Some(1));
        assert_eq!(skeleton.bone_by_name("tip").unwrap().parent(), Some(1));
        assert!(skeleton.bone_by_name("missing").is_none());
        assert_eq!(skeleton.bone_by_index(0).unwrap().children(), &[1]);
    }

    #[test]
    fn test_duplicate_and_bad_parent_rejected() {
        let mut skeleton = chain();
        assert!(skeleton.add_bone("mid", None, Mat4::IDENTITY).is_err());
        assert!(skeleton.add_bone("x", Some(42), Mat4::IDENTITY).is_err());
    }

    #[test]
    fn test_lazy_recompute_after_local_change() {
        let mut skeleton = chain();
        let before = skeleton.world_transform(2).unwrap();
        assert!(!skeleton.bone_by_index(2).unwrap().is_stale());

        skeleton
            .set_local_transform(0, Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0)))
            .unwrap();
        assert!(skeleton.bone_by_index(1).unwrap().is_stale());
        assert!(skeleton.bone_by_index(2).unwrap().is_stale());

        let after = skeleton.world_transform(2).unwrap();
        let delta = after.w_axis.truncate() - before.w_axis.truncate();
        assert!(delta.abs_diff_eq(Vec3::new(5.0, -1.0, 0.0), 1e-5));
        assert!(!skeleton.bone_by_index(1).unwrap().is_stale());
    }

    #[test]
    fn test_inverse_world() {
        let mut skeleton = chain();
        let world = skeleton.world_transform(2).unwrap();
        let inv = skeleton.inv_world_transform(2).unwrap();
        assert!((world * inv).abs_diff_eq(Mat4::IDENTITY, 1e-5));
    }

    #[test]
    fn test_remove_bone_compacts_subtree() {
        let mut skeleton = chain();
        let side = skeleton.add_bone("side", Some(0), Mat4::IDENTITY).unwrap();
        assert_eq!(side, 3);

        skeleton.remove_bone(1).unwrap();
        assert_eq!(skeleton.bone_count(), 2);
        assert!(skeleton.bone_index_by_name("mid").is_none());
        assert!(skeleton.bone_index_by_name("tip").is_none());
        assert_eq!(skeleton.bone_index_by_name("side"), Some(1));
        assert_eq!(skeleton.bone_by_index(0).unwrap().children(), &[1]);
        assert_eq!(skeleton.bone_by_index(1).unwrap().parent(), Some(0));
        assert!(skeleton.remove_bone(7).is_err());
    }

    #[test]
    fn test_rebase_bind_pose() {
        let mut skeleton = Skeleton::new();
        let a = skeleton.add_bone("a", None, Mat4::IDENTITY).unwrap();
        let b = skeleton.add_bone("b", Some(a), Mat4::IDENTITY).unwrap();

        let global_a = Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0));
        let global_b = Mat4::from_translation(Vec3::new(0.0, 3.0, 0.0));
        let globals: HashMap<usize, Mat4> = [(a, global_a), (b, global_b)].into_iter().collect();
        skeleton.rebase_bind_pose(&globals);

        let local_b = skeleton.bone_by_index(b).unwrap().local_transform();
        assert!(local_b.abs_diff_eq(Mat4::from_translation(Vec3::new(0.0, 2.0, 0.0)), 1e-5));
        assert!(skeleton.bone_by_index(b).unwrap().world_transform().abs_diff_eq(global_b, 1e-5));
        assert!(skeleton.bone_by_index(a).unwrap().is_attached());
    }

    #[test]
    fn test_rebase_skips_unattached_subtree() {
        let mut skeleton = Skeleton::new();
        let a = skeleton.add_bone("a", None, Mat4::IDENTITY).unwrap();
        let local_b = Mat4::from_translation(Vec3::Z);
        let b = skeleton.add_bone("b", Some(a), local_b).unwrap();

        let globals: HashMap<usize, Mat4> = [(b, Mat4::from_translation(Vec3::X))].into_iter().collect();
        skeleton.rebase_bind_pose(&globals);

        // "a" is not attached, so "b" keeps its global as local
        assert!(skeleton
            .bone_by_index(b)
            .unwrap()
            .local_transform()
            .abs_diff_eq(Mat4::from_translation(Vec3::X), 1e-5));
    }
}
