//! Per-instance bone transform node

use glam::{Mat4, Quat, Vec3};

use super::physics::BodyAttachment;

/// Mutable transform of one bone in one entity
///
/// Animation tracks add into the translation, rotation and scale
/// accumulators; `update_local_matrix` then composes them on top of the
/// bind local transform.
#[derive(Debug)]
pub struct BoneState {
    base_local: Mat4,

    translation: Vec3,
    rotation: Quat,
    scale: Vec3,

    local: Mat4,
    world: Mat4,

    pub(crate) body: Option<BodyAttachment>,
}

impl BoneState {
    pub fn new(base_local: Mat4) -> Self {
        Self {
            base_local,
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            local: base_local,
            world: Mat4::IDENTITY,
            body: None,
        }
    }

    /// Clear the accumulators back to the bind pose
    pub fn reset(&mut self) {
        self.translation = Vec3::ZERO;
        self.rotation = Quat::IDENTITY;
        self.scale = Vec3::ONE;
        self.local = self.base_local;
    }

    pub fn add_translation(&mut self, translation: Vec3) {
        self.translation += translation;
    }

    pub fn add_rotation(&mut self, rotation: Quat) {
        self.rotation = (self.rotation * rotation).normalize();
    }

    pub fn add_scale(&mut self, scale: Vec3) {
        self.scale *= scale;
    }

    pub fn translation(&self) -> Vec3 {
        self.translation
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    /// local = bind local * T * R * S
    pub fn update_local_matrix(&mut self) {
        self.local = self.base_local
            * Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation);
    }

    pub fn base_local(&self) -> Mat4 {
        self.base_local
    }

    pub fn local_matrix(&self) -> Mat4 {
        self.local
    }

    pub fn set_local_matrix(&mut self, local: Mat4) {
        self.local = local;
    }

    /// World matrix from the last update
    pub fn world_matrix(&self) -> Mat4 {
        self.world
    }

    pub(crate) fn set_world_matrix(&mut self, world: Mat4) {
        self.world = world;
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_on_bind_local() {
        let base = Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0));
        let mut state = BoneState::new(base);
        state.add_translation(Vec3::X);
        state.add_rotation(Quat::from_rotation_z(std::f32::consts::FRAC_PI_2));
        state.update_local_matrix();

        // Rotation applies before the translation offset, both inside the bind local
        let p = state.local_matrix().transform_point3(Vec3::X);
        assert!(p.abs_diff_eq(Vec3::new(1.0, 2.0, 0.0), 1e-5));
    }

    #[test]
    fn test_reset_restores_bind() {
        let base = Mat4::from_translation(Vec3::splat(2.0));
        let mut state = BoneState::new(base);
        state.add_scale(Vec3::splat(3.0));
        state.add_scale(Vec3::splat(2.0));
        assert_eq!(state.scale(), Vec3::splat(6.0));
        state.update_local_matrix();
        state.reset();
        assert_eq!(state.local_matrix(), base);
        assert_eq!(state.scale(), Vec3::ONE);
        assert!(!state.has_body());
    }
}
