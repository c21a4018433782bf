//! Skeleton physics: bones driven by rigid bodies
//!
//! The host's physics world simulates the bodies. The entity only reads
//! their world matrices and cross-fades them against the animated pose.

use std::fmt;
use std::sync::{Arc, RwLock};

use glam::Mat4;

/// Anything with a world transform that can drive a bone
pub trait PhysicsBody: Send + Sync {
    fn world_matrix(&self) -> Mat4;
}

/// Body moved directly by the host
#[derive(Debug, Default)]
pub struct KinematicBody {
    matrix: RwLock<Mat4>,
}

impl KinematicBody {
    pub fn new(matrix: Mat4) -> Self {
        Self {
            matrix: RwLock::new(matrix),
        }
    }

    pub fn set_world_matrix(&self, matrix: Mat4) {
        match self.matrix.write() {
            Ok(mut guard) => *guard = matrix,
            Err(poisoned) => *poisoned.into_inner() = matrix,
        }
    }
}

impl PhysicsBody for KinematicBody {
    fn world_matrix(&self) -> Mat4 {
        match self.matrix.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Body attached to a bone, with the bone's pose relative to the body
pub(crate) struct BodyAttachment {
    pub body: Arc<dyn PhysicsBody>,
    /// inv(body world) * bone world, taken when attached
    pub offset: Mat4,
}

impl BodyAttachment {
    pub fn new(body: Arc<dyn PhysicsBody>, bone_world: Mat4) -> Self {
        let offset = body.world_matrix().inverse() * bone_world;
        Self { body, offset }
    }

    /// Where the body wants the bone to be
    pub fn bone_world(&self) -> Mat4 {
        self.body.world_matrix() * self.offset
    }
}

impl fmt::Debug for BodyAttachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyAttachment")
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}

/// Blend between animation (0) and physics (1)
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct SkeletonPhysics {
    pub active: bool,
    pub weight: f32,
    /// Weight change per second while fading
    pub fade_speed: f32,
}

impl SkeletonPhysics {
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
        self.weight = if active { 1.0 } else { 0.0 };
        self.fade_speed = 0.0;
    }

    /// Start fading towards physics or back to animation over `fade_time`
    pub fn fade(&mut self, to_physics: bool, fade_time: f32) {
        if fade_time <= 0.0 {
            self.set_active(to_physics);
            return;
        }
        self.active = true;
        let speed = 1.0 / fade_time;
        self.fade_speed = if to_physics { speed } else { -speed };
    }

    pub fn update(&mut self, dt: f32) {
        if self.fade_speed == 0.0 {
            return;
        }
        self.weight += self.fade_speed * dt;
        if self.weight >= 1.0 {
            self.weight = 1.0;
            self.fade_speed = 0.0;
        } else if self.weight <= 0.0 {
            self.weight = 0.0;
            self.fade_speed = 0.0;
            self.active = false;
        }
    }

    /// Physics contributes to the pose this tick
    pub fn is_driving(&self) -> bool {
        self.active && self.weight > 0.0
    }
}
