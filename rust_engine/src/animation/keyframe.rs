//! Animation keyframe

use bitflags::bitflags;
use glam::{Quat, Vec3};

bitflags! {
    /// Which parts of a node transform a track drives
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct TransformFlags: u8 {
        const ROTATE = 1 << 0;
        const TRANSLATE = 1 << 1;
        const SCALE = 1 << 2;
    }
}

impl Default for TransformFlags {
    fn default() -> Self {
        TransformFlags::all()
    }
}

/// Timestamped pose sample
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keyframe {
    pub time: f32,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Keyframe {
    pub fn new(time: f32) -> Self {
        Self {
            time,
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }

    /// Blend towards `other`; rotation takes the shortest arc
    pub fn interpolate(&self, other: &Keyframe, t: f32, time: f32) -> Keyframe {
        Keyframe {
            time,
            translation: self.translation.lerp(other.translation, t),
            rotation: self.rotation.slerp(other.rotation, t).normalize(),
            scale: self.scale.lerp(other.scale, t),
        }
    }
}

impl Default for Keyframe {
    fn default() -> Self {
        Self::new(0.0)
    }
}
