//! Skinmesh Engine - skeletal animation and skinning runtime
//!
//! Provides:
//! - Collada (.dae) mesh, skeleton and animation loading
//! - Bone hierarchies with bind-pose rebasing
//! - Keyframed animation tracks, playback states and blending
//! - CPU vertex skinning (optionally parallel)
//! - Mesh entities with off-screen throttling and skeleton physics

pub mod animation;
pub mod config;
pub mod entity;
pub mod model;
pub mod skeleton;
pub mod skinning;

pub use animation::{Animation, AnimationState, AnimationTrack, Keyframe, TransformFlags};
pub use config::{EngineConfig, MaterialQuality};
pub use entity::{BoneState, KinematicBody, MeshEntity, PhysicsBody, SubMeshEntity, TickOutcome};
pub use model::{ColladaLoader, Mesh, MeshLoader, SubMesh, VertexBuffer};
pub use skeleton::{Bone, Skeleton};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(#[from] xml::reader::Error),

    #[error("Collada error: {0}")]
    Collada(String),

    #[error("Skeleton error: {0}")]
    Skeleton(String),

    #[error("Animation error: {0}")]
    Animation(String),

    #[error("Mesh error: {0}")]
    Mesh(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
