//! Mesh entities: per-instance animation state and skinned output

mod bone_state;
mod mesh_entity;
mod physics;
mod sub_mesh_entity;

pub use bone_state::BoneState;
pub use mesh_entity::{MeshEntity, TickOutcome};
pub use physics::{KinematicBody, PhysicsBody};
pub use sub_mesh_entity::SubMeshEntity;
