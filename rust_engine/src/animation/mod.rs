//! Keyframe animation
//!
//! Tracks of sorted keyframes grouped into named animations, plus the
//! per-entity playback cursors that drive them.

mod clip;
mod keyframe;
mod state;
mod track;

pub use clip::Animation;
pub use keyframe::{Keyframe, TransformFlags};
pub use state::AnimationState;
pub use track::AnimationTrack;
