//! Named animation: a set of tracks and a length

use std::collections::HashMap;

use super::{AnimationTrack, TransformFlags};
use crate::{EngineError, Result};

#[derive(Clone, Debug, Default)]
pub struct Animation {
    pub name: String,
    length: f32,
    tracks: Vec<AnimationTrack>,
    track_index: HashMap<String, usize>,
}

impl Animation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn length(&self) -> f32 {
        self.length
    }

    pub fn set_length(&mut self, length: f32) {
        self.length = length.max(0.0);
    }

    /// Add an empty track; track names are unique within an animation
    pub fn create_track(
        &mut self,
        name: impl Into<String>,
        flags: TransformFlags,
    ) -> Result<&mut AnimationTrack> {
        let name = name.into();
        if self.track_index.contains_key(&name) {
            return Err(EngineError::Animation(format!(
                "animation '{}' already has a track '{}'",
                self.name, name
            )));
        }
        let index = self.tracks.len();
        self.track_index.insert(name.clone(), index);
        self.tracks.push(AnimationTrack::new(name, flags));
        Ok(&mut self.tracks[index])
    }

    pub fn track_by_name(&self, name: &str) -> Option<&AnimationTrack> {
        self.track_index.get(name).map(|&i| &self.tracks[i])
    }

    pub fn track_by_name_mut(&mut self, name: &str) -> Option<&mut AnimationTrack> {
        let index = *self.track_index.get(name)?;
        self.tracks.get_mut(index)
    }

    pub fn track_by_index(&self, index: usize) -> Option<&AnimationTrack> {
        self.tracks.get(index)
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn tracks(&self) -> &[AnimationTrack] {
        &self.tracks
    }

    pub fn tracks_mut(&mut self) -> &mut [AnimationTrack] {
        &mut self.tracks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_find_tracks() {
        let mut anim = Animation::new("walk");
        anim.create_track("hip", TransformFlags::all()).unwrap();
        anim.create_track("knee", TransformFlags::ROTATE).unwrap();

        assert_eq!(anim.track_count(), 2);
        assert_eq!(anim.track_by_name("knee").unwrap().flags, TransformFlags::ROTATE);
        assert_eq!(anim.track_by_index(0).unwrap().name, "hip");
        assert!(anim.track_by_name("elbow").is_none());
    }

    #[test]
    fn test_duplicate_track_rejected() {
        let mut anim = Animation::new("walk");
        anim.create_track("hip", TransformFlags::all()).unwrap();
        assert!(anim.create_track("hip", TransformFlags::all()).is_err());
    }

    #[test]
    fn test_negative_length_clamped() {
        let mut anim = Animation::new("idle");
        anim.set_length(-1.0);
        assert_eq!(anim.length(), 0.0);
        anim.set_length(2.5);
        assert_eq!(anim.length(), 2.5);
    }
}
