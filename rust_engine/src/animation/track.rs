//! Per-bone animation track

use glam::{Quat, Vec3};

use super::{Keyframe, TransformFlags};
use crate::entity::BoneState;

/// Sorted keyframes for one node
#[derive(Clone, Debug, Default)]
pub struct AnimationTrack {
    pub name: String,
    /// Bone this track drives, resolved by name when unset
    pub node_index: Option<usize>,
    pub flags: TransformFlags,
    keyframes: Vec<Keyframe>,
}

impl AnimationTrack {
    pub fn new(name: impl Into<String>, flags: TransformFlags) -> Self {
        Self {
            name: name.into(),
            node_index: None,
            flags,
            keyframes: Vec::new(),
        }
    }

    /// Get or insert the keyframe at `time`
    ///
    /// Appending in time order is the common case. Out of order times are
    /// inserted at their sorted position, and an existing keyframe with the
    /// same time is returned as is.
    pub fn create_keyframe(&mut self, time: f32) -> &mut Keyframe {
        let index = match self.keyframes.last() {
            None => {
                self.keyframes.push(Keyframe::new(time));
                0
            }
            Some(last) if time > last.time => {
                self.keyframes.push(Keyframe::new(time));
                self.keyframes.len() - 1
            }
            Some(_) => match self
                .keyframes
                .binary_search_by(|k| k.time.total_cmp(&time))
            {
                Ok(found) => found,
                Err(insert_at) => {
                    self.keyframes.insert(insert_at, Keyframe::new(time));
                    insert_at
                }
            },
        };
        &mut self.keyframes[index]
    }

    pub fn keyframes(&self) -> &[Keyframe] {
        &self.keyframes
    }

    pub fn keyframe_count(&self) -> usize {
        self.keyframes.len()
    }

    pub fn keyframe(&self, index: usize) -> Option<&Keyframe> {
        self.keyframes.get(index)
    }

    pub fn clear_keyframes(&mut self) {
        self.keyframes.clear();
    }

    /// Time of the last keyframe
    pub fn max_time(&self) -> f32 {
        self.keyframes.last().map(|k| k.time).unwrap_or(0.0)
    }

    /// Keyframes bracketing `time` and the weight of the second one
    ///
    /// The weight is 0 exactly on a keyframe. Before the first keyframe the
    /// first one is returned with weight 0, after the last one the last one is
    /// returned with weight 1.
    pub fn keyframes_at_time(&self, time: f32) -> Option<(&Keyframe, &Keyframe, f32)> {
        let first = self.keyframes.first()?;
        let last = self.keyframes.last()?;

        if time.is_nan() || time <= first.time {
            return Some((first, first, 0.0));
        }
        if time > last.time {
            return Some((last, last, 1.0));
        }
        if time == last.time {
            return Some((last, last, 0.0));
        }

        // first.time < time < last.time, so both neighbours exist
        let next = self.keyframes.partition_point(|k| k.time <= time);
        let a = &self.keyframes[next - 1];
        let b = &self.keyframes[next];
        let span = b.time - a.time;
        let weight = if span > 0.0 { (time - a.time) / span } else { 0.0 };
        Some((a, b, weight.clamp(0.0, 1.0)))
    }

    /// Pose at `time`
    pub fn interpolated_keyframe(&self, time: f32) -> Keyframe {
        match self.keyframes_at_time(time) {
            Some((a, b, weight)) => a.interpolate(b, weight, time),
            None => Keyframe::new(time),
        }
    }

    /// Blend the pose at `time` into a bone state, scaled by `weight`
    ///
    /// Only the channels named in `flags` are touched.
    pub fn apply_to_node(&self, node: &mut BoneState, time: f32, weight: f32) {
        if self.keyframes.is_empty() || weight <= 0.0 {
            return;
        }
        let key = self.interpolated_keyframe(time);

        if self.flags.contains(TransformFlags::TRANSLATE) {
            node.add_translation(key.translation * weight);
        }
        if self.flags.contains(TransformFlags::ROTATE) {
            node.add_rotation(Quat::IDENTITY.slerp(key.rotation, weight));
        }
        if self.flags.contains(TransformFlags::SCALE) {
            node.add_scale(Vec3::ONE.lerp(key.scale, weight));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Mat4;

    fn track_with_times(times: &[f32]) -> AnimationTrack {
        let mut track = AnimationTrack::new("bone", TransformFlags::all());
        for &t in times {
            track.create_keyframe(t).translation = Vec3::new(t, 0.0, 0.0);
        }
        track
    }

    #[test]
    fn test_create_keyframe_keeps_order() {
        let track = track_with_times(&[0.0, 2.0, 1.0, 3.0, 0.5]);
        let times: Vec<f32> = track.keyframes().iter().map(|k| k.time).collect();
        assert_eq!(times, vec![0.0, 0.5, 1.0, 2.0, 3.0]);
        assert_eq!(track.max_time(), 3.0);
    }

    #[test]
    fn test_create_keyframe_same_time_reuses() {
        let mut track = track_with_times(&[0.0, 1.0]);
        track.create_keyframe(1.0).scale = Vec3::splat(2.0);
        assert_eq!(track.keyframe_count(), 2);
        assert_eq!(track.keyframe(1).unwrap().scale, Vec3::splat(2.0));
    }

    #[test]
    fn test_nan_time_gives_first_key() {
        let track = track_with_times(&[0.0, 1.0, 2.0]);
        let (a, b, w) = track.keyframes_at_time(f32::NAN).unwrap();
        assert_eq!((a.time, b.time, w), (0.0, 0.0, 0.0));
        assert_eq!(track.interpolated_keyframe(f32::NAN).translation, Vec3::ZERO);
    }

    #[test]
    fn test_weight_zero_on_keyframe() {
        let track = track_with_times(&[0.0, 1.0, 2.5]);
        for key in track.keyframes() {
            let (a, _, w) = track.keyframes_at_time(key.time).unwrap();
            assert_eq!(a.time, key.time);
            assert_eq!(w, 0.0);
        }
    }

    #[test]
    fn test_weight_monotone_between_keys() {
        let track = track_with_times(&[0.0, 1.0, 3.0]);
        let mut previous = -1.0;
        let mut t = 1.0;
        while t < 3.0 {
            let (a, b, w) = track.keyframes_at_time(t).unwrap();
            assert_eq!((a.time, b.time), (1.0, 3.0));
            assert!(w >= previous);
            previous = w;
            t += 0.1;
        }
    }

    #[test]
    fn test_boundaries_do_not_extrapolate() {
        let track = track_with_times(&[1.0, 2.0]);
        let (a, b, w) = track.keyframes_at_time(-5.0).unwrap();
        assert_eq!((a.time, b.time, w), (1.0, 1.0, 0.0));
        let (a, b, w) = track.keyframes_at_time(9.0).unwrap();
        assert_eq!((a.time, b.time, w), (2.0, 2.0, 1.0));
        assert!(AnimationTrack::default().keyframes_at_time(0.0).is_none());
    }

    #[test]
    fn test_interpolated_translation() {
        let track = track_with_times(&[0.0, 2.0]);
        let key = track.interpolated_keyframe(0.5);
        assert!(key.translation.abs_diff_eq(Vec3::new(0.5, 0.0, 0.0), 1e-6));
    }

    #[test]
    fn test_translate_only_track_keeps_rotation_and_scale() {
        let mut track = AnimationTrack::new("bone", TransformFlags::TRANSLATE);
        {
            let key = track.create_keyframe(0.0);
            key.translation = Vec3::new(1.0, 2.0, 3.0);
            key.rotation = Quat::from_rotation_x(1.0);
            key.scale = Vec3::splat(4.0);
        }

        let mut node = BoneState::new(Mat4::IDENTITY);
        track.apply_to_node(&mut node, 0.0, 1.0);
        node.update_local_matrix();

        let (scale, rotation, translation) = node.local_matrix().to_scale_rotation_translation();
        assert!(translation.abs_diff_eq(Vec3::new(1.0, 2.0, 3.0), 1e-5));
        assert!(rotation.abs_diff_eq(Quat::IDENTITY, 1e-5));
        assert!(scale.abs_diff_eq(Vec3::ONE, 1e-5));
    }

    #[test]
    fn test_apply_is_weighted() {
        let mut track = AnimationTrack::new("bone", TransformFlags::TRANSLATE);
        track.create_keyframe(0.0).translation = Vec3::new(2.0, 0.0, 0.0);

        let mut node = BoneState::new(Mat4::IDENTITY);
        track.apply_to_node(&mut node, 0.0, 0.25);
        track.apply_to_node(&mut node, 0.0, 0.25);
        assert!(node.translation().abs_diff_eq(Vec3::new(1.0, 0.0, 0.0), 1e-6));
    }
}
