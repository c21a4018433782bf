//! Animation playback state
//!
//! One cursor per animation of a mesh entity. Several states can be active at
//! once; the entity applies each of them with its current weight.

/// Playback cursor for one animation
#[derive(Clone, Debug)]
pub struct AnimationState {
    pub name: String,
    /// Index of the animation in the mesh
    animation_index: usize,
    length: f32,
    time_position: f32,
    /// Blend weight, 0.0 - 1.0
    weight: f32,
    speed: f32,
    looping: bool,
    active: bool,
    paused: bool,
    /// Weight change per second, negative while fading out
    fade_step: f32,
}

impl AnimationState {
    pub fn new(name: impl Into<String>, animation_index: usize, length: f32) -> Self {
        Self {
            name: name.into(),
            animation_index,
            length: length.max(0.0),
            time_position: 0.0,
            weight: 1.0,
            speed: 1.0,
            looping: false,
            active: false,
            paused: false,
            fade_step: 0.0,
        }
    }

    pub fn animation_index(&self) -> usize {
        self.animation_index
    }

    pub fn length(&self) -> f32 {
        self.length
    }

    // ========== Time ==========

    /// Advance the cursor by `dt` seconds scaled by the speed
    ///
    /// Looping states wrap around, others stop at the ends.
    pub fn add_time_position(&mut self, dt: f32) {
        if self.paused {
            return;
        }
        self.set_time_position(self.time_position + dt * self.speed);
    }

    pub fn set_time_position(&mut self, time: f32) {
        if self.looping && self.length > 0.0 {
            self.time_position = time.rem_euclid(self.length);
        } else {
            self.time_position = time.clamp(0.0, self.length);
        }
    }

    pub fn time_position(&self) -> f32 {
        self.time_position
    }

    /// Set the cursor as a fraction of the length
    pub fn set_relative_time_position(&mut self, fraction: f32) {
        self.set_time_position(fraction * self.length);
    }

    pub fn relative_time_position(&self) -> f32 {
        if self.length > 0.0 {
            self.time_position / self.length
        } else {
            0.0
        }
    }

    /// A one-shot animation that reached its end
    pub fn is_over(&self) -> bool {
        !self.looping && self.time_position >= self.length
    }

    // ========== Playback ==========

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
        if !active {
            self.fade_step = 0.0;
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_loop(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn is_loop(&self) -> bool {
        self.looping
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.speed = speed;
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn set_weight(&mut self, weight: f32) {
        self.weight = weight.clamp(0.0, 1.0);
    }

    pub fn weight(&self) -> f32 {
        self.weight
    }

    // ========== Fading ==========

    /// Ramp the weight up to 1 over `time` seconds
    pub fn fade_in(&mut self, time: f32) {
        self.fade_step = if time > 0.0 { 1.0 / time } else { f32::INFINITY };
    }

    /// Ramp the weight down to 0 over `time` seconds, then deactivate
    pub fn fade_out(&mut self, time: f32) {
        self.fade_step = if time > 0.0 { -1.0 / time } else { f32::NEG_INFINITY };
    }

    pub fn is_fading(&self) -> bool {
        self.fade_step != 0.0
    }

    pub fn update_fade(&mut self, dt: f32) {
        if self.fade_step == 0.0 {
            return;
        }

        self.weight += self.fade_step * dt;
        if self.fade_step.is_infinite() {
            self.weight = if self.fade_step > 0.0 { 1.0 } else { 0.0 };
        }

        if self.weight <= 0.0 {
            self.weight = 0.0;
            self.fade_step = 0.0;
            self.active = false;
        } else if self.weight >= 1.0 {
            self.weight = 1.0;
            self.fade_step = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_wraps() {
        let mut state = AnimationState::new("walk", 0, 2.0);
        state.set_loop(true);
        state.add_time_position(2.5);
        assert!((state.time_position() - 0.5).abs() < 1e-6);
        state.add_time_position(-1.0);
        assert!((state.time_position() - 1.5).abs() < 1e-6);
        assert!(!state.is_over());
    }

    #[test]
    fn test_one_shot_clamps() {
        let mut state = AnimationState::new("jump", 0, 1.0);
        state.add_time_position(3.0);
        assert_eq!(state.time_position(), 1.0);
        assert!(state.is_over());
        state.add_time_position(-5.0);
        assert_eq!(state.time_position(), 0.0);
    }

    #[test]
    fn test_speed_and_pause() {
        let mut state = AnimationState::new("run", 0, 10.0);
        state.set_speed(2.0);
        state.add_time_position(1.0);
        assert_eq!(state.time_position(), 2.0);
        state.set_paused(true);
        state.add_time_position(1.0);
        assert_eq!(state.time_position(), 2.0);
    }

    #[test]
    fn test_relative_time() {
        let mut state = AnimationState::new("run", 0, 4.0);
        state.set_relative_time_position(0.25);
        assert_eq!(state.time_position(), 1.0);
        assert_eq!(state.relative_time_position(), 0.25);
    }

    #[test]
    fn test_fade_out_deactivates() {
        let mut state = AnimationState::new("idle", 0, 1.0);
        state.set_active(true);
        state.fade_out(0.5);
        state.update_fade(0.25);
        assert!((state.weight() - 0.5).abs() < 1e-6);
        assert!(state.is_active());
        state.update_fade(0.5);
        assert_eq!(state.weight(), 0.0);
        assert!(!state.is_active());
        assert!(!state.is_fading());
    }

    #[test]
    fn test_fade_in_saturates() {
        let mut state = AnimationState::new("idle", 0, 1.0);
        state.set_weight(0.0);
        state.set_active(true);
        state.fade_in(1.0);
        state.update_fade(0.4);
        assert!((state.weight() - 0.4).abs() < 1e-6);
        state.update_fade(1.0);
        assert_eq!(state.weight(), 1.0);
        assert!(!state.is_fading());
    }

    #[test]
    fn test_zero_time_fade_is_instant() {
        let mut state = AnimationState::new("idle", 0, 1.0);
        state.set_active(true);
        state.fade_out(0.0);
        state.update_fade(0.016);
        assert!(!state.is_active());
    }
}
