//! Engine configuration
//!
//! Every setting lives in one flat struct that is handed to the loader and to
//! each entity when it is created. Nothing reads configuration from a global.

/// Material quality tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum MaterialQuality {
    Low,
    #[default]
    Medium,
    High,
}

impl MaterialQuality {
    /// Normal-mapped materials need skinned tangents
    pub fn uses_tangents(self) -> bool {
        self >= MaterialQuality::Medium
    }
}

/// Engine configuration (flat, no nesting)
#[derive(Debug, Clone)]
pub struct EngineConfig {
    // ========== Rendering ==========
    /// Material quality, default Medium
    pub material_quality: MaterialQuality,
    /// Build edge lists and shadow doubles for stencil shadows, default true
    pub shadow_volumes: bool,

    // ========== Update throttling ==========
    /// Throttle entities that were not rendered, default true
    pub offscreen_throttle: bool,
    /// Unrendered ticks that still update normally, default 30; the entity
    /// sleeps from the next unrendered tick on
    pub offscreen_sleep_frames: u32,
    /// While asleep, one update every this many ticks, default 20
    pub offscreen_batch_ticks: u32,

    // ========== Skeleton physics ==========
    /// Seconds to cross-fade between animation and physics, default 0.5
    pub skeleton_physics_fade_time: f32,

    // ========== Skinning ==========
    /// Skin vertices with rayon, default true
    pub parallel_skinning: bool,
    /// Influences at or below this weight are ignored, default 1e-4
    pub weight_epsilon: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            material_quality: MaterialQuality::Medium,
            shadow_volumes: true,

            offscreen_throttle: true,
            offscreen_sleep_frames: 30,
            offscreen_batch_ticks: 20,

            skeleton_physics_fade_time: 0.5,

            parallel_skinning: true,
            weight_epsilon: 1.0e-4,
        }
    }
}

impl EngineConfig {
    /// Configuration with throttling off, handy for tools and tests
    pub fn always_update() -> Self {
        Self {
            offscreen_throttle: false,
            ..Self::default()
        }
    }

    /// Whether sub-meshes should carry skinned tangents
    pub fn skin_tangents(&self) -> bool {
        self.material_quality.uses_tangents()
    }
}
