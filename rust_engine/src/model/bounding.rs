//! Bounding volume

use glam::{Mat4, Vec3};

/// Local axis aligned box with a world transform
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingVolume {
    pub local_min: Vec3,
    pub local_max: Vec3,
    transform: Mat4,
}

impl Default for BoundingVolume {
    fn default() -> Self {
        Self {
            local_min: Vec3::ZERO,
            local_max: Vec3::ZERO,
            transform: Mat4::IDENTITY,
        }
    }
}

impl BoundingVolume {
    pub fn new(local_min: Vec3, local_max: Vec3) -> Self {
        Self {
            local_min,
            local_max,
            transform: Mat4::IDENTITY,
        }
    }

    /// Tight box around `points`; an empty slice gives a zero box
    pub fn from_points(points: &[Vec3]) -> Self {
        let Some(&first) = points.first() else {
            return Self::default();
        };
        let (min, max) = points
            .iter()
            .fold((first, first), |(min, max), &p| (min.min(p), max.max(p)));
        Self::new(min, max)
    }

    pub fn set_transform(&mut self, transform: Mat4) {
        self.transform = transform;
    }

    pub fn transform(&self) -> Mat4 {
        self.transform
    }

    /// Grow to include another local box
    pub fn add_box(&mut self, min: Vec3, max: Vec3) {
        self.local_min = self.local_min.min(min);
        self.local_max = self.local_max.max(max);
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.local_min, self.local_max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }

    /// World aligned box around the 8 corners moved by `matrix`
    pub fn transformed(&self, matrix: Mat4) -> (Vec3, Vec3) {
        let corners = self.corners().map(|c| matrix.transform_point3(c));
        corners[1..]
            .iter()
            .fold((corners[0], corners[0]), |(min, max), &p| (min.min(p), max.max(p)))
    }

    pub fn world_min_max(&self) -> (Vec3, Vec3) {
        self.transformed(self.transform)
    }

    pub fn local_center(&self) -> Vec3 {
        (self.local_min + self.local_max) * 0.5
    }

    pub fn center(&self) -> Vec3 {
        let (min, max) = self.world_min_max();
        (min + max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        let (min, max) = self.world_min_max();
        max - min
    }

    /// Radius of the sphere around the world box
    pub fn radius(&self) -> f32 {
        self.size().length() * 0.5
    }
}
