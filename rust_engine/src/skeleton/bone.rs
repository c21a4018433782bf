//! Bone node

use glam::Mat4;

/// Bone node
///
/// Lives in the arena of its [`Skeleton`](super::Skeleton). Parent and
/// children are arena indices; a bone without a parent hangs off the implicit
/// identity root.
#[derive(Clone, Debug)]
pub struct Bone {
    pub name: String,
    pub(crate) parent: Option<usize>,
    pub(crate) children: Vec<usize>,

    // Transform relative to the parent
    pub(crate) local_transform: Mat4,
    // Cached results, valid while `dirty` is false
    pub(crate) world_transform: Mat4,
    pub(crate) inv_world_transform: Mat4,
    pub(crate) dirty: bool,

    // Referenced by a skin controller
    pub(crate) attached: bool,
}

impl Bone {
    pub fn new(name: impl Into<String>, parent: Option<usize>, local_transform: Mat4) -> Self {
        Self {
            name: name.into(),
            parent,
            children: Vec::new(),
            local_transform,
            world_transform: Mat4::IDENTITY,
            inv_world_transform: Mat4::IDENTITY,
            dirty: true,
            attached: false,
        }
    }

    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    pub fn children(&self) -> &[usize] {
        &self.children
    }

    pub fn local_transform(&self) -> Mat4 {
        self.local_transform
    }

    /// Cached world transform
    ///
    /// Only meaningful when [`is_stale`](Self::is_stale) is false; use
    /// `Skeleton::world_transform` to resolve a stale bone.
    pub fn world_transform(&self) -> Mat4 {
        self.world_transform
    }

    /// Cached inverse world transform, i.e. the inverse bind matrix
    pub fn inv_world_transform(&self) -> Mat4 {
        self.inv_world_transform
    }

    pub fn is_stale(&self) -> bool {
        self.dirty
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

impl Default for Bone {
    fn default() -> Self {
        Self::new(String::new(), None, Mat4::IDENTITY)
    }
}
