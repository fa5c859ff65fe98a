//! Identifier newtypes.
//!
//! Dense indices are only valid within one frame; anything that survives a
//! frame boundary is keyed by one of these instead.

use std::fmt;

/// Stable identity of a renderable object for its whole lifetime in the scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(pub u32);

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Groups objects of the same kind so the registry can keep them contiguous.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TypeTag(pub u32);

/// Scene-wide index of one static mesh element, used to address per-mesh
/// bitsets. Recycled after the owning object is removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub u32);

impl MeshId {
    /// Bit position in a per-mesh bitset.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}
