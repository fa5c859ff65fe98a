//! The capability interface renderable objects expose to the visibility
//! pipeline.

use std::any::Any;

use sightline_math::BoxSphereBounds;

use crate::flags::RelevanceFlags;
use crate::view::SceneView;

/// Opaque per-view data a proxy may attach to itself during relevance.
pub type CustomViewData = Box<dyn Any + Send + Sync>;

/// What a visible object contributes to a view.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ViewRelevance {
    pub flags: RelevanceFlags,
    /// Tie-breaker for translucent sorting; higher draws later.
    pub translucency_sort_priority: i16,
}

impl ViewRelevance {
    pub fn new(flags: RelevanceFlags) -> Self {
        Self {
            flags,
            translucency_sort_priority: 0,
        }
    }

    /// Drawn in the main pass from static mesh data and casting shadows.
    pub fn opaque_static() -> Self {
        Self::new(
            RelevanceFlags::DRAW
                | RelevanceFlags::STATIC
                | RelevanceFlags::SHADOW
                | RelevanceFlags::RENDER_IN_MAIN_PASS,
        )
    }

    #[inline]
    pub fn has(&self, flag: RelevanceFlags) -> bool {
        self.flags.contains(flag)
    }
}

/// One static mesh element of an object, at one level of detail.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StaticMeshLod {
    /// LOD index; 0 is the most detailed.
    pub lod_index: i8,
    /// Screen-relative size (1.0 = full viewport) at which this LOD starts
    /// being used.
    pub screen_size: f32,
    /// Blend to neighbouring LODs with a dither pattern instead of popping.
    pub dithered_lod_transition: bool,
    pub casts_shadow: bool,
    /// Drawn with its material in the main pass.
    pub use_for_material: bool,
    /// Rendered into the depth prepass as an occluder.
    pub use_as_occluder: bool,
}

impl StaticMeshLod {
    /// A shadow-casting, material-drawn element.
    pub fn new(lod_index: i8, screen_size: f32) -> Self {
        Self {
            lod_index,
            screen_size,
            dithered_lod_transition: false,
            casts_shadow: true,
            use_for_material: true,
            use_as_occluder: false,
        }
    }

    #[must_use]
    pub fn dithered(mut self) -> Self {
        self.dithered_lod_transition = true;
        self
    }

    #[must_use]
    pub fn occluder(mut self) -> Self {
        self.use_as_occluder = true;
        self
    }
}

/// A renderable object as seen by the visibility pipeline.
///
/// Implementations are shared between the scene and worker threads, so any
/// state mutated through `&self` (occlusion feedback) needs interior
/// mutability.
pub trait PrimitiveProxy: Send + Sync {
    /// World bounds used when the object is registered.
    fn bounds(&self) -> BoxSphereBounds;

    /// Which passes the object is relevant to in `view`.
    fn view_relevance(&self, view: &SceneView) -> ViewRelevance;

    /// Separate occlusion volumes for objects flagged with sub-primitive
    /// queries. `None` means the object is tested as a whole; an empty list
    /// means there is nothing to draw.
    fn occlusion_query_bounds(&self, _view: &SceneView) -> Option<Vec<BoxSphereBounds>> {
        None
    }

    /// Receives one occlusion flag per volume returned by
    /// [`occlusion_query_bounds`](Self::occlusion_query_bounds); `true` means occluded.
    fn accept_occlusion_results(&self, _view: &SceneView, _occluded: &[bool]) {}

    /// Builds per-view data for objects whose relevance requests it.
    fn init_view_custom_data(
        &self,
        _view: &SceneView,
        _lod_distance_factor: f32,
        _screen_radius_squared: f32,
    ) -> Option<CustomViewData> {
        None
    }

    /// Static mesh elements, one entry per LOD and section.
    fn static_meshes(&self) -> &[StaticMeshLod] {
        &[]
    }

    /// Small decorative meshes that keep their draw distance even when
    /// distance culling is disabled for debugging.
    fn is_detail_mesh(&self) -> bool {
        false
    }
}
