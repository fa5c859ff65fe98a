//! Camera description for one view of the scene in one frame.

use std::fmt;
use std::sync::Arc;

use glam::{Mat4, UVec2, Vec3, Vec4};
use sightline_math::{BoxSphereBounds, Frustum, is_perspective};

use crate::bit_array::BitArray;
use crate::ids::ComponentId;

/// Which eye a view renders for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum StereoPass {
    #[default]
    Mono,
    /// Left eye; receives the right eye's visibility for instanced stereo.
    Primary,
    /// Right eye.
    Secondary,
}

/// Extra per-view culling, such as a portal or cell visibility system.
pub trait CustomVisibilityQuery: Send + Sync {
    /// Returns `false` when the object must be culled.
    fn is_visible(&self, id: ComponentId, bounds: &BoxSphereBounds) -> bool;
}

/// Baked visibility for the cell the camera is in, indexed by each object's
/// visibility id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PrecomputedVisibility {
    bits: BitArray,
}

impl PrecomputedVisibility {
    pub fn new(bits: BitArray) -> Self {
        Self { bits }
    }

    /// Objects outside the baked table are treated as visible.
    pub fn is_visible(&self, visibility_id: u32) -> bool {
        let index = visibility_id as usize;
        index >= self.bits.len() || self.bits.get(index)
    }
}

/// One camera view of the scene for one frame.
#[derive(Clone)]
pub struct SceneView {
    pub view_origin: Vec3,
    pub projection: Mat4,
    pub view_projection: Mat4,
    pub frustum: Frustum,
    /// Render target size in pixels.
    pub viewport: UVec2,
    pub frame_number: u32,
    /// Seconds since start, unaffected by pause.
    pub real_time: f32,
    /// Scales LOD distances for this view (e.g. from FOV or resolution).
    pub lod_distance_factor: f32,
    pub stereo_pass: StereoPass,
    /// Time stands still; fades are held and not pruned.
    pub is_paused: bool,
    /// Culling state is frozen for debugging; nothing new is submitted.
    pub is_frozen: bool,
    /// A child view (e.g. a reflection) that never submits occlusion queries.
    pub has_parent_view: bool,
    /// Picking view; pending occlusion queries are kept rather than released.
    pub is_hit_proxy: bool,
    pub disable_distance_fade: bool,
    pub custom_visibility: Option<Arc<dyn CustomVisibilityQuery>>,
    pub precomputed_visibility: Option<Arc<PrecomputedVisibility>>,
}

impl SceneView {
    /// A mono view from a world-to-view matrix and a reverse-Z projection.
    pub fn new(view_origin: Vec3, view: Mat4, projection: Mat4, viewport: UVec2) -> Self {
        let view_projection = projection * view;
        Self {
            view_origin,
            projection,
            view_projection,
            frustum: Frustum::from_view_projection(&view_projection),
            viewport,
            frame_number: 0,
            real_time: 0.0,
            lod_distance_factor: 1.0,
            stereo_pass: StereoPass::Mono,
            is_paused: false,
            is_frozen: false,
            has_parent_view: false,
            is_hit_proxy: false,
            disable_distance_fade: false,
            custom_visibility: None,
            precomputed_visibility: None,
        }
    }

    /// Stamp the frame counter and clock.
    #[must_use]
    pub fn at_frame(mut self, frame_number: u32, real_time: f32) -> Self {
        self.frame_number = frame_number;
        self.real_time = real_time;
        self
    }

    #[must_use]
    pub fn with_stereo_pass(mut self, pass: StereoPass) -> Self {
        self.stereo_pass = pass;
        self
    }

    /// Total pixels covered by the view.
    pub fn screen_pixels(&self) -> f32 {
        (self.viewport.x as f32) * (self.viewport.y as f32)
    }

    pub fn near_plane(&self) -> Vec4 {
        self.frustum.near_plane()
    }

    /// Views that never issue occlusion queries.
    pub fn allows_query_submission(&self) -> bool {
        !self.is_frozen && !self.has_parent_view
    }

    /// How much the field of view stretches HLOD transition distances: 1.0 at
    /// a 90 degree vertical FOV, larger when zoomed in.
    pub fn fov_distance_scale(&self) -> f32 {
        if is_perspective(&self.projection) {
            self.projection.y_axis.y.abs()
        } else {
            1.0
        }
    }
}

impl fmt::Debug for SceneView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneView")
            .field("view_origin", &self.view_origin)
            .field("viewport", &self.viewport)
            .field("frame_number", &self.frame_number)
            .field("real_time", &self.real_time)
            .field("stereo_pass", &self.stereo_pass)
            .field("is_paused", &self.is_paused)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn test_view() -> SceneView {
        let view = Mat4::look_to_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 1000.0, 0.1);
        SceneView::new(Vec3::ZERO, view, proj, UVec2::new(100, 50))
    }

    #[test]
    fn test_screen_pixels() {
        assert_eq!(test_view().screen_pixels(), 5000.0);
    }

    #[test]
    fn test_fov_scale_is_one_at_ninety_degrees() {
        assert_relative_eq!(test_view().fov_distance_scale(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_frozen_and_child_views_do_not_submit() {
        let mut view = test_view();
        assert!(view.allows_query_submission());
        view.has_parent_view = true;
        assert!(!view.allows_query_submission());
    }

    /// Ids past the end of the baked table count as visible.
    #[test]
    fn test_precomputed_visibility_lookup() {
        let mut bits = BitArray::new(4);
        bits.set(2, true);
        let pvs = PrecomputedVisibility::new(bits);
        assert!(pvs.is_visible(2));
        assert!(!pvs.is_visible(1));
        assert!(pvs.is_visible(40));
    }
}
