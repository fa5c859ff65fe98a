//! CPU stand-in for the GPU side of occlusion culling.

use glam::{Mat4, Vec3};
use rustc_hash::FxHashMap;
use sightline_scene::SceneView;
use sightline_visibility::occlusion::pyramid::project_box;
use sightline_visibility::{DepthPyramid, OcclusionQueryBackend, QueryHandle};

/// Answers occlusion queries by testing boxes against a depth pyramid built
/// from the scene's walls each frame.
#[derive(Default)]
pub struct SimulatedGpu {
    results: FxHashMap<QueryHandle, u64>,
    pyramid: Option<DepthPyramid>,
    view_projection: Mat4,
    submitted: u64,
}

impl SimulatedGpu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw this frame's depth prepass for `view`.
    pub fn render_depth(&mut self, view: &SceneView, occluders: &[(Vec3, Vec3)]) {
        self.view_projection = view.view_projection;
        self.pyramid = Some(DepthPyramid::from_occluders(view.viewport, &view.view_projection, occluders));
    }

    /// Boxes rasterized so far.
    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    pub fn pending_results(&self) -> usize {
        self.results.len()
    }
}

impl OcclusionQueryBackend for SimulatedGpu {
    fn submit(&mut self, handle: QueryHandle, origin: Vec3, extent: Vec3) {
        self.submitted += 1;
        let samples = match &self.pyramid {
            Some(pyramid) if !pyramid.is_box_visible(&self.view_projection, origin, extent) => 0,
            Some(pyramid) => project_box(&self.view_projection, origin, extent, pyramid.size())
                .map(|rect| {
                    let area = (rect.max - rect.min).max(glam::Vec2::ONE);
                    (area.x * area.y) as u64
                })
                .unwrap_or(1),
            None => 1,
        };
        *self.results.entry(handle).or_insert(0) += samples;
    }

    fn read_result(&self, handle: QueryHandle, _wait: bool) -> Option<u64> {
        self.results.get(&handle).copied()
    }

    fn release(&mut self, handle: QueryHandle) {
        self.results.remove(&handle);
    }

    fn depth_pyramid(&self) -> Option<&DepthPyramid> {
        self.pyramid.as_ref()
    }
}
