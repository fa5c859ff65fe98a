//! Fixtures shared by the unit tests of this crate.

use std::sync::Mutex;

use glam::{Mat4, UVec2, Vec3};
use rustc_hash::FxHashMap;
use sightline_math::BoxSphereBounds;
use sightline_scene::{CustomViewData, PrimitiveProxy, SceneView, StaticMeshLod, ViewRelevance};

use crate::occlusion::pyramid::DepthPyramid;
use crate::occlusion::query::{OcclusionQueryBackend, QueryHandle};

/// Looking down -Z from `origin` with a 90 degree FOV into a 64x64 target.
pub(crate) fn camera(origin: Vec3) -> SceneView {
    let view = Mat4::look_to_rh(origin, Vec3::NEG_Z, Vec3::Y);
    let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 1000.0, 0.1);
    SceneView::new(origin, view, proj, UVec2::new(64, 64))
}

/// A unit cube with configurable relevance and meshes.
pub(crate) struct TestProxy {
    bounds: BoxSphereBounds,
    relevance: ViewRelevance,
    meshes: Vec<StaticMeshLod>,
    sub_bounds: Option<Vec<BoxSphereBounds>>,
    custom_data: bool,
    detail: bool,
    accepted: Mutex<Vec<Vec<bool>>>,
}

impl TestProxy {
    pub(crate) fn at(origin: Vec3) -> Self {
        Self {
            bounds: BoxSphereBounds::from_extent(origin, Vec3::ONE),
            relevance: ViewRelevance::opaque_static(),
            meshes: vec![StaticMeshLod::new(0, 0.0)],
            sub_bounds: None,
            custom_data: false,
            detail: false,
            accepted: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_relevance(mut self, relevance: ViewRelevance) -> Self {
        self.relevance = relevance;
        self
    }

    pub(crate) fn with_meshes(mut self, meshes: Vec<StaticMeshLod>) -> Self {
        self.meshes = meshes;
        self
    }

    pub(crate) fn with_sub_bounds(mut self, bounds: Vec<BoxSphereBounds>) -> Self {
        self.sub_bounds = Some(bounds);
        self
    }

    pub(crate) fn with_custom_data(mut self) -> Self {
        self.custom_data = true;
        self
    }

    pub(crate) fn detail(mut self) -> Self {
        self.detail = true;
        self
    }

    /// Every occlusion vector handed to the proxy, oldest first.
    pub(crate) fn accepted(&self) -> Vec<Vec<bool>> {
        self.accepted.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl PrimitiveProxy for TestProxy {
    fn bounds(&self) -> BoxSphereBounds {
        self.bounds
    }

    fn view_relevance(&self, _view: &SceneView) -> ViewRelevance {
        self.relevance
    }

    fn occlusion_query_bounds(&self, _view: &SceneView) -> Option<Vec<BoxSphereBounds>> {
        self.sub_bounds.clone()
    }

    fn accept_occlusion_results(&self, _view: &SceneView, occluded: &[bool]) {
        if let Ok(mut accepted) = self.accepted.lock() {
            accepted.push(occluded.to_vec());
        }
    }

    fn init_view_custom_data(
        &self,
        _view: &SceneView,
        _lod_distance_factor: f32,
        screen_radius_squared: f32,
    ) -> Option<CustomViewData> {
        self.custom_data
            .then(|| Box::new(screen_radius_squared) as CustomViewData)
    }

    fn static_meshes(&self) -> &[StaticMeshLod] {
        &self.meshes
    }

    fn is_detail_mesh(&self) -> bool {
        self.detail
    }
}

/// Backend whose sample counts come from a function of each submitted box.
pub(crate) struct ScriptedBackend {
    samples: fn(Vec3, Vec3) -> u64,
    results: FxHashMap<QueryHandle, u64>,
    pub(crate) submitted: usize,
    pub(crate) released: Vec<QueryHandle>,
    pub(crate) exact: bool,
    pub(crate) pyramid: Option<DepthPyramid>,
}

impl ScriptedBackend {
    pub(crate) fn new(samples: fn(Vec3, Vec3) -> u64) -> Self {
        Self {
            samples,
            results: FxHashMap::default(),
            submitted: 0,
            released: Vec::new(),
            exact: true,
            pyramid: None,
        }
    }
}

impl OcclusionQueryBackend for ScriptedBackend {
    fn submit(&mut self, handle: QueryHandle, origin: Vec3, extent: Vec3) {
        self.submitted += 1;
        *self.results.entry(handle).or_insert(0) += (self.samples)(origin, extent);
    }

    fn read_result(&self, handle: QueryHandle, _wait: bool) -> Option<u64> {
        self.results.get(&handle).copied()
    }

    fn release(&mut self, handle: QueryHandle) {
        self.results.remove(&handle);
        self.released.push(handle);
    }

    fn supports_exact_queries(&self) -> bool {
        self.exact
    }

    fn depth_pyramid(&self) -> Option<&DepthPyramid> {
        self.pyramid.as_ref()
    }
}
