//! State one view carries from frame to frame.

use sightline_config::Config;
use sightline_scene::ComponentId;

use crate::fading::FadingStateManager;
use crate::hlod::HlodVisibilityState;
use crate::lod::TemporalLodState;
use crate::occlusion::OcclusionState;
use crate::occlusion::history::OcclusionHistoryKey;
use crate::occlusion::query::OcclusionQueryBackend;

/// Persistent per-view state: occlusion history, fades, temporal LOD samples
/// and HLOD node states. Create one per camera and pass it to every
/// [`compute_view`](crate::VisibilityPipeline::compute_view) for that camera.
#[derive(Debug)]
pub struct ViewState {
    pub(crate) occlusion_frame_counter: u32,
    pub(crate) last_frame: Option<u32>,
    pub(crate) occlusion: OcclusionState,
    pub(crate) fading: FadingStateManager,
    pub(crate) temporal_lod: TemporalLodState,
    pub(crate) hlod: HlodVisibilityState,
}

impl ViewState {
    pub fn new(config: &Config) -> Self {
        Self {
            occlusion_frame_counter: 0,
            last_frame: None,
            occlusion: OcclusionState::new(),
            fading: FadingStateManager::new(config.fading.fade_duration),
            temporal_lod: TemporalLodState::default(),
            hlod: HlodVisibilityState::new(config.fading.fade_duration),
        }
    }

    /// Occlusion evaluations so far; the first one is frame 1.
    pub fn occlusion_frame_counter(&self) -> u32 {
        self.occlusion_frame_counter
    }

    pub fn occlusion(&self) -> &OcclusionState {
        &self.occlusion
    }

    pub fn fading(&self) -> &FadingStateManager {
        &self.fading
    }

    pub fn temporal_lod(&self) -> &TemporalLodState {
        &self.temporal_lod
    }

    pub fn hlod(&self) -> &HlodVisibilityState {
        &self.hlod
    }

    /// True while any cross-frame record is keyed to `id`.
    pub fn tracks_component(&self, id: ComponentId) -> bool {
        self.occlusion.histories().contains_component(id)
            || self.fading.contains(id)
            || self.hlod.fading().contains(id)
            || self.hlod.node_visibility(id).is_some()
    }

    /// True when a history exists for volume `subquery` of `id`.
    pub fn has_history(&self, id: ComponentId, subquery: u32) -> bool {
        self.occlusion
            .histories()
            .get(&OcclusionHistoryKey::new(id, subquery))
            .is_some()
    }

    /// Drop everything and hand outstanding queries back to `backend`, as
    /// when the camera is destroyed or teleports.
    pub fn reset(&mut self, backend: &mut dyn OcclusionQueryBackend) {
        self.occlusion.reset(backend);
        self.fading.clear();
        self.temporal_lod = TemporalLodState::default();
        self.hlod = HlodVisibilityState::new(self.fading.duration());
        self.last_frame = None;
        tracing::debug!(frame = self.occlusion_frame_counter, "view state reset");
    }
}
