//! Per-frame visibility and occlusion culling.
//!
//! [`VisibilityPipeline`] takes a [`Scene`](sightline_scene::Scene) and a
//! [`SceneView`](sightline_scene::SceneView) and decides, for this frame,
//! which objects are drawn, at which LOD and with what fade. Cross-frame state
//! (occlusion history, fades, HLOD transitions) lives in a [`ViewState`] per
//! camera; GPU occlusion queries go through an [`OcclusionQueryBackend`].

mod error;
mod fading;
mod frustum_cull;
mod hlod;
mod lod;
pub mod occlusion;
mod parallel;
mod pipeline;
mod relevance;
mod result;
mod view_state;

#[cfg(test)]
mod test_support;

pub use error::PipelineError;
pub use fading::{FadeParams, FadingStateManager};
pub use frustum_cull::{FrustumCullOutput, cull_view_frustum};
pub use hlod::{HlodMaps, HlodNodeVisibility, HlodVisibilityState};
pub use lod::{LodMask, LodSettings, TemporalLodState, compute_lod_for_meshes};
pub use occlusion::hzb::HzbOcclusionTester;
pub use occlusion::pyramid::DepthPyramid;
pub use occlusion::query::{OcclusionQueryBackend, QueryHandle, QueryPool};
pub use occlusion::{OcclusionState, OcclusionStats};
pub use parallel::WorkerPool;
pub use pipeline::VisibilityPipeline;
pub use result::{MeshMarks, TranslucentPrimitive, ViewVisibility, VisibilityStats};
pub use view_state::ViewState;
