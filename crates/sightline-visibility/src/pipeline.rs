//! Per-frame driver: runs every stage for a view in order.
//!
//! HLOD update, frustum cull, occlusion cull, fading, then relevance. Stereo
//! pairs run the culling stages per eye, fold the secondary eye's visibility
//! into the primary, and only then compute relevance.

use sightline_config::Config;
use sightline_scene::{BitArray, PrimitiveRegistry, Scene, SceneView, StereoPass};

use crate::error::PipelineError;
use crate::frustum_cull::{CullInputs, frustum_cull};
use crate::hlod::HlodMaps;
use crate::occlusion::query::OcclusionQueryBackend;
use crate::occlusion::{OcclusionFrame, occlusion_cull};
use crate::parallel::WorkerPool;
use crate::relevance::{RelevanceInputs, compute_relevance};
use crate::result::ViewVisibility;
use crate::view_state::ViewState;

/// Culling output of one view before relevance.
struct CulledView {
    result: ViewVisibility,
    hlod: Option<HlodMaps>,
}

/// The visibility pipeline: configuration plus the worker pool every stage
/// shares.
#[derive(Debug)]
pub struct VisibilityPipeline {
    config: Config,
    workers: WorkerPool,
}

impl VisibilityPipeline {
    /// Validate `config` and build the worker pool.
    pub fn new(config: Config) -> Result<Self, PipelineError> {
        config.validate()?;
        let workers = WorkerPool::new(&config.parallel)?;
        tracing::info!(
            parallel = workers.is_parallel(),
            threads = workers.thread_count(),
            system = ?config.occlusion.system,
            "visibility pipeline ready"
        );
        Ok(Self { config, workers })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn workers(&self) -> &WorkerPool {
        &self.workers
    }

    /// Swap in a new configuration, rebuilding the worker pool when its
    /// settings changed.
    pub fn reconfigure(&mut self, config: Config) -> Result<(), PipelineError> {
        config.validate()?;
        if config.parallel != self.config.parallel {
            self.workers = WorkerPool::new(&config.parallel)?;
        }
        self.config = config;
        Ok(())
    }

    /// Compute one view's visibility for this frame.
    pub fn compute_view(
        &self,
        scene: &Scene,
        view: &SceneView,
        state: &mut ViewState,
        backend: &mut dyn OcclusionQueryBackend,
    ) -> ViewVisibility {
        let _span = tracing::info_span!("compute_view", frame = view.frame_number).entered();
        let culled = self.cull_view(scene, view, state, backend);
        self.finish_view(scene.registry(), view, state, culled)
    }

    /// Compute both eyes of a stereo pair. The primary eye's result also
    /// holds everything the secondary eye sees, for instanced drawing.
    pub fn compute_stereo_views(
        &self,
        scene: &Scene,
        primary: (&SceneView, &mut ViewState),
        secondary: (&SceneView, &mut ViewState),
        backend: &mut dyn OcclusionQueryBackend,
    ) -> Result<(ViewVisibility, ViewVisibility), PipelineError> {
        let (primary_view, primary_state) = primary;
        let (secondary_view, secondary_state) = secondary;
        if primary_view.stereo_pass != StereoPass::Primary || secondary_view.stereo_pass != StereoPass::Secondary {
            return Err(PipelineError::StereoPairMismatch(format!(
                "got {:?} and {:?}",
                primary_view.stereo_pass, secondary_view.stereo_pass
            )));
        }
        let _span = tracing::info_span!("compute_stereo_views", frame = primary_view.frame_number).entered();

        let mut left = self.cull_view(scene, primary_view, primary_state, backend);
        let right = self.cull_view(scene, secondary_view, secondary_state, backend);
        left.result.visible.or_assign(&right.result.visible);

        let registry = scene.registry();
        let left = self.finish_view(registry, primary_view, primary_state, left);
        let right = self.finish_view(registry, secondary_view, secondary_state, right);
        Ok((left, right))
    }

    fn cull_view(
        &self,
        scene: &Scene,
        view: &SceneView,
        state: &mut ViewState,
        backend: &mut dyn OcclusionQueryBackend,
    ) -> CulledView {
        let config = &self.config;
        let registry = scene.registry();
        state.occlusion_frame_counter = state.occlusion_frame_counter.wrapping_add(1);

        let fading_enabled = !config.fading.disable_lod_fade && !view.disable_distance_fade;
        state.fading.set_duration(config.fading.fade_duration);
        state.hlod.set_fade_duration(config.fading.fade_duration);
        state
            .temporal_lod
            .update(view, config.lod.temporal_lod_lag, fading_enabled);

        let hlod = state.hlod.update(
            registry,
            scene.hlod_tree(),
            view,
            state.temporal_lod.sync_time(),
            &config.lod,
        );

        let mut result = ViewVisibility::new(registry.len(), registry.mesh_id_capacity());
        result.stats.objects = registry.len();

        let culled = frustum_cull(
            &CullInputs {
                registry,
                view,
                config: &config.culling,
                fade_radius: if fading_enabled {
                    config.fading.distance_fade_max_travel
                } else {
                    0.0
                },
                hlod: hlod.as_ref(),
            },
            &self.workers,
        );
        result.visible = culled.visible;
        result.potentially_fading = culled.potentially_fading;
        result.stats.frustum_culled = culled.culled;

        // Distance verdict before occlusion, for the fade tracker.
        let in_range = result.visible.clone();
        let frame = OcclusionFrame {
            registry,
            view,
            config: &config.occlusion,
            frame: state.occlusion_frame_counter,
        };
        result.stats.occlusion = occlusion_cull(
            &frame,
            &mut state.occlusion,
            backend,
            &self.workers,
            &mut result.visible,
            &mut result.definitely_unoccluded,
        );

        update_fading(registry, view, state, &in_range, &mut result);
        if let Some(maps) = &hlod {
            for &(index, params) in &maps.fades {
                result.fade[index] = Some(params);
            }
            result.stats.hlod_forced_visible = maps.forced_visible.count_ones();
            result.stats.hlod_forced_hidden = maps.forced_hidden.count_ones();
        }
        state.last_frame = Some(view.frame_number);

        CulledView { result, hlod }
    }

    fn finish_view(
        &self,
        registry: &PrimitiveRegistry,
        view: &SceneView,
        state: &ViewState,
        culled: CulledView,
    ) -> ViewVisibility {
        let CulledView { mut result, hlod } = culled;
        compute_relevance(
            &RelevanceInputs {
                registry,
                view,
                config: &self.config,
                temporal: &state.temporal_lod,
                hlod: hlod.as_ref(),
            },
            &self.workers,
            &mut result,
        );
        result.lod_transition_alpha = state.temporal_lod.transition_alpha(view.real_time);
        result.stats.visible = result.visible.count_ones();
        result.stats.fading = result.fade.iter().filter(|f| f.is_some()).count();
        tracing::debug!(
            objects = result.stats.objects,
            visible = result.stats.visible,
            frustum_culled = result.stats.frustum_culled,
            occluded = result.stats.occlusion.occluded,
            fading = result.stats.fading,
            "view computed"
        );
        result
    }
}

/// Start, continue or reverse fades for objects near the edge of their draw
/// range. Fades follow the distance verdict in `in_range`; an object with a
/// fade in progress stays visible unless occlusion culled it.
fn update_fading(
    registry: &PrimitiveRegistry,
    view: &SceneView,
    state: &mut ViewState,
    in_range: &BitArray,
    result: &mut ViewVisibility,
) {
    let now = view.real_time;
    let frame = view.frame_number;
    state
        .fading
        .prune(now, state.last_frame.unwrap_or(frame), view.is_paused);

    let ids = registry.component_ids();
    for index in result.potentially_fading.iter_ones() {
        let distance_visible = in_range.get(index);
        let occluded = distance_visible && !result.visible.get(index);
        if let Some(params) = state.fading.update_fade(ids[index], distance_visible, now, frame)
            && !occluded
        {
            result.visible.set(index, true);
            result.fade[index] = Some(params);
        }
    }
}
