//! Frustum and draw-distance culling.
//!
//! Produces the view's Visible and PotentiallyFading bitsets. Work is split
//! into fixed runs of bitset words; a task owns its run of both bitsets and
//! never touches another task's words.

use sightline_config::CullingConfig;
use sightline_scene::{BITS_PER_WORD, BitArray, OcclusionFlags, PrimitiveRegistry, SceneView};

use crate::hlod::HlodMaps;
use crate::parallel::WorkerPool;

/// Result of culling one view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrustumCullOutput {
    pub visible: BitArray,
    /// Objects near the edge of their draw range that may need a fade.
    pub potentially_fading: BitArray,
    /// Objects not in `visible`.
    pub culled: usize,
}

/// What the culler reads for one view.
pub(crate) struct CullInputs<'a> {
    pub registry: &'a PrimitiveRegistry,
    pub view: &'a SceneView,
    pub config: &'a CullingConfig,
    /// Width of the fade band around max draw distance; 0 disables fading.
    pub fade_radius: f32,
    pub hlod: Option<&'a HlodMaps>,
}

enum Verdict {
    Culled,
    /// Beyond max draw distance but inside the fade band.
    FadingOnly,
    Visible { fading: bool },
}

/// Cull every registered object against the view.
pub(crate) fn frustum_cull(inputs: &CullInputs<'_>, workers: &WorkerPool) -> FrustumCullOutput {
    let _span = tracing::info_span!("frustum_cull", objects = inputs.registry.len()).entered();
    let count = inputs.registry.len();
    let mut visible = BitArray::new(count);
    let mut potentially_fading = BitArray::new(count);
    let words_per_task = inputs.config.frustum_cull_words_per_task.max(1);

    let tasks: Vec<_> = visible
        .words_mut()
        .chunks_mut(words_per_task)
        .zip(potentially_fading.words_mut().chunks_mut(words_per_task))
        .enumerate()
        .collect();
    workers.run(tasks, |(task, (vis, fade))| {
        cull_words(inputs, task * words_per_task, vis, fade);
    });

    let culled = count - visible.count_ones();
    tracing::debug!(
        objects = count,
        culled,
        fading = potentially_fading.count_ones(),
        "frustum cull finished"
    );
    FrustumCullOutput {
        visible,
        potentially_fading,
        culled,
    }
}

/// Cull `registry` against `view` on its own, without HLOD overrides.
pub fn cull_view_frustum(
    registry: &PrimitiveRegistry,
    view: &SceneView,
    config: &CullingConfig,
    fade_radius: f32,
    workers: &WorkerPool,
) -> FrustumCullOutput {
    let inputs = CullInputs {
        registry,
        view,
        config,
        fade_radius,
        hlod: None,
    };
    frustum_cull(&inputs, workers)
}

fn cull_words(inputs: &CullInputs<'_>, first_word: usize, visible: &mut [u32], fading: &mut [u32]) {
    let count = inputs.registry.len();
    for (offset, (vis_word, fade_word)) in visible.iter_mut().zip(fading.iter_mut()).enumerate() {
        let base = (first_word + offset) * BITS_PER_WORD;
        for index in base..(base + BITS_PER_WORD).min(count) {
            let bit = 1u32 << (index - base);
            match classify(inputs, index) {
                Verdict::Culled => {}
                Verdict::FadingOnly => *fade_word |= bit,
                Verdict::Visible { fading } => {
                    *vis_word |= bit;
                    if fading {
                        *fade_word |= bit;
                    }
                }
            }
        }
    }
}

fn classify(inputs: &CullInputs<'_>, index: usize) -> Verdict {
    let registry = inputs.registry;
    let view = inputs.view;
    let config = inputs.config;
    let primitive = &registry.bounds()[index];
    let bounds = &primitive.bounds;
    let dist_sq = bounds.origin.distance_squared(view.view_origin);

    let mut max = if primitive.max_draw_distance.is_finite() {
        primitive.max_draw_distance * config.view_distance_scale
    } else {
        primitive.max_draw_distance
    };
    let mut min = primitive.min_draw_distance;
    if config.force_disable_distance_culling {
        let detail = registry.proxies()[index]
            .as_ref()
            .is_some_and(|proxy| proxy.is_detail_mesh());
        if !detail {
            max = f32::INFINITY;
        }
    }
    if let Some(hlod) = inputs.hlod {
        if hlod.forced_hidden.get(index) {
            return Verdict::Culled;
        }
        if hlod.forced_visible.get(index) {
            max = f32::INFINITY;
            min = 0.0;
        }
    }

    let fade = inputs.fade_radius;
    let far = max + fade;
    if dist_sq > far * far || dist_sq < min * min {
        return Verdict::Culled;
    }

    if let Some(query) = &view.custom_visibility {
        let required = OcclusionFlags::CAN_BE_OCCLUDED | OcclusionFlags::HAS_PRECOMPUTED_VISIBILITY;
        if registry.occlusion_flags()[index].contains(required)
            && !query.is_visible(registry.component_ids()[index], bounds)
        {
            return Verdict::Culled;
        }
    }

    if config.also_use_sphere_test && !view.frustum.intersects_sphere(bounds.origin, bounds.sphere_radius) {
        return Verdict::Culled;
    }
    if !view.frustum.intersects_box(bounds.origin, bounds.box_extent) {
        return Verdict::Culled;
    }

    if dist_sq > max * max {
        return Verdict::FadingOnly;
    }
    let fade_start = (max - fade).max(0.0);
    Verdict::Visible {
        fading: fade > 0.0 && dist_sq > fade_start * fade_start,
    }
}
