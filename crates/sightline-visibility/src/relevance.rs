//! Per-object relevance: which passes and lists each visible object feeds.
//!
//! Visible indices are split into fixed-size packets processed on the worker
//! pool. A packet only writes its own output; the merge afterwards is the
//! single point where shared results are touched.

use sightline_config::Config;
use sightline_math::bounds_screen_radius_squared;
use sightline_scene::{
    CustomViewData, MarkMask, MeshId, PrimitiveProxy, PrimitiveRegistry, RelevanceFlags, SceneView,
    ViewRelevance,
};

use crate::hlod::HlodMaps;
use crate::lod::{LodMask, LodSettings, TemporalLodState, compute_lod_for_meshes};
use crate::parallel::WorkerPool;
use crate::result::{TranslucentPrimitive, ViewVisibility};

pub(crate) struct RelevanceInputs<'a> {
    pub registry: &'a PrimitiveRegistry,
    pub view: &'a SceneView,
    pub config: &'a Config,
    pub temporal: &'a TemporalLodState,
    pub hlod: Option<&'a HlodMaps>,
}

/// What one packet found.
#[derive(Default)]
struct RelevancePacket {
    missing_proxy: Vec<usize>,
    not_drawn: Vec<usize>,
    static_mesh: Vec<usize>,
    translucent: Vec<TranslucentPrimitive>,
    distortion: Vec<usize>,
    decals: Vec<usize>,
    custom_depth: Vec<usize>,
    editor_only: Vec<usize>,
    dynamic: Vec<usize>,
    custom_data: Vec<(usize, CustomViewData)>,
    lod_masks: Vec<(usize, LodMask)>,
    marks: Vec<(MeshId, MarkMask)>,
    visible_static_mesh_elements: usize,
}

/// Categorize every object set in `result.visible` and write the merged
/// lists, LOD masks and mesh marks into `result`.
pub(crate) fn compute_relevance(inputs: &RelevanceInputs<'_>, workers: &WorkerPool, result: &mut ViewVisibility) {
    let visible: Vec<usize> = result.visible.iter_ones().collect();
    let _span = tracing::info_span!("relevance", visible = visible.len()).entered();

    let packet_size = inputs.config.parallel.relevance_packet_size.max(1);
    let packets: Vec<&[usize]> = visible.chunks(packet_size).collect();
    let outputs = workers.run(packets, |indices| compute_packet(inputs, indices));

    result.stats.relevance_packets = outputs.len();
    for packet in outputs {
        merge_packet(packet, result);
    }

    result.translucent.sort_by(|a, b| {
        a.sort_priority
            .cmp(&b.sort_priority)
            .then(b.distance_sq.total_cmp(&a.distance_sq))
    });
    tracing::debug!(
        packets = result.stats.relevance_packets,
        translucent = result.translucent.len(),
        dynamic = result.dynamic.len(),
        static_mesh = result.static_mesh.len(),
        "relevance merged"
    );
}

fn compute_packet(inputs: &RelevanceInputs<'_>, indices: &[usize]) -> RelevancePacket {
    let registry = inputs.registry;
    let view = inputs.view;
    let mut packet = RelevancePacket::default();

    for &index in indices {
        let Some(proxy) = registry.proxies()[index].as_deref() else {
            packet.missing_proxy.push(index);
            continue;
        };
        let relevance = proxy.view_relevance(view);
        let flags = relevance.flags;

        let mut screen_radius_sq = None;
        if flags.contains(RelevanceFlags::STATIC)
            && flags.intersects(RelevanceFlags::DRAW | RelevanceFlags::SHADOW)
        {
            packet.static_mesh.push(index);
            screen_radius_sq = Some(mark_relevant(inputs, index, proxy, &relevance, &mut packet));
        }

        if flags.contains(RelevanceFlags::CUSTOM_DATA) {
            let radius_sq = screen_radius_sq.unwrap_or_else(|| {
                let bounds = &registry.bounds()[index].bounds;
                bounds_screen_radius_squared(bounds.origin, bounds.sphere_radius, view.view_origin, &view.projection)
            });
            if let Some(data) = proxy.init_view_custom_data(view, view.lod_distance_factor, radius_sq) {
                packet.custom_data.push((index, data));
            }
        }

        if !flags.contains(RelevanceFlags::DRAW) {
            packet.not_drawn.push(index);
            continue;
        }

        if flags.contains(RelevanceFlags::DECAL) {
            packet.decals.push(index);
        }
        let editor_only = flags.contains(RelevanceFlags::EDITOR_ONLY);
        if editor_only {
            packet.editor_only.push(index);
        } else if flags.contains(RelevanceFlags::DYNAMIC) {
            packet.dynamic.push(index);
        }
        if flags.contains(RelevanceFlags::TRANSLUCENT)
            && !editor_only
            && flags.contains(RelevanceFlags::RENDER_IN_MAIN_PASS)
        {
            let origin = registry.bounds()[index].bounds.origin;
            packet.translucent.push(TranslucentPrimitive {
                index,
                id: registry.component_ids()[index],
                sort_priority: relevance.translucency_sort_priority,
                distance_sq: origin.distance_squared(view.view_origin),
            });
            if flags.contains(RelevanceFlags::DISTORTION) {
                packet.distortion.push(index);
            }
        }
        if flags.contains(RelevanceFlags::CUSTOM_DEPTH) {
            packet.custom_depth.push(index);
        }
    }
    packet
}

/// Pick the object's LOD and mark the static mesh elements it draws.
/// Returns the squared screen radius.
fn mark_relevant(
    inputs: &RelevanceInputs<'_>,
    index: usize,
    proxy: &dyn PrimitiveProxy,
    relevance: &ViewRelevance,
    packet: &mut RelevancePacket,
) -> f32 {
    let config = inputs.config;
    let view = inputs.view;
    let bounds = &inputs.registry.bounds()[index].bounds;
    let meshes = proxy.static_meshes();

    let settings = LodSettings {
        lod_scale: config.lod.lod_distance_scale * view.lod_distance_factor,
        forced_lod: config.lod.forced_lod,
        min_screen_radius_for_lod: config.culling.min_screen_radius_for_lod,
    };
    let (mask, screen_radius_sq) = compute_lod_for_meshes(meshes, view, inputs.temporal, bounds, &settings);
    packet.lod_masks.push((index, mask));

    let hlod_fading = inputs.hlod.is_some_and(|h| h.fading.get(index));
    let hlod_fading_out = inputs.hlod.is_some_and(|h| h.fading_out.get(index));
    let dithered = mask.is_dithered();

    let inv_lod_scale = 1.0 / config.lod.lod_distance_scale.max(f32::EPSILON);
    let dist_sq = bounds.origin.distance_squared(view.view_origin);
    let lod_factor_dist_sq = dist_sq * (view.lod_distance_factor * inv_lod_scale).powi(2);
    let radius_sq = bounds.sphere_radius * bounds.sphere_radius;
    let draw_shadow_depth = radius_sq > config.culling.min_screen_radius_for_shadow.powi(2) * lod_factor_dist_sq;
    let draw_depth_only = radius_sq > config.culling.min_screen_radius_for_depth.powi(2) * lod_factor_dist_sq;

    let flags = relevance.flags;
    let drawn_in_pass = flags.contains(RelevanceFlags::DRAW)
        && flags.intersects(RelevanceFlags::RENDER_IN_MAIN_PASS | RelevanceFlags::CUSTOM_DEPTH);
    let mesh_ids = &inputs.registry.mesh_ids()[index];

    for (mesh, &mesh_id) in meshes.iter().zip(mesh_ids) {
        if !mask.contains(mesh.lod_index) {
            continue;
        }
        let mut marks = MarkMask::empty();
        // Mesh LODs the HLOD proxy is standing in for.
        let mut hidden_by_hlod = false;

        if hlod_fading {
            let (sample, fade) = if hlod_fading_out {
                (1, MarkMask::FADE_OUT_DITHERED)
            } else {
                (0, MarkMask::FADE_IN_DITHERED)
            };
            if dithered && mask.sample(sample) == mesh.lod_index {
                hidden_by_hlod = true;
            } else {
                marks |= fade;
            }
        } else if dithered {
            marks |= if mask.sample(0) == mesh.lod_index {
                MarkMask::FADE_OUT_DITHERED
            } else {
                MarkMask::FADE_IN_DITHERED
            };
        }

        if flags.contains(RelevanceFlags::SHADOW) && draw_shadow_depth && mesh.casts_shadow {
            marks |= MarkMask::SHADOW_DEPTH;
        }

        if drawn_in_pass && (mesh.use_for_material || mesh.use_as_occluder) && !hidden_by_hlod {
            if mesh.use_for_material {
                marks |= MarkMask::VISIBILITY;
                if flags.contains(RelevanceFlags::VELOCITY) {
                    marks |= MarkMask::VELOCITY;
                }
                packet.visible_static_mesh_elements += 1;
            }
            if mesh.use_as_occluder && draw_depth_only {
                marks |= MarkMask::OCCLUDER;
            }
        }

        if !marks.is_empty() {
            packet.marks.push((mesh_id, marks));
        }
    }
    screen_radius_sq
}

fn merge_packet(packet: RelevancePacket, result: &mut ViewVisibility) {
    if !packet.missing_proxy.is_empty() {
        tracing::trace!(count = packet.missing_proxy.len(), "skipped objects without a proxy");
    }
    for index in packet.missing_proxy.into_iter().chain(packet.not_drawn) {
        result.visible.set(index, false);
    }
    for (index, mask) in packet.lod_masks {
        result.lod_masks[index] = mask;
    }
    for (mesh, marks) in packet.marks {
        result.mesh_marks.apply(mesh, marks);
    }

    result.stats.translucent_per_packet.push(packet.translucent.len());
    result.stats.visible_static_mesh_elements += packet.visible_static_mesh_elements;
    result.translucent.extend(packet.translucent);
    result.static_mesh.extend(packet.static_mesh);
    result.distortion.extend(packet.distortion);
    result.decals.extend(packet.decals);
    result.custom_depth.extend(packet.custom_depth);
    result.editor_only.extend(packet.editor_only);
    result.dynamic.extend(packet.dynamic);
    result.custom_data.extend(packet.custom_data);
}
