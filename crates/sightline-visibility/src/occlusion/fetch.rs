//! Per-frame occlusion fetch.
//!
//! The visible bitset is split into word ranges balanced by set-bit count.
//! Each task reads histories immutably, evaluates the objects in its range
//! and records everything it wants changed in a private [`FetchOutput`]. The
//! outputs are then merged on the calling thread: releases and existing
//! histories first, then HZB tests and query submission, then insertion of
//! the histories created this frame.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rustc_hash::FxHashMap;
use sightline_config::{MAX_BUFFERED_QUERY_FRAMES, OcclusionConfig, OcclusionSystem};
use sightline_math::{BoxSphereBounds, box_push_out};
use sightline_scene::{BITS_PER_WORD, BitArray, OcclusionFlags, PrimitiveRegistry, SceneView, iter_word_ones};

use super::history::{HistoryState, OcclusionHistory, OcclusionHistoryKey, OcclusionHistoryStore};
use super::hzb::HzbResults;
use super::query::{OcclusionQueryBackend, QueryBatcher, QueryHandle, QueryPool};
use super::{OcclusionState, OcclusionStats, release_query};
use crate::parallel::WorkerPool;

const QUERY_RNG_SEED: u64 = 0x51A7_11E0_0CC1_0DE5;

/// Everything the occlusion stage reads for one view and frame.
pub(crate) struct OcclusionFrame<'a> {
    pub registry: &'a PrimitiveRegistry,
    pub view: &'a SceneView,
    pub config: &'a OcclusionConfig,
    /// Occlusion frame counter of the view; advances once per evaluation.
    pub frame: u32,
}

struct FetchContext<'a, 'h> {
    frame: &'a OcclusionFrame<'a>,
    histories: &'a OcclusionHistoryStore,
    backend: &'a dyn OcclusionQueryBackend,
    hzb: Option<&'a HzbResults<'h>>,
    use_hzb: bool,
    submit_queries: bool,
    exact_queries: bool,
    budget_limited: bool,
    buffered_frames: u32,
    screen_pixels: f32,
}

struct FetchTask<'w> {
    index: usize,
    first_word: usize,
    visible: &'w mut [u32],
    definitely_unoccluded: &'w mut [u32],
}

struct PendingQuery {
    key: OcclusionHistoryKey,
    bounds: BoxSphereBounds,
    grouped: bool,
    last_submit_frame: u32,
}

#[derive(Default)]
struct FetchOutput {
    updates: Vec<(OcclusionHistoryKey, HistoryState)>,
    new_histories: Vec<OcclusionHistory>,
    releases: Vec<OcclusionHistoryKey>,
    hzb_bounds: Vec<(OcclusionHistoryKey, BoxSphereBounds)>,
    queries: Vec<PendingQuery>,
    sub_occlusion: Vec<(usize, Vec<bool>)>,
    occluded: usize,
}

#[derive(Clone, Copy)]
struct VolumeResult {
    occluded: bool,
    definite: bool,
}

/// Run occlusion culling for one view, clearing occluded objects from
/// `visible` and marking conclusive visible ones in `definitely_unoccluded`.
pub(crate) fn occlusion_cull(
    frame: &OcclusionFrame<'_>,
    state: &mut OcclusionState,
    backend: &mut dyn OcclusionQueryBackend,
    workers: &WorkerPool,
    visible: &mut BitArray,
    definitely_unoccluded: &mut BitArray,
) -> OcclusionStats {
    let _span = tracing::info_span!("occlusion_cull", frame = frame.frame).entered();
    let view = frame.view;
    let config = frame.config;
    let mut stats = OcclusionStats {
        precomputed_culled: cull_precomputed(frame, visible),
        ..Default::default()
    };

    if !view.is_hit_proxy {
        for handle in state.histories.prune(frame.frame.saturating_sub(1)) {
            release_query(&mut state.pool, backend, handle);
        }
    }

    let use_hzb = match config.system {
        OcclusionSystem::Hardware => false,
        OcclusionSystem::Hzb => backend.hzb_available(),
        OcclusionSystem::ForcedHzb => true,
    };
    let submit_queries = !config.disable_query_submission && view.allows_query_submission();

    let outputs = {
        let hzb_results = use_hzb.then(|| state.hzb.map_results());
        let ctx = FetchContext {
            frame,
            histories: &state.histories,
            backend: &*backend,
            hzb: hzb_results.as_ref(),
            use_hzb,
            submit_queries,
            exact_queries: backend.supports_exact_queries(),
            budget_limited: config.soft_max_outstanding_queries > 0,
            buffered_frames: config.max_buffered_query_frames.clamp(1, MAX_BUFFERED_QUERY_FRAMES),
            screen_pixels: view.screen_pixels().max(1.0),
        };
        let ends = partition_words(visible.words(), config.occlusion_fetch_tasks);
        let tasks = split_tasks(&ends, visible.words_mut(), definitely_unoccluded.words_mut());
        workers.run(tasks, |task| fetch_task(&ctx, task))
    };

    merge(outputs, frame, state, backend, &mut stats);

    if use_hzb && submit_queries {
        state.hzb.submit(backend.depth_pyramid(), &view.view_projection, frame.frame);
    }
    stats.histories = state.histories.len();
    tracing::debug!(
        occluded = stats.occluded,
        precomputed_culled = stats.precomputed_culled,
        individual = stats.individual_queries,
        grouped = stats.grouped_queries,
        deferred = stats.deferred_queries,
        hzb_tests = stats.hzb_tests,
        use_hzb,
        "occlusion cull finished"
    );
    stats
}

/// Cull objects the view's baked visibility table marks hidden.
fn cull_precomputed(frame: &OcclusionFrame<'_>, visible: &mut BitArray) -> usize {
    let Some(pvs) = frame.view.precomputed_visibility.as_deref() else {
        return 0;
    };
    let required = OcclusionFlags::CAN_BE_OCCLUDED | OcclusionFlags::HAS_PRECOMPUTED_VISIBILITY;
    let registry = frame.registry;
    let hidden: Vec<usize> = visible
        .iter_ones()
        .filter(|&i| {
            registry.occlusion_flags()[i].contains(required)
                && registry.visibility_ids()[i].is_some_and(|vid| !pvs.is_visible(vid))
        })
        .collect();
    for &i in &hidden {
        visible.set(i, false);
    }
    hidden.len()
}

/// End word (exclusive) of each task's range, balanced by set-bit count.
fn partition_words(words: &[u32], tasks: usize) -> Vec<usize> {
    let tasks = tasks.max(1);
    let total: usize = words.iter().map(|w| w.count_ones() as usize).sum();
    let per_task = total.div_ceil(tasks).max(1);
    let mut ends = Vec::with_capacity(tasks);
    let mut seen = 0;
    for (i, word) in words.iter().enumerate() {
        seen += word.count_ones() as usize;
        if ends.len() + 1 < tasks && seen >= per_task * (ends.len() + 1) {
            ends.push(i + 1);
        }
    }
    ends.push(words.len());
    ends
}

fn split_tasks<'w>(ends: &[usize], mut visible: &'w mut [u32], mut definite: &'w mut [u32]) -> Vec<FetchTask<'w>> {
    let mut tasks = Vec::with_capacity(ends.len());
    let mut start = 0;
    for (index, &end) in ends.iter().enumerate() {
        let (vis_head, vis_tail) = std::mem::take(&mut visible).split_at_mut(end - start);
        let (def_head, def_tail) = std::mem::take(&mut definite).split_at_mut(end - start);
        visible = vis_tail;
        definite = def_tail;
        tasks.push(FetchTask {
            index,
            first_word: start,
            visible: vis_head,
            definitely_unoccluded: def_head,
        });
        start = end;
    }
    tasks
}

fn fetch_task(ctx: &FetchContext<'_, '_>, task: FetchTask<'_>) -> FetchOutput {
    let frame = ctx.frame;
    let registry = frame.registry;
    let config = frame.config;
    let mut rng = ChaCha8Rng::seed_from_u64(QUERY_RNG_SEED ^ (u64::from(frame.frame) << 8) ^ task.index as u64);
    let mut out = FetchOutput::default();
    let base = task.first_word * BITS_PER_WORD;
    let candidates: Vec<usize> = iter_word_ones(task.visible, task.first_word).collect();

    for index in candidates {
        let local = index - base;
        let (word, mask) = (local / BITS_PER_WORD, 1u32 << (local % BITS_PER_WORD));
        let flags = registry.occlusion_flags()[index];
        let id = registry.component_ids()[index];

        let sub_bounds = if flags.contains(OcclusionFlags::HAS_SUBPRIMITIVE_QUERIES)
            && config.allow_sub_primitive_queries
            && !config.disable_query_submission
        {
            registry.proxies()[index]
                .as_ref()
                .and_then(|proxy| proxy.occlusion_query_bounds(frame.view))
        } else {
            None
        };

        let result = match sub_bounds {
            Some(volumes) if volumes.is_empty() => {
                task.visible[word] &= !mask;
                continue;
            }
            Some(volumes) => {
                let mut combined = VolumeResult {
                    occluded: true,
                    definite: true,
                };
                let mut occluded = Vec::with_capacity(volumes.len());
                for (sub, bounds) in volumes.iter().enumerate() {
                    let key = OcclusionHistoryKey::new(id, sub as u32);
                    let r = fetch_volume(ctx, &mut rng, &mut out, key, flags, bounds, true);
                    combined.occluded &= r.occluded;
                    combined.definite &= !r.occluded && r.definite;
                    occluded.push(r.occluded);
                }
                out.sub_occlusion.push((index, occluded));
                combined
            }
            None => {
                let key = OcclusionHistoryKey::new(id, 0);
                let bounds = &registry.occlusion_bounds()[index];
                fetch_volume(ctx, &mut rng, &mut out, key, flags, bounds, false)
            }
        };

        if result.occluded {
            task.visible[word] &= !mask;
            out.occluded += 1;
        } else if result.definite {
            task.definitely_unoccluded[word] |= mask;
        }
    }
    out
}

/// Evaluate one occlusion volume: read what earlier frames learned, then
/// decide whether and how to test it again.
fn fetch_volume(
    ctx: &FetchContext<'_, '_>,
    rng: &mut ChaCha8Rng,
    out: &mut FetchOutput,
    key: OcclusionHistoryKey,
    flags: OcclusionFlags,
    bounds: &BoxSphereBounds,
    is_subquery: bool,
) -> VolumeResult {
    let config = ctx.frame.config;
    let view = ctx.frame.view;
    let now = view.real_time;
    let counter = ctx.frame.frame;
    let can_be_occluded = flags.contains(OcclusionFlags::CAN_BE_OCCLUDED);

    let existing = ctx.histories.get(&key);
    let mut state = existing.map_or_else(HistoryState::default, |h| h.state);
    let mut occluded = false;
    let mut definite = false;

    match existing {
        None => definite = !can_be_occluded,
        Some(history) => {
            let past = history.past_query(counter, ctx.buffered_frames);
            if config.ignore_existing_queries {
                definite = config.disable_query_submission;
            } else if !can_be_occluded {
                definite = true;
            } else if ctx.use_hzb {
                if let Some(results) = ctx.hzb
                    && results.is_valid_frame(state.last_tested_frame)
                    && let Some(handle) = history.hzb_handle
                {
                    occluded = !results.is_visible(handle);
                    definite = true;
                }
            } else if let Some(query) = past {
                if let Some(samples) = ctx.backend.read_result(query.handle, true) {
                    occluded = samples == 0;
                    state.last_pixels_percentage = if occluded {
                        0.0
                    } else {
                        samples as f32 / ctx.screen_pixels
                    };
                    definite = !query.grouped;
                }
            } else {
                if ctx.buffered_frames > 1 || ctx.budget_limited {
                    occluded = state.was_occluded;
                    definite = state.definite;
                } else {
                    occluded = state.last_proven_visible_time + config.probably_visible_time < now;
                    definite = true;
                }
                state.last_pixels_percentage = if occluded {
                    0.0
                } else {
                    config.max_occlusion_pixels_fraction
                };
            }
            if past.is_some() && !view.is_hit_proxy {
                out.releases.push(key);
            }
        }
    }

    if ctx.submit_queries && can_be_occluded {
        let mut expand_newly = false;
        if config.expand_newly_tested_amount > 0.0
            && config.frames_to_expand_newly_tested > 0
            && config.frames_not_tested_to_expand > 0
        {
            if state.became_eligible_cooldown == 0
                && counter.wrapping_sub(state.last_considered_frame) > config.frames_not_tested_to_expand
            {
                state.became_eligible_cooldown = config.frames_to_expand_newly_tested;
            }
            expand_newly = state.became_eligible_cooldown != 0;
            if expand_newly {
                state.became_eligible_cooldown -= 1;
            }
        }
        let expand = config.expand_all_tested_amount
            + if expand_newly {
                config.expand_newly_tested_amount
            } else {
                0.0
            };
        let tested = bounds.expand_by(expand);

        let never = config.never_occlusion_test_distance;
        let near = view.near_plane();
        let normal = near.truncate();
        let allow_bounds_test = tested.origin.distance_squared(view.view_origin) >= never * never
            && normal.dot(tested.origin) + near.w > box_push_out(normal, tested.box_extent);

        if allow_bounds_test {
            state.last_tested_frame = counter;
            if ctx.use_hzb {
                out.hzb_bounds.push((key, tested));
            } else {
                let approximate = !is_subquery && flags.contains(OcclusionFlags::ALLOW_APPROXIMATE_OCCLUSION);
                let (run, grouped) = if !approximate {
                    (true, false)
                } else if occluded {
                    (true, true)
                } else if definite {
                    let rnd: f32 = rng.random();
                    let run = if ctx.exact_queries {
                        let max_fraction = config.max_occlusion_pixels_fraction.max(f32::EPSILON);
                        let multiplier = (state.last_pixels_percentage / max_fraction).max(1.0);
                        multiplier * rnd < max_fraction
                    } else {
                        now - state.last_proven_visible_time > config.probably_visible_time * 0.125 * rnd
                    };
                    (run, false)
                } else {
                    (true, false)
                };
                if run {
                    out.queries.push(PendingQuery {
                        key,
                        bounds: tested,
                        grouped,
                        last_submit_frame: existing.map_or(0, OcclusionHistory::last_submit_frame),
                    });
                }
            }
        } else {
            occluded = false;
            definite = true;
        }
    }

    state.last_considered_time = now;
    if !occluded && definite {
        state.last_proven_visible_time = now;
    }
    state.last_considered_frame = counter;
    state.was_occluded = occluded;
    state.definite = definite;

    if existing.is_some() {
        out.updates.push((key, state));
    } else {
        out.new_histories.push(OcclusionHistory::with_state(key, state));
    }
    VolumeResult { occluded, definite }
}

/// Individual queries to submit this frame given the outstanding budget.
///
/// Over budget, at least `ceil(pending * min_deferred_progress_fraction)`
/// still go out, and more if the budget leaves room for them.
fn individual_query_budget(pending: usize, grouped_batches: usize, config: &OcclusionConfig) -> usize {
    if config.soft_max_outstanding_queries == 0 {
        return pending;
    }
    let in_flight_frames = config.max_buffered_query_frames.clamp(1, 2) as usize;
    let soft_max = config.soft_max_outstanding_queries as usize / in_flight_frames;
    if soft_max >= grouped_batches + pending {
        return pending;
    }
    let mut to_do = (pending as f32 * config.min_deferred_progress_fraction).ceil() as usize;
    if soft_max > grouped_batches + to_do {
        to_do = soft_max - grouped_batches;
    }
    to_do.min(pending)
}

struct Merge<'s> {
    histories: &'s mut OcclusionHistoryStore,
    staged: FxHashMap<OcclusionHistoryKey, OcclusionHistory>,
    pool: &'s mut QueryPool,
    frame: u32,
    buffered_frames: u32,
}

impl Merge<'_> {
    fn history_mut(&mut self, key: &OcclusionHistoryKey) -> Option<&mut OcclusionHistory> {
        self.histories.get_mut(key).or_else(|| self.staged.get_mut(key))
    }

    fn store_query(
        &mut self,
        backend: &mut dyn OcclusionQueryBackend,
        key: &OcclusionHistoryKey,
        handle: QueryHandle,
        grouped: bool,
    ) {
        let (frame, buffered) = (self.frame, self.buffered_frames);
        let displaced = self
            .history_mut(key)
            .and_then(|h| h.set_query(frame, buffered, handle, grouped));
        if let Some(old) = displaced {
            release_query(self.pool, backend, old.handle);
        }
    }
}

fn merge(
    outputs: Vec<FetchOutput>,
    frame: &OcclusionFrame<'_>,
    state: &mut OcclusionState,
    backend: &mut dyn OcclusionQueryBackend,
    stats: &mut OcclusionStats,
) {
    let config = frame.config;
    let buffered_frames = config.max_buffered_query_frames.clamp(1, MAX_BUFFERED_QUERY_FRAMES);
    let OcclusionState { histories, pool, hzb } = state;
    let mut merge = Merge {
        histories,
        staged: FxHashMap::default(),
        pool,
        frame: frame.frame,
        buffered_frames,
    };

    let mut hzb_bounds = Vec::new();
    let mut grouped = Vec::new();
    let mut individual = Vec::new();
    for out in outputs {
        stats.occluded += out.occluded;
        for key in out.releases {
            let due = merge
                .histories
                .get_mut(&key)
                .and_then(|h| h.take_past_query(frame.frame, buffered_frames));
            if let Some(query) = due {
                release_query(merge.pool, backend, query.handle);
            }
        }
        for (key, updated) in out.updates {
            if let Some(history) = merge.histories.get_mut(&key) {
                history.state = updated;
            }
        }
        for (index, occluded) in out.sub_occlusion {
            if let Some(proxy) = &frame.registry.proxies()[index] {
                proxy.accept_occlusion_results(frame.view, &occluded);
            }
        }
        merge
            .staged
            .extend(out.new_histories.into_iter().map(|h| (h.key, h)));
        hzb_bounds.extend(out.hzb_bounds);
        for query in out.queries {
            if query.grouped {
                grouped.push(query);
            } else {
                individual.push(query);
            }
        }
    }

    for (key, bounds) in hzb_bounds {
        let handle = hzb.add_bounds(bounds.origin, bounds.box_extent);
        if let Some(history) = merge.history_mut(&key) {
            history.hzb_handle = handle;
        }
        stats.hzb_tests += 1;
    }

    let mut batcher = QueryBatcher::new(config.grouped_batch_size as usize);
    for query in &grouped {
        let handle = batcher.batch_primitive(merge.pool, query.bounds.origin, query.bounds.box_extent);
        merge.store_query(backend, &query.key, handle, true);
    }
    stats.grouped_queries = grouped.len();
    stats.grouped_batches = batcher.num_batches();

    let to_do = individual_query_budget(individual.len(), batcher.num_batches(), config);
    if to_do < individual.len() {
        individual.sort_by_key(|q| q.last_submit_frame);
    }
    stats.deferred_queries = individual.len() - to_do;
    stats.individual_queries = to_do;
    for query in individual.iter().take(to_do) {
        let handle = merge.pool.allocate();
        backend.submit(handle, query.bounds.origin, query.bounds.box_extent);
        merge.store_query(backend, &query.key, handle, false);
    }
    batcher.flush(backend);

    let Merge { histories, staged, .. } = merge;
    for (_, history) in staged {
        histories.insert(history);
    }
}
