//! Per-object occlusion history carried across frames.

use rustc_hash::FxHashMap;
use sightline_scene::ComponentId;

use super::hzb::HzbHandle;
use super::query::QueryHandle;
use sightline_config::MAX_BUFFERED_QUERY_FRAMES;

/// Identifies one occlusion volume: an object, or one of its sub-primitives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OcclusionHistoryKey {
    pub id: ComponentId,
    pub subquery: u32,
}

impl OcclusionHistoryKey {
    pub fn new(id: ComponentId, subquery: u32) -> Self {
        Self { id, subquery }
    }
}

/// A query submitted in some earlier frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferedQuery {
    pub handle: QueryHandle,
    /// Occlusion frame the query was issued in.
    pub frame: u32,
    /// Shared with other primitives; a visible result is not conclusive.
    pub grouped: bool,
}

/// Scalar per-frame state. Fetch tasks copy this out, update the copy and
/// hand it back for the single-threaded merge.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HistoryState {
    pub last_tested_frame: u32,
    pub last_considered_frame: u32,
    pub last_proven_visible_time: f32,
    pub last_considered_time: f32,
    pub was_occluded: bool,
    /// Whether last frame's occlusion result was conclusive.
    pub definite: bool,
    /// Share of the screen covered the last time a query came back visible.
    pub last_pixels_percentage: f32,
    /// Frames left to keep expanding bounds after becoming eligible again.
    pub became_eligible_cooldown: u32,
}

impl Default for HistoryState {
    fn default() -> Self {
        Self {
            last_tested_frame: 0,
            last_considered_frame: 0,
            last_proven_visible_time: 0.0,
            last_considered_time: 0.0,
            was_occluded: false,
            definite: false,
            last_pixels_percentage: 0.0,
            became_eligible_cooldown: 0,
        }
    }
}

/// Cross-frame occlusion record for one volume.
#[derive(Clone, Debug)]
pub struct OcclusionHistory {
    pub key: OcclusionHistoryKey,
    pub state: HistoryState,
    /// Handle of the HZB test added in `state.last_tested_frame`.
    pub hzb_handle: Option<HzbHandle>,
    queries: [Option<BufferedQuery>; MAX_BUFFERED_QUERY_FRAMES as usize],
}

impl OcclusionHistory {
    pub fn new(key: OcclusionHistoryKey) -> Self {
        Self::with_state(key, HistoryState::default())
    }

    pub fn with_state(key: OcclusionHistoryKey, state: HistoryState) -> Self {
        Self {
            key,
            state,
            hzb_handle: None,
            queries: [None; MAX_BUFFERED_QUERY_FRAMES as usize],
        }
    }

    fn slot(frame: u32, buffered_frames: u32) -> usize {
        (frame % buffered_frames) as usize
    }

    /// The query issued exactly `buffered_frames` ago, whose result is due now.
    pub fn past_query(&self, frame: u32, buffered_frames: u32) -> Option<BufferedQuery> {
        let target = frame.wrapping_sub(buffered_frames);
        self.queries[Self::slot(frame, buffered_frames)].filter(|q| q.frame == target)
    }

    /// Take the due query out of its slot so its handle can be released.
    pub fn take_past_query(&mut self, frame: u32, buffered_frames: u32) -> Option<BufferedQuery> {
        let slot = &mut self.queries[Self::slot(frame, buffered_frames)];
        let target = frame.wrapping_sub(buffered_frames);
        if slot.is_some_and(|q| q.frame == target) {
            slot.take()
        } else {
            None
        }
    }

    /// Store this frame's query. Returns the query it displaced, whose
    /// handle the caller must release.
    pub fn set_query(&mut self, frame: u32, buffered_frames: u32, handle: QueryHandle, grouped: bool) -> Option<BufferedQuery> {
        self.queries[Self::slot(frame, buffered_frames)].replace(BufferedQuery { handle, frame, grouped })
    }

    /// Frame of the most recent query still buffered, or 0 when none is.
    pub fn last_submit_frame(&self) -> u32 {
        self.queries.iter().flatten().map(|q| q.frame).max().unwrap_or(0)
    }

    /// Remove every buffered query, returning their handles.
    pub fn drain_queries(&mut self) -> impl Iterator<Item = QueryHandle> + '_ {
        self.queries.iter_mut().filter_map(|slot| slot.take()).map(|q| q.handle)
    }
}

/// All occlusion histories of one view.
#[derive(Debug, Default)]
pub struct OcclusionHistoryStore {
    entries: FxHashMap<OcclusionHistoryKey, OcclusionHistory>,
}

impl OcclusionHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &OcclusionHistoryKey) -> Option<&OcclusionHistory> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &OcclusionHistoryKey) -> Option<&mut OcclusionHistory> {
        self.entries.get_mut(key)
    }

    pub fn insert(&mut self, history: OcclusionHistory) {
        self.entries.insert(history.key, history);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when any volume of `id` still has a history.
    pub fn contains_component(&self, id: ComponentId) -> bool {
        self.entries.keys().any(|k| k.id == id)
    }

    /// Drop histories last considered before `min_frame`. Returns the query
    /// handles they still held.
    pub fn prune(&mut self, min_frame: u32) -> Vec<QueryHandle> {
        let mut released = Vec::new();
        self.entries.retain(|_, history| {
            if history.state.last_considered_frame >= min_frame {
                return true;
            }
            released.extend(history.drain_queries());
            false
        });
        released
    }

    /// Drop every history, returning the query handles they held.
    pub fn clear(&mut self) -> Vec<QueryHandle> {
        self.entries
            .drain()
            .flat_map(|(_, mut h)| h.drain_queries().collect::<Vec<_>>())
            .collect()
    }
}
