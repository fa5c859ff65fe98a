//! Occlusion culling: temporal query history, hardware queries and HZB tests.

mod fetch;
pub mod history;
pub mod hzb;
pub mod pyramid;
pub mod query;

pub(crate) use fetch::{OcclusionFrame, occlusion_cull};

use history::OcclusionHistoryStore;
use hzb::HzbOcclusionTester;
use query::{OcclusionQueryBackend, QueryHandle, QueryPool};

/// Counters from one view's occlusion stage.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OcclusionStats {
    /// Culled by precomputed visibility before any query.
    pub precomputed_culled: usize,
    /// Culled by query or HZB results.
    pub occluded: usize,
    pub individual_queries: usize,
    pub grouped_queries: usize,
    pub grouped_batches: usize,
    /// Individual queries held back by the outstanding-query budget.
    pub deferred_queries: usize,
    pub hzb_tests: usize,
    pub histories: usize,
}

/// Occlusion state one view keeps across frames.
#[derive(Debug, Default)]
pub struct OcclusionState {
    pub(crate) histories: OcclusionHistoryStore,
    pub(crate) pool: QueryPool,
    pub(crate) hzb: HzbOcclusionTester,
}

impl OcclusionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn histories(&self) -> &OcclusionHistoryStore {
        &self.histories
    }

    pub fn pool(&self) -> &QueryPool {
        &self.pool
    }

    pub fn hzb(&self) -> &HzbOcclusionTester {
        &self.hzb
    }

    /// Forget every history and hand their queries back.
    pub fn reset(&mut self, backend: &mut dyn OcclusionQueryBackend) {
        for handle in self.histories.clear() {
            release_query(&mut self.pool, backend, handle);
        }
    }
}

/// Drop one reference to `handle`, telling the backend once it is free.
pub(crate) fn release_query(pool: &mut QueryPool, backend: &mut dyn OcclusionQueryBackend, handle: QueryHandle) {
    if pool.release(handle) {
        backend.release(handle);
    }
}
