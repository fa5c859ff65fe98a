//! Occlusion query handles, the backend seam and grouped-query batching.

use std::sync::atomic::{AtomicU32, Ordering};

use glam::Vec3;

/// Pool ids start at 1; pool 0 is left to handles built with `from_raw`.
static NEXT_POOL_ID: AtomicU32 = AtomicU32::new(1);

/// An occlusion query slot. The high 32 bits name the pool that allocated
/// it, so handles from different views never collide on a shared backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct QueryHandle(u64);

impl QueryHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    fn new(pool: u32, slot: u32) -> Self {
        Self((u64::from(pool) << 32) | u64::from(slot))
    }

    fn pool(self) -> u32 {
        (self.0 >> 32) as u32
    }

    fn slot(self) -> usize {
        (self.0 & u64::from(u32::MAX)) as usize
    }
}

/// The GPU side of occlusion culling.
///
/// A query handle may receive several boxes (grouped queries); its result is
/// the number of samples that passed the depth test across all of them.
/// `read_result` is called from worker threads.
pub trait OcclusionQueryBackend: Send + Sync {
    /// Rasterize a box against the depth buffer under `handle`.
    fn submit(&mut self, handle: QueryHandle, origin: Vec3, extent: Vec3);

    /// Passed sample count for `handle`, blocking when `wait` is set.
    /// `None` means the result is unavailable; the object is then treated as
    /// visible.
    fn read_result(&self, handle: QueryHandle, wait: bool) -> Option<u64>;

    /// The handle went back to the pool; any stored result may be dropped.
    fn release(&mut self, _handle: QueryHandle) {}

    /// Sample counts are exact rather than a visible/hidden boolean.
    fn supports_exact_queries(&self) -> bool {
        true
    }

    /// A hierarchical depth buffer can be produced for HZB tests.
    fn hzb_available(&self) -> bool {
        self.depth_pyramid().is_some()
    }

    /// The depth pyramid HZB tests for this frame run against.
    fn depth_pyramid(&self) -> Option<&super::pyramid::DepthPyramid> {
        None
    }
}

/// Reference-counted allocator for query handles. Every pool hands out
/// handles no other pool in the process can produce.
#[derive(Debug)]
pub struct QueryPool {
    id: u32,
    refcounts: Vec<u32>,
    free: Vec<u32>,
}

impl Default for QueryPool {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryPool {
    pub fn new() -> Self {
        Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            refcounts: Vec::new(),
            free: Vec::new(),
        }
    }

    /// A fresh handle with one reference.
    pub fn allocate(&mut self) -> QueryHandle {
        if let Some(slot) = self.free.pop() {
            self.refcounts[slot as usize] = 1;
            return QueryHandle::new(self.id, slot);
        }
        self.refcounts.push(1);
        QueryHandle::new(self.id, self.refcounts.len() as u32 - 1)
    }

    /// Another primitive shares `handle`.
    pub fn add_ref(&mut self, handle: QueryHandle) {
        let count = self.refcount_mut(handle);
        assert!(*count > 0, "add_ref on free query handle {:#x}", handle.0);
        *count += 1;
    }

    /// Drop one reference. Returns `true` when the handle went back to the
    /// free list.
    pub fn release(&mut self, handle: QueryHandle) -> bool {
        let count = self.refcount_mut(handle);
        assert!(*count > 0, "releasing free query handle {:#x}", handle.0);
        *count -= 1;
        if *count == 0 {
            self.free.push(handle.slot() as u32);
            true
        } else {
            false
        }
    }

    /// Handles with at least one reference.
    pub fn outstanding(&self) -> usize {
        self.refcounts.len() - self.free.len()
    }

    fn refcount_mut(&mut self, handle: QueryHandle) -> &mut u32 {
        assert_eq!(
            handle.pool(),
            self.id,
            "query handle {:#x} belongs to another pool",
            handle.0
        );
        &mut self.refcounts[handle.slot()]
    }
}

/// Boxes queued under one handle.
#[derive(Debug)]
struct QueryBatch {
    handle: QueryHandle,
    boxes: Vec<(Vec3, Vec3)>,
}

/// Packs primitives into queries of up to `batch_size` boxes each.
#[derive(Debug)]
pub struct QueryBatcher {
    batch_size: usize,
    batches: Vec<QueryBatch>,
}

impl QueryBatcher {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            batches: Vec::new(),
        }
    }

    /// Queue a box and return the handle it will be tested under. Each
    /// primitive in a batch holds its own reference to the shared handle.
    pub fn batch_primitive(&mut self, pool: &mut QueryPool, origin: Vec3, extent: Vec3) -> QueryHandle {
        let batch_size = self.batch_size;
        if let Some(batch) = self.batches.last_mut().filter(|b| b.boxes.len() < batch_size) {
            pool.add_ref(batch.handle);
            batch.boxes.push((origin, extent));
            return batch.handle;
        }
        let handle = pool.allocate();
        self.batches.push(QueryBatch {
            handle,
            boxes: vec![(origin, extent)],
        });
        handle
    }

    /// Handles opened so far.
    pub fn num_batches(&self) -> usize {
        self.batches.len()
    }

    /// Hand every queued box to the backend and start over.
    pub fn flush(&mut self, backend: &mut dyn OcclusionQueryBackend) {
        for batch in self.batches.drain(..) {
            for (origin, extent) in batch.boxes {
                backend.submit(batch.handle, origin, extent);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recording(Vec<QueryHandle>);

    impl OcclusionQueryBackend for Recording {
        fn submit(&mut self, handle: QueryHandle, _origin: Vec3, _extent: Vec3) {
            self.0.push(handle);
        }
        fn read_result(&self, _handle: QueryHandle, _wait: bool) -> Option<u64> {
            None
        }
    }

    #[test]
    fn test_pool_recycles_released_handles() {
        let mut pool = QueryPool::new();
        let a = pool.allocate();
        let b = pool.allocate();
        assert_ne!(a, b);
        assert!(pool.release(a));
        assert_eq!(pool.outstanding(), 1);
        assert_eq!(pool.allocate(), a);
    }

    /// Grouped handles are freed only once every sharer releases them.
    #[test]
    fn test_grouped_handle_refcount() {
        let mut pool = QueryPool::new();
        let mut batcher = QueryBatcher::new(3);
        let handles: Vec<_> = (0..4)
            .map(|i| batcher.batch_primitive(&mut pool, Vec3::splat(i as f32), Vec3::ONE))
            .collect();
        assert_eq!(batcher.num_batches(), 2);
        assert_eq!(handles[0], handles[2]);
        assert_ne!(handles[2], handles[3]);

        assert!(!pool.release(handles[0]));
        assert!(!pool.release(handles[1]));
        assert!(pool.release(handles[2]));
        assert_eq!(pool.outstanding(), 1);
    }

    #[test]
    fn test_flush_submits_every_box() {
        let mut pool = QueryPool::new();
        let mut batcher = QueryBatcher::new(2);
        for _ in 0..5 {
            batcher.batch_primitive(&mut pool, Vec3::ZERO, Vec3::ONE);
        }
        let mut backend = Recording::default();
        batcher.flush(&mut backend);
        assert_eq!(backend.0.len(), 5);
        assert_eq!(batcher.num_batches(), 0);
    }

    /// Two views sharing one backend never see the same handle.
    #[test]
    fn test_pools_hand_out_disjoint_handles() {
        let mut left = QueryPool::new();
        let mut right = QueryPool::new();
        let a: Vec<_> = (0..4).map(|_| left.allocate()).collect();
        let b: Vec<_> = (0..4).map(|_| right.allocate()).collect();
        assert!(a.iter().all(|h| !b.contains(h)));
    }

    #[test]
    #[should_panic(expected = "belongs to another pool")]
    fn test_foreign_handle_rejected() {
        let mut left = QueryPool::new();
        let mut right = QueryPool::new();
        let handle = left.allocate();
        right.release(handle);
    }

    #[test]
    #[should_panic(expected = "releasing free query handle")]
    fn test_double_release_panics() {
        let mut pool = QueryPool::new();
        let a = pool.allocate();
        pool.release(a);
        pool.release(a);
    }
}
