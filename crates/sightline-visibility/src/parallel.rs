//! Fork-join execution for the culling stages.
//!
//! Every stage hands the pool a list of independent tasks, each owning a
//! disjoint slice of the per-view output, and gets the task results back in
//! submission order. With parallel culling disabled the same tasks run on the
//! calling thread, so partitioning and merge order never depend on the mode.

use rayon::prelude::*;
use sightline_config::ParallelConfig;

use crate::error::PipelineError;

/// A dedicated worker pool, or none when culling runs on the calling thread.
pub struct WorkerPool {
    pool: Option<rayon::ThreadPool>,
}

impl WorkerPool {
    /// Build a pool sized from `config.worker_threads`, falling back to one
    /// thread per logical CPU.
    pub fn new(config: &ParallelConfig) -> Result<Self, PipelineError> {
        if !config.parallel_culling {
            return Ok(Self::serial());
        }
        let threads = if config.worker_threads == 0 {
            num_cpus::get().max(1)
        } else {
            config.worker_threads
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("sightline-cull-{i}"))
            .build()?;
        tracing::debug!(threads, "built culling worker pool");
        Ok(Self { pool: Some(pool) })
    }

    /// Runs every task on the calling thread.
    pub fn serial() -> Self {
        Self { pool: None }
    }

    pub fn is_parallel(&self) -> bool {
        self.pool.is_some()
    }

    /// Worker threads available to one stage.
    pub fn thread_count(&self) -> usize {
        self.pool.as_ref().map_or(1, |p| p.current_num_threads())
    }

    /// Run `f` over every task and collect the results in task order.
    pub fn run<T, R, F>(&self, tasks: Vec<T>, f: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Sync + Send,
    {
        match &self.pool {
            Some(pool) if tasks.len() > 1 => pool.install(|| tasks.into_par_iter().map(&f).collect()),
            _ => tasks.into_iter().map(f).collect(),
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.thread_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_pool_preserves_order() {
        let pool = WorkerPool::serial();
        assert!(!pool.is_parallel());
        assert_eq!(pool.run(vec![3, 1, 2], |x| x * 10), vec![30, 10, 20]);
    }

    /// Results come back in submission order regardless of scheduling.
    #[test]
    fn test_parallel_pool_preserves_order() {
        let config = ParallelConfig {
            worker_threads: 3,
            ..Default::default()
        };
        let pool = WorkerPool::new(&config).unwrap();
        assert_eq!(pool.thread_count(), 3);
        let out = pool.run((0..100).collect(), |x: u32| x * 2);
        assert_eq!(out, (0..100).map(|x| x * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_disabled_parallel_culling_builds_serial_pool() {
        let config = ParallelConfig {
            parallel_culling: false,
            ..Default::default()
        };
        assert!(!WorkerPool::new(&config).unwrap().is_parallel());
    }

    /// Tasks may own disjoint mutable slices of one buffer.
    #[test]
    fn test_tasks_write_disjoint_chunks() {
        let pool = WorkerPool::new(&ParallelConfig::default()).unwrap();
        let mut words = vec![0u32; 10];
        let tasks: Vec<_> = words.chunks_mut(3).enumerate().collect();
        pool.run(tasks, |(i, chunk)| chunk.fill(i as u32 + 1));
        assert_eq!(words, vec![1, 1, 1, 2, 2, 2, 3, 3, 3, 4]);
    }
}
