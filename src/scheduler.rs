//! Job Scheduler Module
//!
//! Runs a batch of keyed jobs on a dedicated, bounded rayon pool.
//!
//! - Fail-fast: the first error stops jobs that have not started yet.
//!   Jobs already running finish, and their output is discarded.
//! - Results come back keyed, so completion order does not matter.
//! - Each scheduler owns its pool; concurrent runs do not share workers.

use log::debug;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::{ConfigurationError, DetectionError};

pub struct Scheduler {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl Scheduler {
    /// Builds a pool of `workers` threads (at least one).
    pub fn new(workers: usize) -> Result<Self, DetectionError> {
        if workers == 0 {
            return Err(ConfigurationError::InvalidThreadCount(workers).into());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("amrsearch-worker-{}", i))
            .build()?;
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs `work` on every job and returns outputs keyed by job key.
    ///
    /// Keys must be unique. On failure the error of a failing job is
    /// returned and no outputs are.
    pub fn run<K, J, T, E, F>(&self, jobs: Vec<(K, J)>, work: F) -> Result<FxHashMap<K, T>, E>
    where
        K: Eq + Hash + Send,
        J: Send,
        T: Send,
        E: Send,
        F: Fn(&K, J) -> Result<T, E> + Sync,
    {
        let total = jobs.len();
        let cancelled = AtomicBool::new(false);
        let finished = AtomicUsize::new(0);

        let outputs: Vec<Option<(K, T)>> = self.pool.install(|| {
            jobs.into_par_iter()
                .map(|(key, job)| {
                    if cancelled.load(Ordering::Acquire) {
                        return Ok(None);
                    }
                    match work(&key, job) {
                        Ok(output) => {
                            let done = finished.fetch_add(1, Ordering::Relaxed) + 1;
                            debug!("Job {}/{} finished", done, total);
                            Ok(Some((key, output)))
                        }
                        Err(e) => {
                            cancelled.store(true, Ordering::Release);
                            Err(e)
                        }
                    }
                })
                .collect::<Result<Vec<_>, E>>()
        })?;

        Ok(outputs.into_iter().flatten().collect())
    }
}
