//! Execution modes for tile scans

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// How tile scans are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    Sequential,
    /// Rayon's global pool
    #[default]
    Parallel,
    /// A dedicated pool with this many threads
    ParallelWith(usize),
}

/// Maps a function over an index range, keeping results in index order
/// whatever the scheduling.
pub trait ParallelStrategy {
    fn par_map<T, F>(&self, range: Range<usize>, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send;
}

#[cfg(feature = "parallel")]
impl ParallelStrategy for ProcessingMode {
    fn par_map<T, F>(&self, range: Range<usize>, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        let threads = match *self {
            ProcessingMode::Sequential => return range.map(f).collect(),
            ProcessingMode::Parallel => return range.into_par_iter().map(f).collect(),
            ProcessingMode::ParallelWith(threads) => threads,
        };
        match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => pool.install(|| range.into_par_iter().map(f).collect()),
            Err(e) => {
                tracing::warn!(threads, error = %e, "cannot build thread pool; using the global pool");
                range.into_par_iter().map(f).collect()
            }
        }
    }
}

#[cfg(not(feature = "parallel"))]
impl ParallelStrategy for ProcessingMode {
    fn par_map<T, F>(&self, range: Range<usize>, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        range.map(f).collect()
    }
}
