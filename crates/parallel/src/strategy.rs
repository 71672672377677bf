//! Parallel processing strategies

use rayon::ThreadPool;

use crate::error::{Error, Result};

/// Processing mode for block fan-out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingMode {
    /// Single-threaded processing with one reader
    Sequential,
    /// Parallel processing on the global pool
    #[default]
    Parallel,
    /// Parallel on a dedicated pool of the given size
    ParallelWith(usize),
}

impl ProcessingMode {
    /// `ParallelWith(n)` for `Some(n)`, `Parallel` otherwise
    pub fn from_threads(threads: Option<usize>) -> Self {
        match threads {
            Some(1) => ProcessingMode::Sequential,
            Some(n) => ProcessingMode::ParallelWith(n),
            None => ProcessingMode::Parallel,
        }
    }

    pub fn is_parallel(&self) -> bool {
        !matches!(self, ProcessingMode::Sequential)
    }

    /// Number of worker threads this mode runs on
    pub fn threads(&self) -> usize {
        match self {
            ProcessingMode::Sequential => 1,
            ProcessingMode::Parallel => num_cpus(),
            ProcessingMode::ParallelWith(n) => *n,
        }
    }

    /// Run `op` in the pool this mode selects
    pub fn install<R, F>(&self, op: F) -> Result<R>
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        match self {
            ProcessingMode::Sequential | ProcessingMode::Parallel => Ok(op()),
            ProcessingMode::ParallelWith(threads) => Ok(build_pool(*threads)?.install(op)),
        }
    }
}

fn build_pool(threads: usize) -> Result<ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| Error::ThreadPool {
            threads,
            reason: e.to_string(),
        })
}

/// Get the number of available CPU cores
pub fn num_cpus() -> usize {
    rayon::current_num_threads()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_threads() {
        assert_eq!(ProcessingMode::from_threads(None), ProcessingMode::Parallel);
        assert_eq!(ProcessingMode::from_threads(Some(1)), ProcessingMode::Sequential);
        assert_eq!(ProcessingMode::from_threads(Some(3)).threads(), 3);
        assert!(!ProcessingMode::Sequential.is_parallel());
    }

    #[test]
    fn test_install_runs_in_dedicated_pool() {
        let threads = ProcessingMode::ParallelWith(2)
            .install(rayon::current_num_threads)
            .unwrap();
        assert_eq!(threads, 2);
    }
}
