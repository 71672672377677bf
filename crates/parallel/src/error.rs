//! Error types for parallel block processing

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] bandstack_core::Error),

    #[error("Failed to build a pool of {threads} threads: {reason}")]
    ThreadPool { threads: usize, reason: String },

    #[error("Worker could not open its reader: {0}")]
    WorkerOpen(String),
}

pub type Result<T> = std::result::Result<T, Error>;
