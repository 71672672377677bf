//! Cooperative cancellation and progress reporting

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Feedback channel consulted by long reads.
///
/// Readers check [`is_cancelled`](Feedback::is_cancelled) between read
/// strips, never inside a single native read.
pub trait Feedback: Send + Sync {
    fn is_cancelled(&self) -> bool;

    /// `done` of `total` units finished
    fn set_progress(&self, _done: usize, _total: usize) {}
}

/// Cloneable cancellation flag; all clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Feedback for CancelToken {
    fn is_cancelled(&self) -> bool {
        CancelToken::is_cancelled(self)
    }
}
