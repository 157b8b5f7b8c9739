//! Cooperative cancellation shared between a front end and a running workflow.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Advisory abort flag.
///
/// Cloning shares the flag. The workflow polls it only at the top of each
/// development iteration, so an in-flight persona call always completes first.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Observe and clear a pending cancellation in one step.
    pub fn take(&self) -> bool {
        self.flag.swap(false, Ordering::SeqCst)
    }
}
