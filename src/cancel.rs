//! Cooperative cancellation token
//!
//! Cancellation here is **soft**: setting the flag never preempts in-flight
//! I/O. Well-behaved loops poll the flag once per unit of benchmarked work,
//! so cancellation latency is bounded by the duration of one unit of work,
//! never zero.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cancellation token polled by measured-phase loops.
///
/// Cloning is cheap; all clones observe the same flag. Setting it is
/// idempotent and visible to every reader (the workload loop and any
/// timeout watcher).
#[derive(Clone, Debug, Default)]
pub struct CancelFlag {
    flag: Arc<AtomicBool>,
}

impl CancelFlag {
    /// Create a new, unset cancellation flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Check whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_idempotent_and_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());

        flag.cancel();
        flag.cancel();
        assert!(flag.is_cancelled());
        assert!(clone.is_cancelled());
    }
}
