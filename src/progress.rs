//! Cooperative cancellation and progress reporting shared between the
//! interactive thread and background work.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Cloneable cancellation flag. All clones observe the same request.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Step counter plus cancellation for long-running comparisons.
///
/// `total` is an up-front estimate and may be lower than the number of
/// steps actually worked; readers should clamp.
#[derive(Debug, Clone, Default)]
pub struct ProgressMonitor {
    cancel: CancelToken,
    worked: Arc<AtomicUsize>,
    total: Arc<AtomicUsize>,
}

impl ProgressMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(cancel: CancelToken) -> Self {
        Self {
            cancel,
            ..Self::default()
        }
    }

    pub fn token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn begin(&self, estimated_total: usize) {
        self.worked.store(0, Ordering::Relaxed);
        self.total.store(estimated_total, Ordering::Relaxed);
    }

    pub fn worked(&self, steps: usize) {
        self.worked.fetch_add(steps, Ordering::Relaxed);
    }

    pub fn steps(&self) -> usize {
        self.worked.load(Ordering::Relaxed)
    }

    pub fn estimated_total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    /// Fraction of work done in `0.0..=1.0`
    pub fn fraction(&self) -> f32 {
        let total = self.estimated_total();
        if total == 0 {
            return 0.0;
        }
        (self.steps() as f32 / total as f32).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_fraction_is_clamped() {
        let monitor = ProgressMonitor::new();
        assert_eq!(monitor.fraction(), 0.0);
        monitor.begin(4);
        monitor.worked(2);
        assert_eq!(monitor.fraction(), 0.5);
        monitor.worked(5);
        assert_eq!(monitor.fraction(), 1.0);
    }
}
