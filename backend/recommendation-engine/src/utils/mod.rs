// Utility functions for recommendation-engine

use crate::error::{RecommendError, Result};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

/// Cooperative cancellation flag shared between a training run and its owner
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, AtomicOrdering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(AtomicOrdering::Relaxed)
    }

    /// Returns `Err(Cancelled)` once the flag has been tripped
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(RecommendError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Ranking order: score descending, then index ascending
pub fn rank_order(a: (usize, f64), b: (usize, f64)) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0))
}
