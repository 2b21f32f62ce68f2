//! Fire-and-forget background work, drained at session boundaries.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::debug;

use crate::tracker::TaskTracker;

/// Tracks background hook executions so a session can drain them before
/// it ends instead of abandoning them mid-flight.
#[derive(Debug, Default)]
pub struct BackgroundTracker {
    tasks: TaskTracker,
    next_id: AtomicU64,
}

impl BackgroundTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tasks: TaskTracker::new(),
            next_id: AtomicU64::new(0),
        }
    }

    /// Spawn a background unit of work under a generated name.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.tasks.track(format!("hook-{id}"), future);
    }

    /// Number of background tasks still running.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.tasks.pending_count()
    }

    /// Wait for all background tasks with no bound.
    pub async fn drain_all(&self) {
        let _ = self.tasks.wait_for_all(None).await;
    }

    /// Wait for all background tasks, bounded by `timeout`.
    ///
    /// Returns `true` when everything settled. On `false` the stragglers
    /// keep running; the caller decides whether that matters.
    pub async fn drain_with_timeout(&self, timeout: Duration) -> bool {
        let drained = self.tasks.wait_for_all(Some(timeout)).await;
        if !drained {
            debug!(
                pending = self.tasks.pending_count(),
                "background drain timed out with tasks still running"
            );
        }
        drained
    }
}
